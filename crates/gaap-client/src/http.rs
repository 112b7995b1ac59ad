//! HTTP boundary.
//!
//! The client speaks to the server through [`HttpTransport`], a single
//! `POST` operation. Replies are classified exactly once into a
//! [`ServerReply`] by content type and status, so nothing downstream
//! re-inspects headers.

use std::future::Future;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::error::ApiError;

/// `Content-Type` header name.
pub const CONTENT_TYPE: &str = "Content-Type";

/// `Authorization` header name.
pub const AUTHORIZATION: &str = "Authorization";

/// Hex HMAC-SHA256 over the request envelope.
pub const X_SIGNATURE: &str = "X-Signature";

/// Milliseconds since epoch, decimal.
///
/// The acceptable clock skew is server policy; the client does not enforce
/// one. A client with a wrong clock sees persistent signature rejections.
pub const X_TIMESTAMP: &str = "X-Timestamp";

/// One-time random token per request.
pub const X_NONCE: &str = "X-Nonce";

/// Body type of encrypted frames.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Body type of error replies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Transport errors (no response received).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// Response body could not be read.
    #[error("body read failed: {0}")]
    Body(String),
}

/// Outgoing `POST`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Absolute URL
    pub url: String,
    /// Header name/value pairs
    pub headers: Vec<(&'static str, String)>,
    /// Wire frame (IV || ciphertext)
    pub body: Bytes,
}

impl HttpRequest {
    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw reply as seen at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Raw body
    pub body: Bytes,
}

impl HttpResponse {
    /// Encrypted success reply.
    pub fn sealed(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, content_type: Some(OCTET_STREAM.to_string()), body: body.into() }
    }

    /// JSON error reply `{code, message}`.
    pub fn json_error(status: u16, code: i64, message: &str) -> Self {
        let body = serde_json::json!({ "code": code, "message": message }).to_string();
        Self { status, content_type: Some(JSON_CONTENT_TYPE.to_string()), body: body.into() }
    }
}

/// A reply classified once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply {
    /// 2xx binary body: a frame, possibly empty
    Sealed(Bytes),
    /// JSON error body, or any non-2xx status
    Rejected(ApiError),
}

/// JSON error body as sent by the server.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl ServerReply {
    /// Classify a raw reply.
    ///
    /// - JSON content type: always an error, even under 2xx. Missing `code`
    ///   falls back to the status; missing `message` to `"Unknown error"`.
    /// - Non-2xx without JSON: error with `code = status`.
    /// - Otherwise: sealed body.
    pub fn classify(response: HttpResponse) -> Self {
        let status = response.status;
        let is_json =
            response.content_type.as_deref().is_some_and(|ct| ct.contains(JSON_CONTENT_TYPE));

        if is_json {
            let parsed = serde_json::from_slice::<ErrorBody>(&response.body).ok();
            let (code, message) = match parsed {
                Some(body) => (
                    body.code.filter(|c| *c != 0).unwrap_or(i64::from(status)),
                    body.message.filter(|m| !m.is_empty()).unwrap_or_else(|| "Unknown error".to_string()),
                ),
                None => (i64::from(status), format!("HTTP {status}")),
            };
            return Self::Rejected(ApiError { status, code, message });
        }

        if !(200..300).contains(&status) {
            return Self::Rejected(ApiError {
                status,
                code: i64::from(status),
                message: format!("HTTP {status}"),
            });
        }

        Self::Sealed(response.body)
    }
}

/// The HTTP boundary: one `POST` per call.
///
/// Implementations must not retry on their own; retry policy belongs to
/// [`crate::SecureClient`].
pub trait HttpTransport: Send + Sync + 'static {
    /// Send a request and return the raw reply.
    ///
    /// # Errors
    ///
    /// - `TransportError` if no response was received
    fn post(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}
