//! Client
//!
//! Secure transport client for the GAAP API. Turns structured request messages
//! into encrypted, signed binary frames, posts them, and turns the binary
//! replies back into messages. Owns the credential lifecycle (bootstrap key
//! vs. per-session key) and a single-flight token refresh that survives
//! concurrent callers.
//!
//! # Architecture
//!
//! ```text
//! caller ──► SecureClient::call
//!              │ resolve key (KeyResolver)
//!              │ encode (MessageCodec)
//!              │ encrypt + sign (gaap_crypto)
//!              ▼
//!           HttpTransport::post ──► ServerReply
//!              │ Sealed   → unframe, decrypt, decode
//!              │ Rejected → ApiError, or 401 → RefreshCoordinator → retry once
//! ```
//!
//! # Components
//!
//! - [`SecureClient`]: Orchestrates one call end to end
//! - [`CredentialStore`]: Access token, refresh token and session key
//! - [`KeyResolver`]: Validated key material for a [`KeyClass`]
//! - [`RefreshCoordinator`]: At most one refresh in flight, FIFO waiters
//! - [`MessageCodec`]: Seam for the structured binary serializer
//! - [`HttpTransport`]: Seam for the HTTP boundary
//! - [`AuthService`]: Login, registration, logout and account calls
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! [`transport::ReqwestTransport`], an [`HttpTransport`] over `reqwest`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod auth;
mod client;
mod codec;
mod config;
mod credentials;
mod env;
mod error;
mod http;
mod keys;
pub mod messages;
mod observer;
mod refresh;

#[cfg(feature = "transport")]
pub mod transport;

pub use auth::AuthService;
pub use client::{CallOptions, SecureClient};
pub use codec::{Cbor, CodecError, MessageCodec};
pub use config::{BOOTSTRAP_KEY_VAR, ClientConfig};
pub use credentials::{CredentialStore, Credentials, IssuedCredentials, IssuesCredentials};
pub use env::{Environment, SystemEnv};
pub use error::{ApiError, ClientError};
pub use http::{
    AUTHORIZATION, CONTENT_TYPE, HttpRequest, HttpResponse, HttpTransport, JSON_CONTENT_TYPE,
    OCTET_STREAM, ServerReply, TransportError, X_NONCE, X_SIGNATURE, X_TIMESTAMP,
};
pub use keys::{KeyClass, KeyResolver};
pub use observer::{NoopObserver, SessionObserver};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
