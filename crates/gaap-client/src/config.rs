//! Client configuration.

use std::time::Duration;

/// Environment variable holding the bootstrap key (hex).
pub const BOOTSTRAP_KEY_VAR: &str = "GAAP_ALE_BOOTSTRAP_KEY";

/// Environment variable holding the server base URL.
const BASE_URL_VAR: &str = "GAAP_BASE_URL";

/// Environment variable overriding the API path prefix.
const API_BASE_PATH_VAR: &str = "GAAP_API_BASE_PATH";

/// Configuration for a [`crate::SecureClient`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Server origin, e.g. `https://gaap.example.com`.
    pub base_url: String,

    /// Prefix for relative endpoints (default `/api`).
    pub api_base_path: String,

    /// Pre-shared bootstrap key (hex). Used for login, registration and
    /// token refresh. Never rotated at runtime.
    pub bootstrap_key: Option<String>,

    /// Per-request HTTP timeout.
    pub request_timeout: Duration,

    /// Upper bound on a token refresh. A refresh that exceeds it fails and
    /// settles every waiter.
    pub refresh_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_base_path: "/api".to_string(),
            bootstrap_key: None,
            request_timeout: Duration::from_secs(30),
            refresh_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `GAAP_BASE_URL`, `GAAP_API_BASE_PATH` and
    /// `GAAP_ALE_BOOTSTRAP_KEY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var(BASE_URL_VAR) {
            config.base_url = base_url;
        }
        if let Ok(path) = std::env::var(API_BASE_PATH_VAR) {
            config.api_base_path = path;
        }
        config.bootstrap_key = std::env::var(BOOTSTRAP_KEY_VAR).ok().filter(|k| !k.is_empty());
        config
    }

    /// Builder-style setter for the bootstrap key.
    #[must_use]
    pub fn with_bootstrap_key(mut self, key: impl Into<String>) -> Self {
        self.bootstrap_key = Some(key.into());
        self
    }

    /// Builder-style setter for the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Full URL for an endpoint.
    ///
    /// Endpoints starting with `/` are joined onto `base_url` behind
    /// `api_base_path`; anything else is treated as an absolute URL.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!(
                "{}{}{}",
                self.base_url.trim_end_matches('/'),
                self.api_base_path.trim_end_matches('/'),
                endpoint
            )
        } else {
            endpoint.to_string()
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_base_path", &self.api_base_path)
            .field("bootstrap_key", &self.bootstrap_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("refresh_timeout", &self.refresh_timeout)
            .finish()
    }
}
