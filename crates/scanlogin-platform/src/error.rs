//! Platform error types.
//!
//! [`PlatformError`] is the single error type returned by every upstream
//! call. Callers treat all of its variants as "upstream unavailable"; the
//! variants exist so logs say what actually went wrong.

/// Error type for all upstream platform operations.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Invalid client configuration (e.g. empty app id, bad base URL).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport failure, including timeouts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-success HTTP status.
    #[error("platform returned HTTP status {0}")]
    Status(u16),

    /// The platform answered with a non-zero `errcode`.
    #[error("platform error {code}: {message}")]
    Api {
        /// Platform error code.
        code: i64,
        /// Platform error message.
        message: String,
    },

    /// JSON (de)serialisation error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A concurrent credential refresh failed; this caller was waiting on it.
    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),
}

impl PlatformError {
    /// Returns `true` if the platform rejected the access token itself, in
    /// which case the cached credential must not be reused.
    pub fn is_credential_rejected(&self) -> bool {
        matches!(
            self,
            Self::Api {
                code: 40001 | 40014 | 42001,
                ..
            }
        )
    }
}
