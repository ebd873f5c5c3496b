//! Error types for the `scanlogin-models` crate.
//!
//! All fallible constructors and decoders in this crate return variants of
//! [`ModelError`].

/// Errors produced when constructing or decoding model types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// A scene token was empty or exceeded the platform limit.
    #[error("invalid scene \"{value}\": {reason}")]
    InvalidScene {
        /// The value that failed validation.
        value: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// A webhook body could not be decoded as a platform message.
    #[error("malformed platform message: {0}")]
    MalformedMessage(String),
}
