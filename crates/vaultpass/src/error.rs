//! Error types for vaultpass

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Error returned by the transport capability.
///
/// Passed through unchanged so callers can apply their own retry/backoff;
/// the library never interprets it further.
#[derive(Error, Debug)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError(err.to_string())
    }
}

/// Vault client error types
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("additional authentication challenge required: {0}")]
    ChallengeRequired(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("malformed vault blob: {0}")]
    Format(String),

    #[error("could not find account with ID={id}")]
    AccountNotFound { id: String },

    #[error("Account cannot be written to read-only shared folder {folder}.")]
    ReadOnlyShare { folder: String },

    #[error("unexpected server response: {0}")]
    Protocol(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
