//! Error types for the ElGamal participant

use thiserror::Error;

/// Result type alias for participant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running ElGamal rounds
///
/// None of these are fatal to the participant: the protocol variants leave the
/// round counter untouched so the round is retried on the next parameter
/// notification.
#[derive(Debug, Error)]
pub enum Error {
    /// Domain parameters failed validation (`p < 3`)
    #[error("Invalid parameters: p={p} (must be at least 3)")]
    InvalidParameters { p: u64 },

    /// Readiness probe for the encryption service timed out
    #[error("Service {0} is not available")]
    ServiceUnavailable(String),

    /// The encrypt exchange errored, was rejected, or its continuation failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// A response arrived while no request was in flight
    #[error("Unexpected response: no request in flight")]
    UnexpectedResponse,

    /// Invalid participant configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Network/relay error
    #[error("Relay error: {0}")]
    Relay(String),

    /// Timeout waiting for the relay
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
