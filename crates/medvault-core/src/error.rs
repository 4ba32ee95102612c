//! Error types for medvault core.

use thiserror::Error;

/// Errors raised by the record cipher and the envelope codec.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The cryptographic primitive is unavailable or was misused
    /// (bad key length, RNG failure, encoder failure).
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// Ciphertext, IV and key do not belong together (tamper or wrong key).
    #[error("authentication failure: cannot decrypt record")]
    AuthenticationFailure,

    /// Recovered or transported bytes are not valid structured data.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// An envelope read from storage is missing fields or has invalid ones.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// An envelope being assembled would break the recipient-set invariants.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A wallet address string could not be parsed.
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
