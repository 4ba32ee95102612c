//! Error types for key wrapping and the signing agent.

use medvault_core::{CoreError, WalletAddress};
use thiserror::Error;

/// Errors that can occur while wrapping or unwrapping record keys.
#[derive(Debug, Error)]
pub enum KeysError {
    /// The agent cannot produce an encryption public key for this identity
    /// (e.g. the recipient never opted in to encrypted messaging).
    #[error("recipient {identity} unavailable: {reason}")]
    RecipientUnavailable {
        /// The recipient whose key could not be obtained.
        identity: WalletAddress,
        /// Agent-supplied detail.
        reason: String,
    },

    /// The signing agent could not be reached or did not answer in time.
    #[error("signing agent unavailable: {0}")]
    AgentUnavailable(String),

    /// The caller is not the recipient of this wrapped key, or the agent
    /// refused to decrypt it.
    #[error("access denied for {identity}: {reason}")]
    AccessDenied {
        /// The identity that attempted the unwrap.
        identity: WalletAddress,
        /// Why access was refused.
        reason: String,
    },

    /// The wrapped-key blob or the recovered key bytes are structurally invalid.
    #[error("malformed wrapped key: {0}")]
    MalformedBlob(String),

    /// The blob names a wrap scheme this build does not implement.
    #[error("unsupported wrap scheme: {0}")]
    UnsupportedScheme(String),

    /// A wrapping primitive failed.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// Core error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for key operations.
pub type Result<T> = std::result::Result<T, KeysError>;
