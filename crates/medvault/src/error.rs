//! Error types for the vault.

use std::collections::BTreeMap;
use std::fmt;

use medvault_core::{ContentId, CoreError, WalletAddress};
use medvault_keys::KeysError;
use medvault_store::StoreError;
use thiserror::Error;

/// A step of the access mutation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationStep {
    /// Resolve the pointer and load the current envelope.
    Fetch,
    /// Recover the record key through the initiator's own entry.
    Unwrap,
    /// Compute the new recipient map (and body, when rotating).
    Recompute,
    /// Store the new envelope, then move the pointer.
    Publish,
}

impl fmt::Display for MutationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationStep::Fetch => "fetch",
            MutationStep::Unwrap => "unwrap",
            MutationStep::Recompute => "recompute",
            MutationStep::Publish => "publish",
        })
    }
}

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cipher or envelope error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Key wrapping or signing-agent error.
    #[error(transparent)]
    Keys(#[from] KeysError),

    /// Storage, registry or directory error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No pointer exists for this subject.
    #[error("no record for {0}")]
    RecordNotFound(WalletAddress),

    /// The identity has no wrapped-key entry in the record.
    #[error("{identity} has no access to the record of {subject}")]
    AccessDenied {
        /// The identity that asked.
        identity: WalletAddress,
        /// The record's subject.
        subject: WalletAddress,
    },

    /// A storage, registry or directory call did not complete in time.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Some recipients could not be wrapped for and the policy forbids
    /// publishing without them.
    #[error("could not wrap the record key for {} recipient(s)", .failures.len())]
    PartialWrap {
        /// Per-identity failures.
        failures: BTreeMap<WalletAddress, KeysError>,
    },

    /// The pointer moved while a mutation was in flight.
    #[error("pointer for {subject} moved during the update")]
    StalePointer {
        /// The record's subject.
        subject: WalletAddress,
        /// The envelope the write started from, `None` for a first record.
        expected: Option<ContentId>,
        /// What the registry names now.
        found: Option<ContentId>,
    },

    /// An access mutation stopped at `step`; nothing was published.
    #[error("mutation aborted at {step}: {source}")]
    Aborted {
        /// The failing step.
        step: MutationStep,
        /// Why it failed.
        #[source]
        source: Box<VaultError>,
    },
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// The flat error taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Primitive unavailable or misused.
    CryptoFailure,
    /// Tamper or wrong key.
    AuthenticationFailure,
    /// Structurally corrupt data.
    DecodeFailure,
    /// A recipient has no published encryption key.
    RecipientUnavailable,
    /// The signing agent cannot be reached.
    AgentUnavailable,
    /// The identity is not entitled to the record.
    AccessDenied,
    /// No record exists for the subject.
    RecordNotFound,
    /// A stored envelope is invalid.
    MalformedEnvelope,
    /// An envelope would break its recipient invariants.
    InvariantViolation,
    /// Storage or registry cannot be reached.
    StorageUnavailable,
    /// Some recipients could not be wrapped for.
    PartialWrap,
    /// A concurrent writer moved the pointer.
    StalePointer,
}

impl ErrorKind {
    /// True if retrying later (possibly after user action) may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::RecipientUnavailable
                | ErrorKind::AgentUnavailable
                | ErrorKind::StorageUnavailable
                | ErrorKind::PartialWrap
                | ErrorKind::StalePointer
        )
    }
}

impl VaultError {
    /// Classify into the flat taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Core(e) => core_kind(e),
            VaultError::Keys(e) => keys_kind(e),
            VaultError::Store(e) => store_kind(e),
            VaultError::RecordNotFound(_) => ErrorKind::RecordNotFound,
            VaultError::AccessDenied { .. } => ErrorKind::AccessDenied,
            VaultError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            VaultError::PartialWrap { .. } => ErrorKind::PartialWrap,
            VaultError::StalePointer { .. } => ErrorKind::StalePointer,
            VaultError::Aborted { source, .. } => source.kind(),
        }
    }

    /// True if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// The step an aborted mutation stopped at.
    pub fn aborted_step(&self) -> Option<MutationStep> {
        match self {
            VaultError::Aborted { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub(crate) fn aborted(step: MutationStep) -> impl FnOnce(VaultError) -> VaultError {
        move |source| VaultError::Aborted {
            step,
            source: Box::new(source),
        }
    }
}

fn core_kind(e: &CoreError) -> ErrorKind {
    match e {
        CoreError::CryptoFailure(_) => ErrorKind::CryptoFailure,
        CoreError::AuthenticationFailure => ErrorKind::AuthenticationFailure,
        CoreError::DecodeFailure(_) | CoreError::InvalidAddress(_) => ErrorKind::DecodeFailure,
        CoreError::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
        CoreError::InvariantViolation(_) => ErrorKind::InvariantViolation,
    }
}

fn keys_kind(e: &KeysError) -> ErrorKind {
    match e {
        KeysError::RecipientUnavailable { .. } => ErrorKind::RecipientUnavailable,
        KeysError::AgentUnavailable(_) => ErrorKind::AgentUnavailable,
        KeysError::AccessDenied { .. } => ErrorKind::AccessDenied,
        KeysError::MalformedBlob(_) => ErrorKind::DecodeFailure,
        KeysError::UnsupportedScheme(_) | KeysError::CryptoFailure(_) => ErrorKind::CryptoFailure,
        KeysError::Core(e) => core_kind(e),
    }
}

fn store_kind(e: &StoreError) -> ErrorKind {
    match e {
        StoreError::NotFound(_) => ErrorKind::RecordNotFound,
        StoreError::InvalidData(_) => ErrorKind::DecodeFailure,
        StoreError::Unavailable(_)
        | StoreError::Database(_)
        | StoreError::Migration(_)
        | StoreError::Io(_) => ErrorKind::StorageUnavailable,
    }
}

/// The three outcomes a reader can be shown when a record cannot be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadFailure {
    /// "You do not have access."
    NoAccess,
    /// "Record unavailable." Missing, or a collaborator is unreachable.
    Unavailable,
    /// "Record corrupted." The stored data cannot be decrypted or decoded.
    Corrupted,
}

impl ReadFailure {
    /// Map an error to what the reader is told.
    pub fn classify(error: &VaultError) -> Self {
        match error.kind() {
            ErrorKind::AccessDenied => ReadFailure::NoAccess,
            ErrorKind::RecordNotFound
            | ErrorKind::StorageUnavailable
            | ErrorKind::AgentUnavailable
            | ErrorKind::RecipientUnavailable
            | ErrorKind::PartialWrap
            | ErrorKind::StalePointer => ReadFailure::Unavailable,
            ErrorKind::CryptoFailure
            | ErrorKind::AuthenticationFailure
            | ErrorKind::DecodeFailure
            | ErrorKind::MalformedEnvelope
            | ErrorKind::InvariantViolation => ReadFailure::Corrupted,
        }
    }
}
