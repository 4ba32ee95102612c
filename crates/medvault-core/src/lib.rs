//! # medvault Core
//!
//! Pure primitives for medvault: wallet identities, the record cipher, and
//! the envelope codec.
//!
//! This crate performs no I/O and talks to no key agent. It is pure
//! computation over the envelope data model.
//!
//! ## Key Types
//!
//! - [`WalletAddress`] - Identity of a patient, provider, or administrator
//! - [`SymmetricKey`] - Per-record AES-256-GCM key
//! - [`Envelope`] - Ciphertext, IV, and per-recipient wrapped keys
//! - [`WrappedKey`] - Opaque, recipient-specific encryption of a record key
//!
//! ## Invariants
//!
//! - Every envelope has a non-empty recipient set that contains its subject.
//! - `data` and `iv` are replaced together, never independently.

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod types;

pub use cipher::{Iv, SealedRecord, SymmetricKey, IV_LEN, KEY_LEN};
pub use envelope::{
    build_envelope, parse_envelope, serialize_envelope, Envelope, RecipientKeys, WrappedKey,
};
pub use error::{CoreError, Result};
pub use types::{ContentId, WalletAddress};
