//! # medvault
//!
//! Confidential, selectively shareable patient records on untrusted
//! content-addressed storage.
//!
//! ## Overview
//!
//! A record is a JSON document about one subject (a patient's wallet
//! address). It is stored as an envelope:
//!
//! - **data / iv**: the record encrypted under its own AES-256-GCM key
//! - **keys**: that key wrapped separately for every authorized recipient
//! - **wallet_address**: the subject, in plaintext, for indexing
//!
//! The only public state is a registry pointer from each subject to its
//! latest envelope. Sharing a record adds a wrapped key; revoking removes one
//! and, by default, rotates the record key.
//!
//! ## Key Concepts
//!
//! - **RecordVault**: create, read, update and list records; grant and revoke access
//! - **SessionKeyCache**: keys recovered this session, so the wallet is not
//!   asked again for every read
//! - **Mutation protocol**: Fetch → Unwrap → Recompute → Publish, serialized
//!   per subject, aborting as a whole on any failure
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use medvault::keys::LocalKeyring;
//! use medvault::store::{MemoryContentStore, MemoryRegistry, StaticAdminDirectory};
//! use medvault::{RecordVault, SessionKeyCache, VaultConfig, WalletAddress};
//! use serde_json::json;
//!
//! async fn example() -> medvault::Result<()> {
//!     let patient = WalletAddress::from_bytes([1; 20]);
//!     let provider = WalletAddress::from_bytes([2; 20]);
//!
//!     let keyring = LocalKeyring::new();
//!     keyring.generate(patient);
//!     keyring.generate(provider);
//!
//!     let vault = RecordVault::new(
//!         MemoryContentStore::new(),
//!         MemoryRegistry::new(),
//!         StaticAdminDirectory::default(),
//!         keyring,
//!         Arc::new(SessionKeyCache::new()),
//!         VaultConfig::default(),
//!     );
//!
//!     vault
//!         .create_record(&patient, &patient, &json!({"name": "Ada", "allergies": []}))
//!         .await?;
//!     vault.grant_access(&patient, &patient, &provider).await?;
//!
//!     let record: serde_json::Value = vault.read_record(&provider, &patient).await?;
//!     assert_eq!(record["name"], "Ada");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `medvault::core` - cipher, envelope codec, identities
//! - `medvault::keys` - signing agent and key wrapping
//! - `medvault::store` - storage, registry and directory backends

pub mod cache;
pub mod config;
pub mod error;
pub mod locks;
pub mod mutation;
pub mod vault;

// Re-export component crates
pub use medvault_core as core;
pub use medvault_keys as keys;
pub use medvault_store as store;

// Re-export main types for convenience
pub use cache::SessionKeyCache;
pub use config::{PartialWrapPolicy, RevocationMode, VaultConfig};
pub use error::{ErrorKind, MutationStep, ReadFailure, Result, VaultError};
pub use locks::SubjectLocks;
pub use mutation::{MutationOutcome, MutationReceipt};
pub use vault::{RecordListing, RecordReceipt, RecordVault};

// Re-export commonly used core types
pub use medvault_core::{ContentId, Envelope, SymmetricKey, WalletAddress};
