//! # medvault keys
//!
//! Per-recipient wrapping of record keys.
//!
//! ## Overview
//!
//! Every record is encrypted under its own symmetric key. That key is then
//! sealed separately for each authorized recipient's X25519 encryption public
//! key, so adding a reader never touches the record ciphertext.
//!
//! ## Key Concepts
//!
//! - **SigningAgent**: the wallet-like capability that publishes encryption
//!   public keys and decrypts blobs for the identities it controls
//! - **EncryptedKeyBlob**: one sealed copy of a record key
//! - **KeyWrapper**: wraps for one or many recipients and unwraps through an
//!   agent, bounding every agent call with a timeout
//! - **LocalKeyring**: an in-process agent for native callers and tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use medvault_core::{SymmetricKey, WalletAddress};
//! use medvault_keys::{KeyWrapper, LocalKeyring};
//!
//! # async fn demo() -> medvault_keys::Result<()> {
//! let keyring = LocalKeyring::new();
//! let patient = WalletAddress::from_bytes([1; 20]);
//! keyring.generate(patient);
//!
//! let key = SymmetricKey::generate();
//! let wrapper = KeyWrapper::default();
//! let wrapped = wrapper.wrap_key_for(&keyring, &patient, &key).await?;
//! assert_eq!(wrapper.unwrap_key(&keyring, &wrapped, &patient).await?, key);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod blob;
pub mod crypto;
pub mod error;
pub mod keyring;
pub mod wrap;

pub use agent::SigningAgent;
pub use blob::{EncryptedKeyBlob, WrapScheme};
pub use crypto::{AgentSecret, EncryptionPublicKey, EphemeralKeyPair, SharedKey};
pub use error::{KeysError, Result};
pub use keyring::LocalKeyring;
pub use wrap::{KeyWrapper, WrapReport, DEFAULT_AGENT_TIMEOUT};
