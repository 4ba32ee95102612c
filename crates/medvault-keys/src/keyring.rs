//! In-process signing agent.
//!
//! A [`LocalKeyring`] stands in for a wallet extension: it holds encryption
//! secrets for the identities it controls and a directory of public keys for
//! everyone else it can wrap for.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use medvault_core::WalletAddress;

use crate::agent::SigningAgent;
use crate::blob::EncryptedKeyBlob;
use crate::crypto::{AgentSecret, EncryptionPublicKey};
use crate::error::{KeysError, Result};

enum Entry {
    Secret(AgentSecret),
    Public(EncryptionPublicKey),
}

impl Entry {
    fn public_key(&self) -> EncryptionPublicKey {
        match self {
            Entry::Secret(secret) => secret.public_key(),
            Entry::Public(public) => *public,
        }
    }
}

/// A keyring agent backed by process memory.
#[derive(Default)]
pub struct LocalKeyring {
    entries: RwLock<HashMap<WalletAddress, Entry>>,
}

impl LocalKeyring {
    /// Create an empty keyring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and hold a fresh secret for `identity`.
    pub fn generate(&self, identity: WalletAddress) -> EncryptionPublicKey {
        let secret = AgentSecret::generate();
        let public = secret.public_key();
        self.insert_secret(identity, secret);
        public
    }

    /// Hold `secret` for `identity`, replacing any previous entry.
    pub fn insert_secret(&self, identity: WalletAddress, secret: AgentSecret) {
        self.write().insert(identity, Entry::Secret(secret));
    }

    /// Record another party's public key so keys can be wrapped for them.
    ///
    /// Never downgrades an identity whose secret is held here.
    pub fn register_public_key(&self, identity: WalletAddress, public: EncryptionPublicKey) {
        let mut entries = self.write();
        if !matches!(entries.get(&identity), Some(Entry::Secret(_))) {
            entries.insert(identity, Entry::Public(public));
        }
    }

    /// Forget `identity` entirely.
    pub fn remove(&self, identity: &WalletAddress) -> bool {
        self.write().remove(identity).is_some()
    }

    /// True if this keyring can decrypt for `identity`.
    pub fn holds_secret(&self, identity: &WalletAddress) -> bool {
        matches!(
            self.entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(identity),
            Some(Entry::Secret(_))
        )
    }

    /// Public key known for `identity`, if any.
    pub fn public_key(&self, identity: &WalletAddress) -> Option<EncryptionPublicKey> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .map(Entry::public_key)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<WalletAddress, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SigningAgent for LocalKeyring {
    async fn encryption_public_key(
        &self,
        identity: &WalletAddress,
    ) -> Result<EncryptionPublicKey> {
        self.public_key(identity)
            .ok_or_else(|| KeysError::RecipientUnavailable {
                identity: *identity,
                reason: "no encryption public key published".to_string(),
            })
    }

    async fn decrypt(&self, identity: &WalletAddress, blob: &EncryptedKeyBlob) -> Result<Vec<u8>> {
        let secret = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(identity) {
                Some(Entry::Secret(secret)) => secret.clone(),
                _ => {
                    return Err(KeysError::AccessDenied {
                        identity: *identity,
                        reason: "keyring does not hold this identity's secret".to_string(),
                    })
                }
            }
        };
        blob.open(identity, &secret)
    }
}

impl std::fmt::Debug for LocalKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let held = entries
            .values()
            .filter(|e| matches!(e, Entry::Secret(_)))
            .count();
        f.debug_struct("LocalKeyring")
            .field("identities", &entries.len())
            .field("secrets", &held)
            .finish()
    }
}
