//! Signing agent: the abstract interface to a wallet or key-management agent.
//!
//! The agent owns private keys; callers never see them. The vault passes an
//! agent explicitly into every wrap and unwrap so tests can substitute an
//! in-process keyring or a fault-injecting wrapper.

use std::sync::Arc;

use async_trait::async_trait;
use medvault_core::WalletAddress;

use crate::blob::EncryptedKeyBlob;
use crate::crypto::EncryptionPublicKey;
use crate::error::Result;

/// A capability that can publish encryption public keys and decrypt wrapped
/// keys on behalf of the identities it controls.
///
/// Both calls may suspend indefinitely pending user confirmation; callers
/// bound them with their own timeout.
#[async_trait]
pub trait SigningAgent: Send + Sync {
    /// Return the encryption public key for `identity`.
    ///
    /// Fails with `RecipientUnavailable` if the identity has not published one.
    async fn encryption_public_key(&self, identity: &WalletAddress)
        -> Result<EncryptionPublicKey>;

    /// Decrypt `blob` with `identity`'s private key.
    ///
    /// Fails with `AccessDenied` if the agent does not control `identity`,
    /// the user refuses, or the blob was not sealed for this identity.
    async fn decrypt(&self, identity: &WalletAddress, blob: &EncryptedKeyBlob) -> Result<Vec<u8>>;
}

#[async_trait]
impl<A: SigningAgent + ?Sized> SigningAgent for Arc<A> {
    async fn encryption_public_key(
        &self,
        identity: &WalletAddress,
    ) -> Result<EncryptionPublicKey> {
        (**self).encryption_public_key(identity).await
    }

    async fn decrypt(&self, identity: &WalletAddress, blob: &EncryptedKeyBlob) -> Result<Vec<u8>> {
        (**self).decrypt(identity, blob).await
    }
}
