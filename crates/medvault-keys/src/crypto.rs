//! X25519 key material for recipient key wrapping.
//!
//! Wallet agents expose a Curve25519 "encryption public key" per account,
//! separate from the account's signing key. These types model that key and
//! the agreement performed against it.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{KeysError, Result};

/// An X25519 encryption public key (32 bytes).
///
/// Wallets hand these out as standard base64 text.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptionPublicKey(pub [u8; 32]);

impl EncryptionPublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Base64 text form, as returned by `eth_getEncryptionPublicKey`.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Parse the base64 text form.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(s)
            .map_err(|e| KeysError::MalformedBlob(format!("public key: {e}")))?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            KeysError::MalformedBlob(format!(
                "public key: expected 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Convert to x25519-dalek PublicKey.
    pub fn to_dalek(&self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for EncryptionPublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

impl fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPublicKey({})", self.to_base64())
    }
}

/// The secret half of an agent-held encryption key.
///
/// Both wrap schemes clamp the same 32 bytes, so one secret opens blobs of
/// either scheme.
#[derive(Clone)]
pub struct AgentSecret([u8; 32]);

impl AgentSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from seed bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the public key.
    pub fn public_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey::from(PublicKey::from(&StaticSecret::from(self.0)))
    }

    /// Perform key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &EncryptionPublicKey) -> SharedKey {
        let shared = StaticSecret::from(self.0).diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }

    /// The same secret as a NaCl box key.
    pub fn to_box_secret(&self) -> crypto_box::SecretKey {
        crypto_box::SecretKey::from(self.0)
    }
}

impl fmt::Debug for AgentSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentSecret(public={:?})", self.public_key())
    }
}

/// A shared secret derived from X25519 key agreement.
#[derive(Clone)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the ChaCha20-Poly1305 wrapping key bound to `context`
    /// (the recipient address).
    pub fn derive_wrap_key(&self, context: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("medvault 2024-06 record key wrap v1");
        hasher.update(&self.0);
        hasher.update(context);
        *hasher.finalize().as_bytes()
    }
}

/// Ephemeral key pair for one-time key agreement.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: EncryptionPublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = EncryptionPublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> EncryptionPublicKey {
        self.public
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Consumes the ephemeral secret (can only be used once).
    pub fn diffie_hellman(self, peer_public: &EncryptionPublicKey) -> SharedKey {
        let shared = self.secret.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}
