//! Record cipher: AES-256-GCM over the canonical JSON encoding of a record.
//!
//! One [`SymmetricKey`] protects exactly one record body. The ciphertext
//! layout (ciphertext || 16-byte tag, 96-bit IV) is the one WebCrypto
//! produces, so bodies written by the browser client open here unchanged.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CoreError, Result};

/// Length of a record key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of an IV in bytes.
pub const IV_LEN: usize = 12;

/// A 256-bit AES-GCM key for one record version.
///
/// Never persisted in plaintext; it only leaves this type through
/// [`SymmetricKey::to_bytes`] for wrapping and session caching.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Import raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Import raw key bytes of unchecked length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CoreError::CryptoFailure(format!(
                "invalid key length: expected {KEY_LEN}, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Export the raw key bytes.
    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0
    }

    /// Serialize `record` to compact JSON and encrypt it under a fresh IV.
    pub fn encrypt<T: Serialize + ?Sized>(&self, record: &T) -> Result<SealedRecord> {
        let plaintext =
            serde_json::to_vec(record).map_err(|e| CoreError::CryptoFailure(e.to_string()))?;
        self.encrypt_bytes(&plaintext)
    }

    /// Encrypt raw bytes under a fresh IV.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<SealedRecord> {
        let iv = Iv::generate();
        let cipher = self.cipher()?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(iv.as_bytes()), plaintext)
            .map_err(|e| CoreError::CryptoFailure(e.to_string()))?;

        Ok(SealedRecord { ciphertext, iv })
    }

    /// Decrypt and parse a record.
    ///
    /// Fails with `AuthenticationFailure` if the ciphertext, IV and key do not
    /// match, and with `DecodeFailure` if the plaintext is not valid JSON for `T`.
    pub fn decrypt<T: DeserializeOwned>(&self, ciphertext: &[u8], iv: &Iv) -> Result<T> {
        let plaintext = self.decrypt_bytes(ciphertext, iv)?;
        serde_json::from_slice(&plaintext).map_err(|e| CoreError::DecodeFailure(e.to_string()))
    }

    /// Decrypt raw bytes.
    pub fn decrypt_bytes(&self, ciphertext: &[u8], iv: &Iv) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;
        cipher
            .decrypt(Nonce::from_slice(iv.as_bytes()), ciphertext)
            .map_err(|_| CoreError::AuthenticationFailure)
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|e| CoreError::CryptoFailure(e.to_string()))
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// A 96-bit initialization vector, unique per encryption.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    /// Generate a new random IV.
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from raw bytes of unchecked length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; IV_LEN] = bytes.try_into().map_err(|_| {
            CoreError::DecodeFailure(format!(
                "invalid iv length: expected {IV_LEN}, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({})", hex::encode(self.0))
    }
}

/// Output of one encryption: the ciphertext (tag included) and its IV.
///
/// The two travel together; an envelope never updates one without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedRecord {
    /// Ciphertext with the 16-byte authentication tag appended.
    pub ciphertext: Vec<u8>,
    /// IV used for this ciphertext.
    pub iv: Iv,
}
