//! Wrapped-key blobs.
//!
//! A record key is sealed to one recipient's encryption public key and
//! stored in the envelope as base64(JSON([`EncryptedKeyBlob`])). The blob
//! layout is the one MetaMask's `eth-sig-util` produces, so browser wallets
//! can open blobs sealed with [`WrapScheme::X25519XSalsa20Poly1305`].

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{aead::KeyInit, ChaCha20Poly1305};
use crypto_box::{aead::Aead, SalsaBox};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use medvault_core::{WalletAddress, WrappedKey};

use crate::crypto::{AgentSecret, EncryptionPublicKey, EphemeralKeyPair};
use crate::error::{KeysError, Result};

const XSALSA_NONCE_LEN: usize = 24;
const CHACHA_NONCE_LEN: usize = 12;

/// Algorithm used to seal a record key for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapScheme {
    /// NaCl box: ephemeral X25519 + XSalsa20-Poly1305 with a 24-byte nonce.
    /// The only scheme browser wallets can open.
    #[default]
    X25519XSalsa20Poly1305,
    /// Ephemeral X25519, blake3 key derivation bound to the recipient
    /// address, then ChaCha20-Poly1305 with a 12-byte nonce.
    X25519ChaCha20Poly1305,
}

impl WrapScheme {
    /// The `version` string recorded in the blob.
    pub const fn as_str(&self) -> &'static str {
        match self {
            WrapScheme::X25519XSalsa20Poly1305 => "x25519-xsalsa20-poly1305",
            WrapScheme::X25519ChaCha20Poly1305 => "x25519-chacha20-poly1305",
        }
    }
}

impl fmt::Display for WrapScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WrapScheme {
    type Err = KeysError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x25519-xsalsa20-poly1305" => Ok(WrapScheme::X25519XSalsa20Poly1305),
            "x25519-chacha20-poly1305" => Ok(WrapScheme::X25519ChaCha20Poly1305),
            other => Err(KeysError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// A record key sealed to one recipient. All binary fields are base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedKeyBlob {
    /// Wrap scheme identifier.
    pub version: String,
    /// Nonce for the sealing AEAD.
    pub nonce: String,
    /// Sender's ephemeral X25519 public key.
    pub ephem_public_key: String,
    /// Sealed plaintext with its authentication tag.
    pub ciphertext: String,
}

impl EncryptedKeyBlob {
    /// Seal `plaintext` to `recipient_public`.
    ///
    /// `recipient` is bound into the derived key for the ChaCha scheme; the
    /// XSalsa scheme ignores it to stay wallet-compatible.
    pub fn seal(
        scheme: WrapScheme,
        recipient: &WalletAddress,
        recipient_public: &EncryptionPublicKey,
        plaintext: &[u8],
    ) -> Result<Self> {
        match scheme {
            WrapScheme::X25519XSalsa20Poly1305 => seal_xsalsa(recipient_public, plaintext),
            WrapScheme::X25519ChaCha20Poly1305 => {
                seal_chacha(recipient, recipient_public, plaintext)
            }
        }
    }

    /// Open this blob with the recipient's secret.
    ///
    /// A blob sealed to a different key fails with `AccessDenied`.
    pub fn open(&self, recipient: &WalletAddress, secret: &AgentSecret) -> Result<Vec<u8>> {
        let ephem_public = EncryptionPublicKey::from_base64(&self.ephem_public_key)?;
        let ciphertext = decode_field("ciphertext", &self.ciphertext)?;

        let opened = match self.scheme()? {
            WrapScheme::X25519XSalsa20Poly1305 => {
                let nonce = decode_nonce::<XSALSA_NONCE_LEN>(&self.nonce)?;
                let salsa_box = SalsaBox::new(
                    &crypto_box::PublicKey::from(*ephem_public.as_bytes()),
                    &secret.to_box_secret(),
                );
                salsa_box.decrypt(crypto_box::Nonce::from_slice(&nonce), ciphertext.as_slice())
            }
            WrapScheme::X25519ChaCha20Poly1305 => {
                let nonce = decode_nonce::<CHACHA_NONCE_LEN>(&self.nonce)?;
                let shared = secret.diffie_hellman(&ephem_public);
                let wrap_key = shared.derive_wrap_key(recipient.as_bytes());
                let cipher = ChaCha20Poly1305::new_from_slice(&wrap_key)
                    .map_err(|e| KeysError::CryptoFailure(e.to_string()))?;
                cipher.decrypt(
                    chacha20poly1305::Nonce::from_slice(&nonce),
                    ciphertext.as_slice(),
                )
            }
        };

        opened.map_err(|_| KeysError::AccessDenied {
            identity: *recipient,
            reason: "wrapped key was not sealed for this identity".to_string(),
        })
    }

    /// The scheme named by `version`.
    pub fn scheme(&self) -> Result<WrapScheme> {
        self.version.parse()
    }

    /// Encode as the opaque envelope entry.
    pub fn to_wrapped_key(&self) -> Result<WrappedKey> {
        serde_json::to_vec(self)
            .map(WrappedKey::new)
            .map_err(|e| KeysError::CryptoFailure(e.to_string()))
    }

    /// Decode an envelope entry.
    pub fn from_wrapped_key(wrapped: &WrappedKey) -> Result<Self> {
        serde_json::from_slice(wrapped.as_bytes())
            .map_err(|e| KeysError::MalformedBlob(e.to_string()))
    }
}

fn seal_xsalsa(recipient_public: &EncryptionPublicKey, plaintext: &[u8]) -> Result<EncryptedKeyBlob> {
    let ephemeral = AgentSecret::generate();
    let mut nonce = [0u8; XSALSA_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let salsa_box = SalsaBox::new(
        &crypto_box::PublicKey::from(*recipient_public.as_bytes()),
        &ephemeral.to_box_secret(),
    );
    let ciphertext = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| KeysError::CryptoFailure(e.to_string()))?;

    Ok(EncryptedKeyBlob {
        version: WrapScheme::X25519XSalsa20Poly1305.as_str().to_string(),
        nonce: STANDARD.encode(nonce),
        ephem_public_key: ephemeral.public_key().to_base64(),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

fn seal_chacha(
    recipient: &WalletAddress,
    recipient_public: &EncryptionPublicKey,
    plaintext: &[u8],
) -> Result<EncryptedKeyBlob> {
    let ephemeral = EphemeralKeyPair::generate();
    let ephem_public = ephemeral.public_key();
    let shared = ephemeral.diffie_hellman(recipient_public);
    let wrap_key = shared.derive_wrap_key(recipient.as_bytes());

    let mut nonce = [0u8; CHACHA_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new_from_slice(&wrap_key)
        .map_err(|e| KeysError::CryptoFailure(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(chacha20poly1305::Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| KeysError::CryptoFailure(e.to_string()))?;

    Ok(EncryptedKeyBlob {
        version: WrapScheme::X25519ChaCha20Poly1305.as_str().to_string(),
        nonce: STANDARD.encode(nonce),
        ephem_public_key: ephem_public.to_base64(),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| KeysError::MalformedBlob(format!("{name}: {e}")))
}

fn decode_nonce<const N: usize>(value: &str) -> Result<[u8; N]> {
    let bytes = decode_field("nonce", value)?;
    bytes.as_slice().try_into().map_err(|_| {
        KeysError::MalformedBlob(format!("nonce: expected {N} bytes, got {}", bytes.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient() -> (WalletAddress, AgentSecret) {
        (WalletAddress::from_bytes([0x11; 20]), AgentSecret::generate())
    }

    #[test]
    fn test_seal_open_both_schemes() {
        let (addr, secret) = recipient();
        for scheme in [
            WrapScheme::X25519XSalsa20Poly1305,
            WrapScheme::X25519ChaCha20Poly1305,
        ] {
            let blob =
                EncryptedKeyBlob::seal(scheme, &addr, &secret.public_key(), b"payload").unwrap();
            assert_eq!(blob.scheme().unwrap(), scheme);
            assert_eq!(blob.open(&addr, &secret).unwrap(), b"payload");
        }
    }

    #[test]
    fn test_open_with_wrong_secret_is_access_denied() {
        let (addr, secret) = recipient();
        let other = AgentSecret::generate();
        for scheme in [
            WrapScheme::X25519XSalsa20Poly1305,
            WrapScheme::X25519ChaCha20Poly1305,
        ] {
            let blob =
                EncryptedKeyBlob::seal(scheme, &addr, &secret.public_key(), b"payload").unwrap();
            let err = blob.open(&addr, &other).unwrap_err();
            assert!(matches!(err, KeysError::AccessDenied { .. }));
        }
    }

    #[test]
    fn test_chacha_blob_bound_to_recipient_address() {
        let (addr, secret) = recipient();
        let blob = EncryptedKeyBlob::seal(
            WrapScheme::X25519ChaCha20Poly1305,
            &addr,
            &secret.public_key(),
            b"payload",
        )
        .unwrap();

        let elsewhere = WalletAddress::from_bytes([0x22; 20]);
        assert!(matches!(
            blob.open(&elsewhere, &secret),
            Err(KeysError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_blob_json_uses_wallet_field_names() {
        let (addr, secret) = recipient();
        let blob = EncryptedKeyBlob::seal(
            WrapScheme::X25519XSalsa20Poly1305,
            &addr,
            &secret.public_key(),
            b"payload",
        )
        .unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(blob.to_wrapped_key().unwrap().as_bytes()).unwrap();
        assert_eq!(value["version"], "x25519-xsalsa20-poly1305");
        assert!(value["nonce"].is_string());
        assert!(value["ephemPublicKey"].is_string());
        assert!(value["ciphertext"].is_string());
    }

    #[test]
    fn test_wrapped_key_roundtrip() {
        let (addr, secret) = recipient();
        let blob = EncryptedKeyBlob::seal(
            WrapScheme::default(),
            &addr,
            &secret.public_key(),
            b"payload",
        )
        .unwrap();
        let wrapped = blob.to_wrapped_key().unwrap();
        assert_eq!(EncryptedKeyBlob::from_wrapped_key(&wrapped).unwrap(), blob);
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let (addr, secret) = recipient();
        let mut blob = EncryptedKeyBlob::seal(
            WrapScheme::default(),
            &addr,
            &secret.public_key(),
            b"payload",
        )
        .unwrap();
        blob.version = "rsa-oaep".to_string();

        assert!(matches!(
            blob.open(&addr, &secret),
            Err(KeysError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_bad_nonce_length_is_malformed() {
        let (addr, secret) = recipient();
        let mut blob = EncryptedKeyBlob::seal(
            WrapScheme::default(),
            &addr,
            &secret.public_key(),
            b"payload",
        )
        .unwrap();
        blob.nonce = STANDARD.encode([0u8; 12]);

        assert!(matches!(
            blob.open(&addr, &secret),
            Err(KeysError::MalformedBlob(_))
        ));
    }
}
