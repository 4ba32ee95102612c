//! Envelope codec.
//!
//! An [`Envelope`] is the durable artifact held by content-addressed storage:
//! one encrypted record body plus the record key wrapped once per recipient.
//!
//! Wire format (JSON object):
//!
//! ```text
//! {
//!   "data": "<base64 ciphertext>",
//!   "iv": "<base64 96-bit iv>",
//!   "keys": { "<address>": "<base64 wrapped key>", ... },
//!   "wallet_address": "<subject address>"
//! }
//! ```
//!
//! Binary fields are base64 on the wire and raw bytes in memory; the codec
//! owns that conversion.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::cipher::{Iv, SealedRecord};
use crate::error::{CoreError, Result};
use crate::types::WalletAddress;

/// An opaque, recipient-specific wrapped record key.
///
/// The codec never looks inside; only the key wrapper can interpret it.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    /// Wrap raw blob bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the raw blob bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Transport-safe text form.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Parse the transport-safe text form.
    pub fn from_base64(s: &str) -> Result<Self> {
        STANDARD
            .decode(s)
            .map(Self)
            .map_err(|e| CoreError::DecodeFailure(format!("wrapped key: {e}")))
    }
}

impl std::fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WrappedKey({} bytes)", self.0.len())
    }
}

/// The recipient → wrapped-key map of an envelope.
pub type RecipientKeys = BTreeMap<WalletAddress, WrappedKey>;

/// A validated multi-recipient envelope.
///
/// Fields are private: every `Envelope` value satisfies the invariants that
/// `keys` is non-empty and contains `subject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    data: Vec<u8>,
    iv: Iv,
    keys: RecipientKeys,
    subject: WalletAddress,
}

/// Serde view of the wire format.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    data: String,
    iv: String,
    keys: BTreeMap<String, String>,
    wallet_address: String,
}

impl Envelope {
    /// Assemble an envelope, checking the recipient-set invariants.
    pub fn build(
        data: Vec<u8>,
        iv: Iv,
        keys: RecipientKeys,
        subject: WalletAddress,
    ) -> Result<Self> {
        check_recipients(&keys, &subject).map_err(CoreError::InvariantViolation)?;
        Ok(Self {
            data,
            iv,
            keys,
            subject,
        })
    }

    /// Assemble an envelope from a fresh encryption.
    pub fn from_sealed(
        sealed: SealedRecord,
        keys: RecipientKeys,
        subject: WalletAddress,
    ) -> Result<Self> {
        Self::build(sealed.ciphertext, sealed.iv, keys, subject)
    }

    /// Parse and validate raw wire bytes.
    ///
    /// Every structural problem is reported as `MalformedEnvelope`.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let wire: WireEnvelope =
            serde_json::from_slice(raw).map_err(|e| malformed(format!("{e}")))?;

        let data = STANDARD
            .decode(&wire.data)
            .map_err(|e| malformed(format!("data is not base64: {e}")))?;

        let iv_bytes = STANDARD
            .decode(&wire.iv)
            .map_err(|e| malformed(format!("iv is not base64: {e}")))?;
        let iv = Iv::from_slice(&iv_bytes).map_err(|e| malformed(format!("iv: {e}")))?;

        let subject = WalletAddress::parse(&wire.wallet_address)
            .map_err(|e| malformed(format!("wallet_address: {e}")))?;

        let mut keys = RecipientKeys::new();
        for (address, blob) in &wire.keys {
            let identity = WalletAddress::parse(address)
                .map_err(|e| malformed(format!("keys: {e}")))?;
            let wrapped = WrappedKey::from_base64(blob)
                .map_err(|e| malformed(format!("keys[{address}]: {e}")))?;
            if keys.insert(identity, wrapped).is_some() {
                return Err(malformed(format!(
                    "keys: duplicate entry for {identity} after case normalization"
                )));
            }
        }

        check_recipients(&keys, &subject).map_err(malformed)?;

        Ok(Self {
            data,
            iv,
            keys,
            subject,
        })
    }

    /// Encode to compact wire JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let wire = WireEnvelope {
            data: STANDARD.encode(&self.data),
            iv: STANDARD.encode(self.iv.as_bytes()),
            keys: self
                .keys
                .iter()
                .map(|(identity, wrapped)| (identity.to_hex(), wrapped.to_base64()))
                .collect(),
            wallet_address: self.subject.to_hex(),
        };
        serde_json::to_vec(&wire).map_err(|e| CoreError::CryptoFailure(e.to_string()))
    }

    /// The record ciphertext (tag included).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The IV used for `data`.
    pub fn iv(&self) -> &Iv {
        &self.iv
    }

    /// The recipient → wrapped-key map.
    pub fn keys(&self) -> &RecipientKeys {
        &self.keys
    }

    /// The identity this envelope is about.
    pub fn subject(&self) -> &WalletAddress {
        &self.subject
    }

    /// The current recipient set.
    pub fn recipients(&self) -> impl Iterator<Item = &WalletAddress> {
        self.keys.keys()
    }

    /// Whether `identity` holds a wrapped key.
    pub fn is_recipient(&self, identity: &WalletAddress) -> bool {
        self.keys.contains_key(identity)
    }

    /// The wrapped key for `identity`, if present.
    pub fn wrapped_key_for(&self, identity: &WalletAddress) -> Option<&WrappedKey> {
        self.keys.get(identity)
    }

    /// A copy with `identity`'s entry added or replaced; `data`/`iv` untouched.
    pub fn with_recipient(&self, identity: WalletAddress, wrapped: WrappedKey) -> Self {
        let mut next = self.clone();
        next.keys.insert(identity, wrapped);
        next
    }

    /// A copy without `identity`'s entry; `data`/`iv` untouched.
    ///
    /// Removing the subject is an invariant violation.
    pub fn without_recipient(&self, identity: &WalletAddress) -> Result<Self> {
        if identity == &self.subject {
            return Err(CoreError::InvariantViolation(format!(
                "subject {identity} cannot be removed from its own record"
            )));
        }
        let mut next = self.clone();
        next.keys.remove(identity);
        Ok(next)
    }

    /// A copy with a new body and recipient map, replacing `data` and `iv`
    /// together.
    pub fn with_body(&self, sealed: SealedRecord, keys: RecipientKeys) -> Result<Self> {
        Self::from_sealed(sealed, keys, self.subject)
    }
}

fn check_recipients(
    keys: &RecipientKeys,
    subject: &WalletAddress,
) -> std::result::Result<(), String> {
    if keys.is_empty() {
        return Err("recipient set is empty".to_string());
    }
    if !keys.contains_key(subject) {
        return Err(format!("subject {subject} is not a recipient"));
    }
    Ok(())
}

fn malformed(reason: impl Into<String>) -> CoreError {
    CoreError::MalformedEnvelope(reason.into())
}

/// Assemble an envelope. See [`Envelope::build`].
pub fn build_envelope(
    ciphertext: Vec<u8>,
    iv: Iv,
    wrapped_keys: RecipientKeys,
    subject: WalletAddress,
) -> Result<Envelope> {
    Envelope::build(ciphertext, iv, wrapped_keys, subject)
}

/// Parse wire bytes. See [`Envelope::parse`].
pub fn parse_envelope(raw: &[u8]) -> Result<Envelope> {
    Envelope::parse(raw)
}

/// Encode to wire bytes. See [`Envelope::to_bytes`].
pub fn serialize_envelope(envelope: &Envelope) -> Result<Vec<u8>> {
    envelope.to_bytes()
}
