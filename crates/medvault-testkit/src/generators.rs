//! Proptest generators for medvault types.

use std::collections::BTreeSet;

use medvault_core::{SymmetricKey, WalletAddress};
use medvault_keys::WrapScheme;
use proptest::collection::SizeRange;
use proptest::prelude::*;
use serde_json::{json, Value};

/// Generate a random wallet address.
pub fn wallet_address() -> impl Strategy<Value = WalletAddress> {
    any::<[u8; 20]>().prop_map(WalletAddress::from_bytes)
}

/// Generate a set of distinct wallet addresses.
pub fn distinct_addresses(
    size: impl Into<SizeRange>,
) -> impl Strategy<Value = BTreeSet<WalletAddress>> {
    prop::collection::btree_set(wallet_address(), size)
}

/// Generate an address together with a textual form in random letter case,
/// with or without the `0x` prefix.
pub fn address_text() -> impl Strategy<Value = (WalletAddress, String)> {
    (
        wallet_address(),
        prop::collection::vec(any::<bool>(), 40),
        any::<bool>(),
    )
        .prop_map(|(address, upper, prefixed)| {
            let digits: String = address
                .to_hex()
                .trim_start_matches("0x")
                .chars()
                .zip(upper)
                .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c })
                .collect();
            let text = if prefixed {
                format!("0x{digits}")
            } else {
                digits
            };
            (address, text)
        })
}

/// Generate a random record key.
pub fn symmetric_key() -> impl Strategy<Value = SymmetricKey> {
    any::<[u8; 32]>().prop_map(SymmetricKey::from_bytes)
}

/// Generate a wrap scheme.
pub fn wrap_scheme() -> impl Strategy<Value = WrapScheme> {
    prop_oneof![
        Just(WrapScheme::X25519XSalsa20Poly1305),
        Just(WrapScheme::X25519ChaCha20Poly1305),
    ]
}

/// Generate a patient-record-shaped JSON document.
pub fn patient_record() -> impl Strategy<Value = Value> {
    (
        "[A-Z][a-z]{1,12} [A-Z][a-z]{1,12}",
        0u32..110,
        prop::collection::vec("[a-z]{3,10}", 0..5),
        prop::option::of(".{0,200}"),
    )
        .prop_map(|(name, age, allergies, notes)| {
            json!({
                "name": name,
                "age": age,
                "allergies": allergies,
                "notes": notes,
            })
        })
}

/// Generate an arbitrary JSON value.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        ".{0,32}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::from),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// One step of a random access history.
///
/// Party indices refer to a fixed list of non-subject parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    /// Grant the party at this index.
    Grant(usize),
    /// Revoke the party at this index.
    Revoke(usize),
}

/// Generate a sequence of grants and revokes over `parties` parties.
pub fn access_ops(
    parties: usize,
    len: impl Into<SizeRange>,
) -> impl Strategy<Value = Vec<AccessOp>> {
    let op = (any::<bool>(), 0..parties.max(1)).prop_map(|(grant, index)| {
        if grant {
            AccessOp::Grant(index)
        } else {
            AccessOp::Revoke(index)
        }
    });
    prop::collection::vec(op, len)
}
