use criterion::{black_box, criterion_group, criterion_main, Criterion};
use medvault_core::{Envelope, RecipientKeys, SymmetricKey, WalletAddress, WrappedKey};
use serde_json::json;

fn sample_record() -> serde_json::Value {
    json!({
        "wallet_address": "0x52908400098527886e0f7030069857d2e4169ee7",
        "name": "Ada Lovelace",
        "date_of_birth": "1815-12-10",
        "notes": vec!["routine check-up"; 64],
        "prescriptions": vec![json!({"drug": "amoxicillin", "dose_mg": 500}); 16],
    })
}

fn bench_cipher(c: &mut Criterion) {
    let key = SymmetricKey::generate();
    let record = sample_record();
    let sealed = key.encrypt(&record).unwrap();

    c.bench_function("encrypt_record", |b| {
        b.iter(|| key.encrypt(black_box(&record)).unwrap())
    });

    c.bench_function("decrypt_record", |b| {
        b.iter(|| {
            key.decrypt::<serde_json::Value>(black_box(&sealed.ciphertext), &sealed.iv)
                .unwrap()
        })
    });
}

fn bench_codec(c: &mut Criterion) {
    let key = SymmetricKey::generate();
    let subject = WalletAddress::from_bytes([1; 20]);
    let keys: RecipientKeys = (1..=8u8)
        .map(|b| (WalletAddress::from_bytes([b; 20]), WrappedKey::new(vec![b; 180])))
        .collect();
    let envelope =
        Envelope::from_sealed(key.encrypt(&sample_record()).unwrap(), keys, subject).unwrap();
    let bytes = envelope.to_bytes().unwrap();

    c.bench_function("parse_envelope", |b| {
        b.iter(|| Envelope::parse(black_box(&bytes)).unwrap())
    });
}

criterion_group!(benches, bench_cipher, bench_codec);
criterion_main!(benches);
