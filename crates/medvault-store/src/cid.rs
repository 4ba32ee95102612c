//! Content identifiers for the in-process backends.

use medvault_core::ContentId;

/// Compute the CIDv1 of `bytes`.
///
/// Format: `b` + base32lower(0x01 || 0x55 || 0x1e || 0x20 || blake3(bytes))
pub fn content_id_for(bytes: &[u8]) -> ContentId {
    let hash = blake3::hash(bytes);

    let mut cid_bytes = Vec::with_capacity(36);
    cid_bytes.push(0x01); // CIDv1
    cid_bytes.push(0x55); // raw codec
    cid_bytes.push(0x1e); // blake3 multihash
    cid_bytes.push(0x20); // 32 bytes
    cid_bytes.extend_from_slice(hash.as_bytes());

    ContentId::new(format!("b{}", base32_encode(&cid_bytes)))
}

/// True if `id` is the identifier of `bytes`.
pub fn matches_content(id: &ContentId, bytes: &[u8]) -> bool {
    content_id_for(bytes) == *id
}

// RFC 4648 Base32 encoding (lowercase, no padding)
fn base32_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut result = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in data {
        buffer = (buffer << 8) | u64::from(byte);
        bits_in_buffer += 8;

        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = ((buffer >> bits_in_buffer) & 0x1f) as usize;
            result.push(ALPHABET[index] as char);
        }
    }

    if bits_in_buffer > 0 {
        let index = ((buffer << (5 - bits_in_buffer)) & 0x1f) as usize;
        result.push(ALPHABET[index] as char);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_is_deterministic() {
        assert_eq!(content_id_for(b"envelope"), content_id_for(b"envelope"));
        assert_ne!(content_id_for(b"envelope"), content_id_for(b"envelope2"));
    }

    #[test]
    fn test_cid_format() {
        let cid = content_id_for(b"hello");
        // 36 bytes -> 58 base32 digits, plus the multibase prefix
        assert_eq!(cid.as_str().len(), 59);
        assert!(cid.as_str().starts_with("bafkr4i"));
        assert_eq!(cid.as_str(), cid.as_str().to_lowercase());
        assert!(matches_content(&cid, b"hello"));
        assert!(!matches_content(&cid, b"hellO"));
    }

    #[test]
    fn test_base32_encode() {
        // Test vector from RFC 4648
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "my");
        assert_eq!(base32_encode(b"fo"), "mzxq");
        assert_eq!(base32_encode(b"foo"), "mzxw6");
        assert_eq!(base32_encode(b"foob"), "mzxw6yq");
        assert_eq!(base32_encode(b"fooba"), "mzxw6ytb");
        assert_eq!(base32_encode(b"foobar"), "mzxw6ytboi");
    }
}
