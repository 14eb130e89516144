//! # Content Digest
//!
//! `ContentDigest` can only be computed from [`CanonicalBytes`], so every
//! checksum in the system (QR integrity checksums, placeholder proof values)
//! is taken over the canonical serialization of a document, never over an
//! arbitrary JSON rendering of it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;

/// SHA-256 of a canonical document. Serializes as 64 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a checksum as presented by a client. Case-insensitive,
    /// surrounding whitespace ignored.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != 64 || !s.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.to_hex()
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s).ok_or_else(|| format!("not a SHA-256 hex digest: {s}"))
    }
}

/// Accepts only `&CanonicalBytes`, not raw `&[u8]`.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    ContentDigest(Sha256::digest(data.as_bytes()).into())
}

pub fn sha256_hex(data: &CanonicalBytes) -> String {
    sha256_digest(data).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canonical(v: serde_json::Value) -> CanonicalBytes {
        CanonicalBytes::new(&v).unwrap()
    }

    #[test]
    fn key_order_does_not_change_digest() {
        assert_eq!(
            sha256_digest(&canonical(json!({"b": 2, "a": 1}))),
            sha256_digest(&canonical(json!({"a": 1, "b": 2})))
        );
    }

    #[test]
    fn different_inputs_different_digests() {
        assert_ne!(
            sha256_digest(&canonical(json!({"a": 1}))),
            sha256_digest(&canonical(json!({"a": 2})))
        );
    }

    #[test]
    fn known_vector_empty_object() {
        assert_eq!(
            sha256_hex(&canonical(json!({}))),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn presented_checksum_parses_case_insensitively() {
        let digest = sha256_digest(&canonical(json!({"batchId": "BATCH-1"})));
        let shouted = format!("  {}\n", digest.to_hex().to_uppercase());
        assert_eq!(ContentDigest::from_hex(&shouted), Some(digest));
    }

    #[test]
    fn malformed_checksums_rejected() {
        assert_eq!(ContentDigest::from_hex(""), None);
        assert_eq!(ContentDigest::from_hex(&"zz".repeat(32)), None);
        assert_eq!(ContentDigest::from_hex(&"ab".repeat(31)), None);
        assert_eq!(ContentDigest::from_hex(&"é".repeat(32)), None);
    }

    #[test]
    fn serde_uses_hex_string() {
        let digest = sha256_digest(&canonical(json!([1, 2, 3])));
        let encoded = serde_json::to_value(digest).unwrap();
        assert_eq!(encoded, json!(digest.to_hex()));
        let decoded: ContentDigest = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, digest);
    }
}
