//! # Canonical Serialization: JCS Byte Production
//!
//! `CanonicalBytes` is the only input accepted by digest computation and by
//! credential signing. Its inner buffer is private, so the only way to get
//! one is through [`CanonicalBytes::new()`], which serializes with RFC 8785
//! (JSON Canonicalization Scheme): sorted keys, compact separators, and
//! ECMAScript number formatting.
//!
//! ## Numbers
//!
//! Quality measurements are decimals (`moistureContent: 12.5`), so floats
//! are accepted. JCS renders every finite IEEE-754 double with the shortest
//! round-trip representation, which makes the byte sequence deterministic:
//! `1000.0` and `1000` both canonicalize to `1000`.
//!
//! ## Signing
//!
//! A verifier re-parses the credential JSON it scanned and canonicalizes it
//! again. Because the canonical form depends only on the JSON data model,
//! not on key order or whitespace in the transport encoding, the signature
//! input is reproducible on both sides.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization.
///
/// # Invariants
///
/// - Object keys are sorted by UTF-16 code units.
/// - No insignificant whitespace.
/// - Numbers use the ECMAScript shortest round-trip form.
/// - The content is valid UTF-8 JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::SerializationFailed` if the value
    /// cannot be represented as JSON (e.g. a map with non-string keys).
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Self::from_value(&value)
    }

    /// Construct canonical bytes from an already-parsed JSON value.
    pub fn from_value(value: &Value) -> Result<Self, CanonicalizationError> {
        let s = serde_jcs::to_string(value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// View the canonical form as a string.
    pub fn as_str(&self) -> Result<&str, CanonicalizationError> {
        std::str::from_utf8(&self.0)
            .map_err(|e| CanonicalizationError::Unrepresentable(e.to_string()))
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(v: serde_json::Value) -> String {
        let cb = CanonicalBytes::new(&v).expect("should canonicalize");
        cb.as_str().unwrap().to_string()
    }

    #[test]
    fn sorted_keys_compact_separators() {
        assert_eq!(
            canon(serde_json::json!({"b": 2, "a": 1, "c": "hello"})),
            r#"{"a":1,"b":2,"c":"hello"}"#
        );
    }

    #[test]
    fn nested_objects_sorted() {
        let s = canon(serde_json::json!({
            "outer": {"b": 2, "a": 1},
            "list": [3, 2, 1]
        }));
        assert_eq!(s, r#"{"list":[3,2,1],"outer":{"a":1,"b":2}}"#);
    }

    #[test]
    fn decimal_measurements_accepted() {
        assert_eq!(
            canon(serde_json::json!({"moisture": 12.5, "score": 95})),
            r#"{"moisture":12.5,"score":95}"#
        );
    }

    #[test]
    fn integral_float_matches_integer_form() {
        let a = CanonicalBytes::new(&serde_json::json!({"q": 1000.0})).unwrap();
        let b = CanonicalBytes::new(&serde_json::json!({"q": 1000})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn small_decimal_no_trailing_noise() {
        assert_eq!(canon(serde_json::json!({"v": 0.1})), r#"{"v":0.1}"#);
    }

    #[test]
    fn null_and_bool_passthrough() {
        assert_eq!(
            canon(serde_json::json!({"flag": true, "key": null})),
            r#"{"flag":true,"key":null}"#
        );
    }

    #[test]
    fn empty_containers() {
        assert_eq!(canon(serde_json::json!({})), "{}");
        assert_eq!(canon(serde_json::json!([])), "[]");
    }

    #[test]
    fn from_value_matches_new() {
        let v = serde_json::json!({"z": [1, {"y": 2, "x": 1}]});
        assert_eq!(
            CanonicalBytes::from_value(&v).unwrap(),
            CanonicalBytes::new(&v).unwrap()
        );
    }

    #[test]
    fn key_order_of_source_text_irrelevant() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":{"d":4,"c":3}}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str("{ \"b\" : { \"c\":3, \"d\":4 }, \"a\" : 1 }").unwrap();
        assert_eq!(
            CanonicalBytes::from_value(&a).unwrap(),
            CanonicalBytes::from_value(&b).unwrap()
        );
    }

    #[test]
    fn unicode_passthrough() {
        let s = canon(serde_json::json!({"name": "Basmati \u{00e9}"}));
        assert!(s.contains('\u{00e9}'));
    }

    #[test]
    fn len_and_is_empty() {
        let cb = CanonicalBytes::new(&serde_json::json!({"a": 1})).unwrap();
        assert!(!cb.is_empty());
        assert_eq!(cb.len(), 7);
    }
}
