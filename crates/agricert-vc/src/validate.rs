//! Structural validation of credential documents.
//!
//! Only the required-field contract lives here. Signature checks belong to
//! the [`Signer`](crate::signer::Signer); a document that passes this check
//! says nothing about who produced it.

use serde_json::Value;

/// Members every credential document must carry.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "@context",
    "type",
    "issuer",
    "issuanceDate",
    "credentialSubject",
];

/// Check the required-field contract. Returns every problem found.
pub fn validate_structure(document: &Value) -> Result<(), Vec<String>> {
    let Some(obj) = document.as_object() else {
        return Err(vec!["Credential must be a JSON object".to_string()]);
    };

    let mut errors: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| obj.get(**field).map_or(true, is_blank))
        .map(|field| format!("Missing required field: {field}"))
        .collect();

    if let Some(types) = obj.get("type").filter(|t| !is_blank(t)) {
        let has_vc = types
            .as_array()
            .is_some_and(|arr| arr.iter().any(|t| t == "VerifiableCredential"));
        if !has_vc {
            errors.push("Credential type must include VerifiableCredential".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
