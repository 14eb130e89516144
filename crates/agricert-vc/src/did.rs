//! Deterministic `did:web` identifiers for issuers and subjects.
//!
//! The same organization always maps to the same DID, so a verifier can
//! correlate certificates without any registry lookup.

/// `did:web:<domain>:<entity_type>:<sanitized id>`
///
/// Characters outside `[A-Za-z0-9-]` in the id are replaced with `-`.
pub fn generate_did(domain: &str, entity_type: &str, entity_id: &str) -> String {
    let sanitized: String = entity_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    format!("did:web:{domain}:{entity_type}:{sanitized}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids() {
        assert_eq!(
            generate_did("agriqcert.org", "exporter", "42"),
            "did:web:agriqcert.org:exporter:42"
        );
    }

    #[test]
    fn sanitizes_separators() {
        assert_eq!(
            generate_did("agriqcert.org", "inspector", "a.b/c:d é"),
            "did:web:agriqcert.org:inspector:a-b-c-d--"
        );
    }

    #[test]
    fn deterministic() {
        assert_eq!(
            generate_did("d", "qa_agency", "7"),
            generate_did("d", "qa_agency", "7")
        );
    }
}
