//! # QR encoder capability
//!
//! Turns a verification URL and a signed document into a scannable
//! artifact plus an integrity checksum (SHA-256 over the canonical
//! document serialization).
//!
//! The payload is always the wallet envelope
//! `{ver, type: "VC", url, format, data: {credential, issuanceDate, expirationDate}}`.
//! A full certificate usually exceeds QR byte capacity at error-correction
//! level M; the symbol then encodes a reference (URL and checksum only)
//! while the artifact still carries the full envelope. A scanner fetches
//! the document from the public URL and checks it against the checksum.

use base64::Engine;
use qrcode::render::svg;
use qrcode::types::QrError;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use agricert_core::{sha256_digest, sha256_hex, CanonicalBytes, ContentDigest, Timestamp};

use crate::error::VcError;
use crate::template::QrOptions;

/// Whether the whole credential is inside the code or only a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrMode {
    Embedded,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrArtifact {
    /// `data:` URL of the rendered image.
    pub image: String,
    pub media_type: String,
    /// The full envelope, whatever the symbol holds.
    pub payload: String,
    /// The exact text encoded in the symbol. Equal to `payload` when
    /// embedded, the reference envelope otherwise.
    pub encoded: String,
    pub checksum: String,
    pub url: String,
    pub mode: QrMode,
    pub generated_at: Timestamp,
}

/// Encodes verification payloads. Pure; implementations hold no state
/// beyond their options.
pub trait QrEncoder: Send + Sync {
    fn encode(&self, url: &str, document: &Value) -> Result<QrArtifact, VcError>;
}

/// SHA-256 hex of the canonical serialization of `document`.
pub fn document_checksum(document: &Value) -> Result<String, VcError> {
    Ok(sha256_hex(&CanonicalBytes::from_value(document)?))
}

/// Whether `checksum` matches `document`.
pub fn verify_checksum(document: &Value, checksum: &str) -> bool {
    let Some(presented) = ContentDigest::from_hex(checksum) else {
        return false;
    };
    CanonicalBytes::from_value(document).is_ok_and(|c| sha256_digest(&c) == presented)
}

/// SVG renderer backed by the `qrcode` crate.
#[derive(Debug, Clone)]
pub struct SvgQrEncoder {
    options: QrOptions,
}

impl SvgQrEncoder {
    pub fn new(options: QrOptions) -> Self {
        Self { options }
    }

    fn envelope(&self, url: &str, document: &Value) -> Result<String, VcError> {
        let envelope = json!({
            "ver": self.options.version,
            "type": "VC",
            "url": url,
            "format": self.options.format,
            "data": {
                "credential": document,
                "issuanceDate": document.get("issuanceDate").cloned().unwrap_or(Value::Null),
                "expirationDate": document.get("expirationDate").cloned().unwrap_or(Value::Null),
            }
        });
        Ok(serde_json::to_string(&envelope)?)
    }

    fn reference_payload(&self, url: &str, checksum: &str) -> Result<String, VcError> {
        let envelope = json!({
            "ver": self.options.version,
            "type": "VC",
            "url": url,
            "format": self.options.format,
            "checksum": checksum,
        });
        Ok(serde_json::to_string(&envelope)?)
    }

    fn render(&self, code: &QrCode) -> String {
        let dim = self.options.min_dimension;
        let svg_text = code
            .render::<svg::Color>()
            .min_dimensions(dim, dim)
            .build();
        format!(
            "data:image/svg+xml;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(svg_text.as_bytes())
        )
    }
}

impl QrEncoder for SvgQrEncoder {
    fn encode(&self, url: &str, document: &Value) -> Result<QrArtifact, VcError> {
        let checksum = document_checksum(document)?;

        let payload = self.envelope(url, document)?;
        let (code, encoded, mode) =
            match QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M) {
                Ok(code) => (code, payload.clone(), QrMode::Embedded),
                Err(QrError::DataTooLong) => {
                    tracing::debug!(
                        bytes = payload.len(),
                        "credential exceeds QR capacity, encoding reference payload"
                    );
                    let reference = self.reference_payload(url, &checksum)?;
                    let code = QrCode::with_error_correction_level(reference.as_bytes(), EcLevel::M)
                        .map_err(|e| VcError::Qr(e.to_string()))?;
                    (code, reference, QrMode::Reference)
                }
                Err(e) => return Err(VcError::Qr(e.to_string())),
            };

        Ok(QrArtifact {
            image: self.render(&code),
            media_type: "image/svg+xml".to_string(),
            payload,
            encoded,
            checksum,
            url: url.to_string(),
            mode,
            generated_at: Timestamp::now(),
        })
    }
}
