//! # Canonical credential construction
//!
//! Builds the unsigned certificate document from batch, inspection and
//! party claims. Callers (the lifecycle engine) project their records into
//! the claim structs below; this module owns the document shape.
//!
//! Construction is deterministic given the same inputs and issuance time:
//! issuer and subject identifiers are derived from organization type and
//! id, never random. Only the credential id is random, and it is generated
//! by the caller.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use agricert_core::{CredentialId, Timestamp};

use crate::credential::{Issuer, VerifiableCredential};
use crate::did::generate_did;
use crate::error::VcError;
use crate::template::CredentialTemplate;

// ── Claim inputs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BatchClaims {
    pub batch_number: String,
    pub product_type: String,
    pub product_name: String,
    pub quantity: f64,
    pub unit: String,
    pub origin_location: String,
    pub destination_country: String,
    pub packaging_type: Option<String>,
    pub storage_conditions: Option<String>,
    pub created_at: Timestamp,
    pub attachments: Vec<AttachmentClaim>,
}

#[derive(Debug, Clone)]
pub struct AttachmentClaim {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub storage_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct InspectionClaims {
    pub inspection_id: i64,
    pub inspection_date: Option<Timestamp>,
    pub result: String,
    pub moisture_level: Option<f64>,
    pub pesticide_content: Option<f64>,
    pub aflatoxin_level: Option<f64>,
    pub grain_quality_score: Option<f64>,
    pub heavy_metals_content: Option<f64>,
    pub microbiological_quality: Option<String>,
    pub is_organic: bool,
    pub is_gmo_free: bool,
    pub meets_iso22000: bool,
    pub meets_haccp: bool,
    pub meets_global_gap: bool,
    pub compliance_standards: Vec<String>,
    pub inspector_name: Option<String>,
    pub inspector_license: Option<String>,
    pub lab_name: Option<String>,
    pub lab_certificate_number: Option<String>,
    pub remarks: Option<String>,
    pub recommendations: Option<String>,
}

/// An exporter or QA agency as it appears in the certificate.
#[derive(Debug, Clone, Default)]
pub struct PartyClaims {
    pub id: i64,
    pub name: String,
    pub organization: Option<String>,
    pub registration_number: Option<String>,
    pub license_number: Option<String>,
    pub address: Option<String>,
}

impl PartyClaims {
    fn display_name(&self) -> &str {
        self.organization.as_deref().unwrap_or(&self.name)
    }
}

pub struct IssuanceInput<'a> {
    pub credential_id: &'a CredentialId,
    pub batch: &'a BatchClaims,
    pub inspection: &'a InspectionClaims,
    pub exporter: &'a PartyClaims,
    pub qa_agency: &'a PartyClaims,
    pub issued_at: Timestamp,
}

// ── Subject shape ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CertificateSubject<'a> {
    id: String,
    #[serde(rename = "type")]
    subject_type: &'a str,
    batch_id: &'a str,
    product_name: &'a str,
    product_type: &'a str,
    origin: Origin<'a>,
    destination_country: &'a str,
    quantity: Quantity<'a>,
    harvest_date: Timestamp,
    exporter: SubjectParty<'a>,
    quality_standard: StandardClaim<'a>,
    inspection: InspectionSummary<'a>,
    quality_parameters: BTreeMap<String, QualityParameter<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    microbiological_quality: Option<&'a str>,
    certifications: &'a [String],
    supply_chain: SupplyChain<'a>,
    compliance: Compliance,
    attachments: Vec<AttachmentRef<'a>>,
}

#[derive(Serialize)]
struct Origin<'a> {
    location: &'a str,
}

#[derive(Serialize)]
struct Quantity<'a> {
    value: f64,
    unit: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectParty<'a> {
    id: String,
    name: &'a str,
    registration_number: &'a str,
    address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StandardClaim<'a> {
    standard: &'a str,
    version: &'a str,
    compliance_level: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectionSummary<'a> {
    inspection_id: i64,
    inspection_date: Timestamp,
    qa_agency: SubjectParty<'a>,
    inspector: Inspector<'a>,
    lab: Lab<'a>,
    result: &'a str,
    grade: &'a str,
    remarks: &'a str,
    recommendations: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Inspector<'a> {
    name: &'a str,
    license_number: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Lab<'a> {
    name: &'a str,
    certificate_number: &'a str,
}

/// `{value, unit, limit, status}` for one measured parameter.
#[derive(Debug, Serialize, PartialEq)]
pub struct QualityParameter<'a> {
    pub value: f64,
    pub unit: &'a str,
    pub limit: Option<f64>,
    pub status: QualityStatus,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QualityStatus {
    Pass,
    Fail,
    Unknown,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SupplyChain<'a> {
    stages: [Stage<'a>; 2],
    transport_conditions: TransportConditions<'a>,
}

#[derive(Serialize)]
struct Stage<'a> {
    stage: &'a str,
    location: &'a str,
    timestamp: Timestamp,
    handler: &'a str,
}

#[derive(Serialize)]
struct TransportConditions<'a> {
    packaging: &'a str,
    storage: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Compliance {
    organic: bool,
    gmo_free: bool,
    iso22000: bool,
    haccp: bool,
    global_gap: bool,
}

#[derive(Serialize)]
struct AttachmentRef<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    description: &'a str,
    url: &'a str,
}

// ── Construction ────────────────────────────────────────────────────────────

/// Annotate one measurement against the template's limits. Parameters
/// without a configured limit report `unknown`.
pub fn quality_parameter<'a>(
    template: &'a CredentialTemplate,
    parameter: &str,
    default_unit: &'a str,
    value: f64,
) -> QualityParameter<'a> {
    match template.limit_for(parameter) {
        Some(limit) => QualityParameter {
            value,
            unit: &limit.unit,
            limit: limit.reported_limit(),
            status: if limit.accepts(value) {
                QualityStatus::Pass
            } else {
                QualityStatus::Fail
            },
        },
        None => QualityParameter {
            value,
            unit: default_unit,
            limit: None,
            status: QualityStatus::Unknown,
        },
    }
}

fn quality_parameters<'a>(
    template: &'a CredentialTemplate,
    inspection: &InspectionClaims,
) -> BTreeMap<String, QualityParameter<'a>> {
    let measured = [
        ("moistureContent", "%", inspection.moisture_level),
        ("pesticideResidue", "mg/kg", inspection.pesticide_content),
        ("aflatoxinLevel", "ppb", inspection.aflatoxin_level),
        ("heavyMetals", "mg/kg", inspection.heavy_metals_content),
        ("grainQualityScore", "score", inspection.grain_quality_score),
    ];
    measured
        .into_iter()
        .filter_map(|(name, unit, value)| {
            value.map(|v| (name.to_string(), quality_parameter(template, name, unit, v)))
        })
        .collect()
}

/// Build the unsigned certificate document.
///
/// `expirationDate` is `issued_at` plus the template's validity period.
pub fn build_document(
    template: &CredentialTemplate,
    input: &IssuanceInput<'_>,
) -> Result<Value, VcError> {
    let IssuanceInput {
        credential_id,
        batch,
        inspection,
        exporter,
        qa_agency,
        issued_at,
    } = input;
    let domain = template.issuer.did_domain.as_str();

    let expires_at = issued_at
        .add_months(template.validity_months)
        .map_err(|e| VcError::DateRange(e.to_string()))?;
    let inspection_date = inspection.inspection_date.unwrap_or(*issued_at);
    let grade = template
        .grade_for(inspection.grain_quality_score)
        .unwrap_or("ungraded");
    let inspector_name = inspection
        .inspector_name
        .as_deref()
        .unwrap_or_else(|| qa_agency.display_name());

    let qa_party = SubjectParty {
        id: generate_did(domain, "qa_agency", &qa_agency.id.to_string()),
        name: qa_agency.display_name(),
        registration_number: qa_agency.registration_number.as_deref().unwrap_or(""),
        address: qa_agency.address.as_deref().unwrap_or(""),
    };

    let subject = CertificateSubject {
        id: generate_did(domain, "batch", &batch.batch_number),
        subject_type: &template.subject_type,
        batch_id: &batch.batch_number,
        product_name: &batch.product_name,
        product_type: &batch.product_type,
        origin: Origin {
            location: &batch.origin_location,
        },
        destination_country: &batch.destination_country,
        quantity: Quantity {
            value: batch.quantity,
            unit: &batch.unit,
        },
        harvest_date: batch.created_at,
        exporter: SubjectParty {
            id: generate_did(domain, "exporter", &exporter.id.to_string()),
            name: exporter.display_name(),
            registration_number: exporter.registration_number.as_deref().unwrap_or(""),
            address: exporter.address.as_deref().unwrap_or(""),
        },
        quality_standard: StandardClaim {
            standard: &template.quality_standard.standard,
            version: &template.quality_standard.version,
            compliance_level: grade,
        },
        inspection: InspectionSummary {
            inspection_id: inspection.inspection_id,
            inspection_date,
            qa_agency: qa_party,
            inspector: Inspector {
                name: inspector_name,
                license_number: inspection.inspector_license.as_deref().unwrap_or(""),
            },
            lab: Lab {
                name: inspection.lab_name.as_deref().unwrap_or(""),
                certificate_number: inspection.lab_certificate_number.as_deref().unwrap_or(""),
            },
            result: &inspection.result,
            grade,
            remarks: inspection.remarks.as_deref().unwrap_or(""),
            recommendations: inspection.recommendations.as_deref().unwrap_or(""),
        },
        quality_parameters: quality_parameters(template, inspection),
        microbiological_quality: inspection.microbiological_quality.as_deref(),
        certifications: &inspection.compliance_standards,
        supply_chain: SupplyChain {
            stages: [
                Stage {
                    stage: "Harvest",
                    location: &batch.origin_location,
                    timestamp: batch.created_at,
                    handler: exporter.display_name(),
                },
                Stage {
                    stage: "Inspection",
                    location: inspection.lab_name.as_deref().unwrap_or("Quality Lab"),
                    timestamp: inspection_date,
                    handler: inspector_name,
                },
            ],
            transport_conditions: TransportConditions {
                packaging: batch.packaging_type.as_deref().unwrap_or(""),
                storage: batch.storage_conditions.as_deref().unwrap_or(""),
            },
        },
        compliance: Compliance {
            organic: inspection.is_organic,
            gmo_free: inspection.is_gmo_free,
            iso22000: inspection.meets_iso22000,
            haccp: inspection.meets_haccp,
            global_gap: inspection.meets_global_gap,
        },
        attachments: batch
            .attachments
            .iter()
            .map(|a| AttachmentRef {
                kind: a.mime_type.as_deref().unwrap_or("document"),
                description: &a.file_name,
                url: &a.storage_key,
            })
            .collect(),
    };

    let vc = VerifiableCredential {
        context: template.context.clone(),
        id: Some(format!("urn:agricert:credential:{credential_id}")),
        credential_type: template.types.clone(),
        issuer: Issuer {
            id: generate_did(domain, "qa_agency", &qa_agency.id.to_string()),
            name: qa_agency
                .organization
                .clone()
                .unwrap_or_else(|| template.issuer.name.clone()),
        },
        issuance_date: *issued_at,
        expiration_date: expires_at,
        credential_subject: serde_json::to_value(&subject)?,
        proof: None,
    };
    vc.to_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> CredentialTemplate {
        CredentialTemplate::builtin().unwrap()
    }

    fn batch() -> BatchClaims {
        BatchClaims {
            batch_number: "BATCH-2026-1768478400000-042".into(),
            product_type: "Grain".into(),
            product_name: "Rice".into(),
            quantity: 1000.0,
            unit: "kg".into(),
            origin_location: "Punjab, India".into(),
            destination_country: "Netherlands".into(),
            packaging_type: Some("Jute bags".into()),
            storage_conditions: None,
            created_at: Timestamp::parse("2026-01-10T08:00:00Z").unwrap(),
            attachments: vec![AttachmentClaim {
                file_name: "lab-report.pdf".into(),
                mime_type: Some("application/pdf".into()),
                storage_key: "batches/1/lab-report.pdf".into(),
            }],
        }
    }

    fn inspection() -> InspectionClaims {
        InspectionClaims {
            inspection_id: 9,
            inspection_date: Some(Timestamp::parse("2026-01-12T09:00:00Z").unwrap()),
            result: "passed".into(),
            moisture_level: Some(12.5),
            pesticide_content: Some(0.8),
            grain_quality_score: Some(95.0),
            inspector_name: Some("A. Kumar".into()),
            inspector_license: Some("LIC-77".into()),
            is_organic: true,
            ..Default::default()
        }
    }

    fn party(id: i64, name: &str, org: Option<&str>) -> PartyClaims {
        PartyClaims {
            id,
            name: name.into(),
            organization: org.map(str::to_string),
            ..Default::default()
        }
    }

    fn build() -> Value {
        let id = CredentialId::parse("VC-0123456789abcdef0123456789abcdef").unwrap();
        let (b, i) = (batch(), inspection());
        let exporter = party(4, "Exporter Co", None);
        let qa = party(3, "qa-user", Some("Punjab Grain Labs"));
        let input = IssuanceInput {
            credential_id: &id,
            batch: &b,
            inspection: &i,
            exporter: &exporter,
            qa_agency: &qa,
            issued_at: Timestamp::parse("2026-01-15T12:00:00Z").unwrap(),
        };
        build_document(&template(), &input).unwrap()
    }

    #[test]
    fn envelope_fields() {
        let doc = build();
        assert_eq!(doc["id"], "urn:agricert:credential:VC-0123456789abcdef0123456789abcdef");
        assert_eq!(doc["type"][0], "VerifiableCredential");
        assert_eq!(doc["issuer"]["id"], "did:web:agriqcert.org:qa_agency:3");
        assert_eq!(doc["issuer"]["name"], "Punjab Grain Labs");
        assert_eq!(doc["issuanceDate"], "2026-01-15T12:00:00Z");
        assert_eq!(doc["expirationDate"], "2027-01-15T12:00:00Z");
        assert!(doc.get("proof").is_none());
    }

    #[test]
    fn subject_claims() {
        let doc = build();
        let s = &doc["credentialSubject"];
        assert_eq!(s["batchId"], "BATCH-2026-1768478400000-042");
        assert_eq!(s["type"], "AgriQualityCertificate");
        assert_eq!(s["quantity"]["value"], 1000.0);
        assert_eq!(s["exporter"]["id"], "did:web:agriqcert.org:exporter:4");
        assert_eq!(s["inspection"]["inspectionId"], 9);
        assert_eq!(s["inspection"]["result"], "passed");
        assert_eq!(s["inspection"]["grade"], "A");
        assert_eq!(s["supplyChain"]["stages"][0]["stage"], "Harvest");
        assert_eq!(s["supplyChain"]["stages"][1]["handler"], "A. Kumar");
        assert_eq!(s["compliance"]["organic"], true);
        assert_eq!(s["attachments"][0]["url"], "batches/1/lab-report.pdf");
    }

    #[test]
    fn quality_parameters_annotated_against_limits() {
        let doc = build();
        let q = &doc["credentialSubject"]["qualityParameters"];
        assert_eq!(q["moistureContent"]["status"], "pass");
        assert_eq!(q["moistureContent"]["limit"], 14.0);
        assert_eq!(q["pesticideResidue"]["status"], "fail");
        assert_eq!(q["grainQualityScore"]["status"], "pass");
        // not measured
        assert!(q.get("aflatoxinLevel").is_none());
    }

    #[test]
    fn parameter_without_limit_is_unknown() {
        let t = template();
        let p = quality_parameter(&t, "foreignMatter", "%", 1.0);
        assert_eq!(p.status, QualityStatus::Unknown);
        assert_eq!(p.limit, None);
    }

    #[test]
    fn construction_is_deterministic_for_fixed_time() {
        assert_eq!(build(), build());
    }

    #[test]
    fn issuer_name_falls_back_to_template() {
        let id = CredentialId::generate();
        let (b, i) = (batch(), inspection());
        let exporter = party(4, "Exporter Co", None);
        let qa = party(3, "qa-user", None);
        let input = IssuanceInput {
            credential_id: &id,
            batch: &b,
            inspection: &i,
            exporter: &exporter,
            qa_agency: &qa,
            issued_at: Timestamp::now(),
        };
        let doc = build_document(&template(), &input).unwrap();
        assert_eq!(doc["issuer"]["name"], "AgriQCert Quality Assurance");
    }
}
