//! # Inspection Lifecycle
//!
//! One inspection per batch, performed by the QA agency the batch is
//! assigned to. Findings are editable until a result is submitted; the
//! result is write-once.
//!
//! ```text
//! (none) ──start──▶ InProgress { result: null } ──submit──▶ Completed (terminal)
//!                        │   ▲
//!                        └───┘ update
//! ```
//!
//! Submitting `passed` or `failed` requires the completeness set
//! (moisture, pesticide, grain score, inspector name and license).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use agricert_core::{ActorId, AgriError, BatchId, InspectionId, Timestamp};
use agricert_vc::InspectionClaims;

use crate::batch::{BatchRecord, BatchStatus};

// ─── Result ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionResult {
    Passed,
    Failed,
    Conditional,
}

impl InspectionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Conditional => "conditional",
        }
    }

    /// Results that demand the completeness set before submission.
    pub fn requires_completeness(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

impl std::fmt::Display for InspectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InspectionResult {
    type Err = AgriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            "conditional" => Ok(Self::Conditional),
            _ => Err(AgriError::invalid(
                "Invalid result. Must be: passed, failed, or conditional",
            )),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, PartialEq)]
pub enum InspectionError {
    #[error("This batch is not assigned to you")]
    NotAssigned,

    #[error("Batch is not available for inspection")]
    BatchUnavailable { status: BatchStatus },

    #[error("Inspection already started for this batch")]
    AlreadyStarted,

    #[error("Cannot update completed inspection")]
    Completed,

    #[error("Inspection result already submitted")]
    ResultAlreadySubmitted,

    #[error("No valid fields to update")]
    EmptyPatch,

    #[error("{}", .0.join("; "))]
    InvalidMeasurements(Vec<String>),

    #[error("{}", .missing.iter().map(|f| format!("Required field missing: {f}")).collect::<Vec<_>>().join("; "))]
    Incomplete { missing: Vec<&'static str> },
}

impl From<InspectionError> for AgriError {
    fn from(err: InspectionError) -> Self {
        match err {
            InspectionError::NotAssigned => AgriError::AccessDenied(err.to_string()),
            InspectionError::InvalidMeasurements(reasons) => AgriError::Validation(reasons),
            InspectionError::Incomplete { missing } => AgriError::Validation(
                missing
                    .iter()
                    .map(|f| format!("Required field missing: {f}"))
                    .collect(),
            ),
            InspectionError::EmptyPatch => AgriError::invalid(err.to_string()),
            InspectionError::BatchUnavailable { .. }
            | InspectionError::AlreadyStarted
            | InspectionError::Completed
            | InspectionError::ResultAlreadySubmitted => AgriError::InvalidState(err.to_string()),
        }
    }
}

// ─── Findings ────────────────────────────────────────────────────────

/// Everything the QA agency records while inspecting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionFindings {
    pub moisture_level: Option<f64>,
    pub pesticide_content: Option<f64>,
    pub aflatoxin_level: Option<f64>,
    pub grain_quality_score: Option<f64>,
    pub heavy_metals_content: Option<f64>,
    pub microbiological_quality: Option<String>,
    #[serde(default)]
    pub is_organic: bool,
    #[serde(default)]
    pub is_gmo_free: bool,
    #[serde(default)]
    pub meets_iso22000: bool,
    #[serde(default)]
    pub meets_haccp: bool,
    #[serde(default)]
    pub meets_global_gap: bool,
    #[serde(default)]
    pub compliance_standards: Vec<String>,
    pub inspector_name: Option<String>,
    pub inspector_license: Option<String>,
    pub lab_name: Option<String>,
    pub lab_certificate_number: Option<String>,
    pub remarks: Option<String>,
    pub recommendations: Option<String>,
}

/// Fields a QA agency may set while the inspection is in progress.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InspectionPatch {
    pub moisture_level: Option<f64>,
    pub pesticide_content: Option<f64>,
    pub aflatoxin_level: Option<f64>,
    pub grain_quality_score: Option<f64>,
    pub heavy_metals_content: Option<f64>,
    pub microbiological_quality: Option<String>,
    pub is_organic: Option<bool>,
    pub is_gmo_free: Option<bool>,
    pub meets_iso22000: Option<bool>,
    pub meets_haccp: Option<bool>,
    pub meets_global_gap: Option<bool>,
    pub compliance_standards: Option<Vec<String>>,
    pub inspector_name: Option<String>,
    pub inspector_license: Option<String>,
    pub lab_name: Option<String>,
    pub lab_certificate_number: Option<String>,
    pub remarks: Option<String>,
    pub recommendations: Option<String>,
}

fn within(value: Option<f64>, min: f64, max: f64) -> bool {
    value.map_or(true, |v| v >= min && v <= max)
}

fn non_negative(value: Option<f64>) -> bool {
    value.map_or(true, |v| v >= 0.0 && v.is_finite())
}

impl InspectionPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Domain ranges for every measurement present in the patch.
    pub fn validate(&self) -> Result<(), InspectionError> {
        let mut errors = Vec::new();
        if !within(self.moisture_level, 0.0, 100.0) {
            errors.push("Moisture level must be between 0 and 100".to_string());
        }
        if !non_negative(self.pesticide_content) {
            errors.push("Pesticide content cannot be negative".to_string());
        }
        if !non_negative(self.aflatoxin_level) {
            errors.push("Aflatoxin level cannot be negative".to_string());
        }
        if !within(self.grain_quality_score, 0.0, 100.0) {
            errors.push("Grain quality score must be between 0 and 100".to_string());
        }
        if !non_negative(self.heavy_metals_content) {
            errors.push("Heavy metals content cannot be negative".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InspectionError::InvalidMeasurements(errors))
        }
    }
}

impl InspectionFindings {
    fn merge(&mut self, patch: InspectionPatch) {
        macro_rules! set {
            ($($field:ident),*) => { $( if patch.$field.is_some() { self.$field = patch.$field; } )* };
        }
        macro_rules! set_value {
            ($($field:ident),*) => { $( if let Some(v) = patch.$field { self.$field = v; } )* };
        }
        set!(
            moisture_level,
            pesticide_content,
            aflatoxin_level,
            grain_quality_score,
            heavy_metals_content,
            microbiological_quality,
            inspector_name,
            inspector_license,
            lab_name,
            lab_certificate_number,
            remarks,
            recommendations
        );
        set_value!(
            is_organic,
            is_gmo_free,
            meets_iso22000,
            meets_haccp,
            meets_global_gap,
            compliance_standards
        );
    }

    /// Names of completeness fields that are still empty.
    pub fn missing_for_completion(&self) -> Vec<&'static str> {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |v| v.trim().is_empty());
        let mut missing = Vec::new();
        if self.moisture_level.is_none() {
            missing.push("moistureLevel");
        }
        if self.pesticide_content.is_none() {
            missing.push("pesticideContent");
        }
        if self.grain_quality_score.is_none() {
            missing.push("grainQualityScore");
        }
        if blank(&self.inspector_name) {
            missing.push("inspectorName");
        }
        if blank(&self.inspector_license) {
            missing.push("inspectorLicense");
        }
        missing
    }
}

// ─── Inspection ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRecord {
    pub id: InspectionId,
    pub batch_id: BatchId,
    pub qa_agency_id: ActorId,
    pub inspection_date: Timestamp,
    #[serde(flatten)]
    pub findings: InspectionFindings,
    pub result: Option<InspectionResult>,
    pub result_submitted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl InspectionRecord {
    /// Start an inspection of `batch` by `caller`.
    ///
    /// `already_started` is whether an inspection exists for the batch;
    /// the ledger re-checks it when the insert commits.
    pub fn start(
        id: InspectionId,
        batch: &BatchRecord,
        caller: ActorId,
        already_started: bool,
    ) -> Result<Self, InspectionError> {
        if !batch.is_assigned_to(caller) {
            return Err(InspectionError::NotAssigned);
        }
        if batch.status != BatchStatus::UnderInspection {
            return Err(InspectionError::BatchUnavailable {
                status: batch.status,
            });
        }
        if already_started {
            return Err(InspectionError::AlreadyStarted);
        }
        let now = Timestamp::now();
        Ok(Self {
            id,
            batch_id: batch.id,
            qa_agency_id: caller,
            inspection_date: now,
            findings: InspectionFindings::default(),
            result: None,
            result_submitted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.result.is_some()
    }

    pub fn is_performed_by(&self, actor: ActorId) -> bool {
        self.qa_agency_id == actor
    }

    /// Merge findings. Rejected once a result exists; on any error no
    /// field changes.
    pub fn update(&mut self, patch: InspectionPatch) -> Result<(), InspectionError> {
        if self.is_completed() {
            return Err(InspectionError::Completed);
        }
        if patch.is_empty() {
            return Err(InspectionError::EmptyPatch);
        }
        patch.validate()?;
        self.findings.merge(patch);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Record the terminal result.
    pub fn submit(&mut self, result: InspectionResult) -> Result<(), InspectionError> {
        if self.is_completed() {
            return Err(InspectionError::ResultAlreadySubmitted);
        }
        if result.requires_completeness() {
            let missing = self.findings.missing_for_completion();
            if !missing.is_empty() {
                return Err(InspectionError::Incomplete { missing });
            }
        }
        let now = Timestamp::now();
        self.result = Some(result);
        self.result_submitted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Projection used when building credential subjects.
    pub fn claims(&self) -> InspectionClaims {
        let f = &self.findings;
        InspectionClaims {
            inspection_id: self.id.get(),
            inspection_date: Some(self.inspection_date),
            result: self.result.map(|r| r.as_str()).unwrap_or_default().to_string(),
            moisture_level: f.moisture_level,
            pesticide_content: f.pesticide_content,
            aflatoxin_level: f.aflatoxin_level,
            grain_quality_score: f.grain_quality_score,
            heavy_metals_content: f.heavy_metals_content,
            microbiological_quality: f.microbiological_quality.clone(),
            is_organic: f.is_organic,
            is_gmo_free: f.is_gmo_free,
            meets_iso22000: f.meets_iso22000,
            meets_haccp: f.meets_haccp,
            meets_global_gap: f.meets_global_gap,
            compliance_standards: f.compliance_standards.clone(),
            inspector_name: f.inspector_name.clone(),
            inspector_license: f.inspector_license.clone(),
            lab_name: f.lab_name.clone(),
            lab_certificate_number: f.lab_certificate_number.clone(),
            remarks: f.remarks.clone(),
            recommendations: f.recommendations.clone(),
        }
    }
}

/// Progress label for the pending-inspections queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionProgress {
    NotStarted,
    InProgress,
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::NewBatch;
    use agricert_core::BatchNumber;
    use proptest::prelude::*;

    const QA: ActorId = ActorId(20);

    fn assigned_batch() -> BatchRecord {
        let mut b = BatchRecord::create(
            BatchId(1),
            BatchNumber::generate(),
            ActorId(10),
            NewBatch {
                product_type: Some("Grain".into()),
                product_name: Some("Rice".into()),
                quantity: Some(1000.0),
                unit: Some("kg".into()),
                origin_location: Some("Punjab".into()),
                destination_country: Some("UAE".into()),
                ..Default::default()
            },
        )
        .unwrap();
        b.assign_qa(QA).unwrap();
        b
    }

    fn started() -> InspectionRecord {
        InspectionRecord::start(InspectionId(5), &assigned_batch(), QA, false).unwrap()
    }

    fn complete_patch() -> InspectionPatch {
        InspectionPatch {
            moisture_level: Some(12.5),
            pesticide_content: Some(0.2),
            grain_quality_score: Some(95.0),
            inspector_name: Some("A. Kumar".into()),
            inspector_license: Some("LIC-77".into()),
            ..Default::default()
        }
    }

    // ── Start ────────────────────────────────────────────────────────

    #[test]
    fn start_by_assigned_agency() {
        let i = started();
        assert_eq!(i.batch_id, BatchId(1));
        assert!(i.result.is_none());
        assert!(i.is_performed_by(QA));
    }

    #[test]
    fn start_errors_in_precedence_order() {
        let batch = assigned_batch();
        assert_eq!(
            InspectionRecord::start(InspectionId(1), &batch, ActorId(99), true).unwrap_err(),
            InspectionError::NotAssigned
        );
        assert_eq!(
            InspectionRecord::start(InspectionId(1), &batch, QA, true).unwrap_err(),
            InspectionError::AlreadyStarted
        );

        let mut certified = batch.clone();
        certified.record_result(InspectionResult::Passed).unwrap();
        assert!(matches!(
            InspectionRecord::start(InspectionId(1), &certified, QA, false).unwrap_err(),
            InspectionError::BatchUnavailable { status: BatchStatus::Certified }
        ));
    }

    #[test]
    fn error_taxonomy_mapping() {
        assert!(matches!(AgriError::from(InspectionError::NotAssigned), AgriError::AccessDenied(_)));
        assert!(matches!(AgriError::from(InspectionError::Completed), AgriError::InvalidState(_)));
        assert!(matches!(
            AgriError::from(InspectionError::Incomplete { missing: vec!["inspectorName"] }),
            AgriError::Validation(ref r) if r == &vec!["Required field missing: inspectorName".to_string()]
        ));
    }

    // ── Update ───────────────────────────────────────────────────────

    #[test]
    fn update_merges_present_fields() {
        let mut i = started();
        i.update(InspectionPatch {
            moisture_level: Some(12.5),
            is_organic: Some(true),
            ..Default::default()
        })
        .unwrap();
        i.update(InspectionPatch {
            grain_quality_score: Some(95.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(i.findings.moisture_level, Some(12.5));
        assert_eq!(i.findings.grain_quality_score, Some(95.0));
        assert!(i.findings.is_organic);
    }

    #[test]
    fn update_rejects_out_of_range_without_change() {
        let mut i = started();
        let before = i.clone();
        let err = i
            .update(InspectionPatch {
                moisture_level: Some(101.0),
                pesticide_content: Some(-0.1),
                grain_quality_score: Some(50.0),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(
            err,
            InspectionError::InvalidMeasurements(vec![
                "Moisture level must be between 0 and 100".into(),
                "Pesticide content cannot be negative".into(),
            ])
        );
        assert_eq!(i, before);
    }

    #[test]
    fn empty_update_rejected() {
        assert_eq!(started().update(InspectionPatch::default()).unwrap_err(), InspectionError::EmptyPatch);
    }

    #[test]
    fn patch_rejects_unknown_keys() {
        let res: Result<InspectionPatch, _> = serde_json::from_str(r#"{"result":"passed"}"#);
        assert!(res.is_err());
        let ok: InspectionPatch = serde_json::from_str(r#"{"moistureLevel":12.5,"isGmoFree":true}"#).unwrap();
        assert_eq!(ok.is_gmo_free, Some(true));
    }

    // ── Submit ───────────────────────────────────────────────────────

    #[test]
    fn passed_requires_inspector_name() {
        let mut i = started();
        let mut patch = complete_patch();
        patch.inspector_name = None;
        i.update(patch).unwrap();
        assert_eq!(
            i.submit(InspectionResult::Passed).unwrap_err(),
            InspectionError::Incomplete { missing: vec!["inspectorName"] }
        );
        assert!(i.result.is_none());
    }

    #[test]
    fn conditional_skips_completeness() {
        let mut i = started();
        i.submit(InspectionResult::Conditional).unwrap();
        assert_eq!(i.result, Some(InspectionResult::Conditional));
    }

    #[test]
    fn result_is_write_once() {
        let mut i = started();
        i.update(complete_patch()).unwrap();
        i.submit(InspectionResult::Passed).unwrap();
        let frozen = i.clone();

        assert_eq!(i.submit(InspectionResult::Failed).unwrap_err(), InspectionError::ResultAlreadySubmitted);
        assert_eq!(
            i.update(InspectionPatch { remarks: Some("late".into()), ..Default::default() }).unwrap_err(),
            InspectionError::Completed
        );
        assert_eq!(i, frozen);
    }

    #[test]
    fn result_parsing() {
        assert_eq!("passed".parse::<InspectionResult>().unwrap(), InspectionResult::Passed);
        let err = "pass".parse::<InspectionResult>().unwrap_err();
        assert_eq!(err.to_string(), "validation failed: Invalid result. Must be: passed, failed, or conditional");
    }

    #[test]
    fn record_serializes_flat() {
        let mut i = started();
        i.update(complete_patch()).unwrap();
        let v = serde_json::to_value(&i).unwrap();
        assert_eq!(v["moistureLevel"], 12.5);
        assert_eq!(v["qaAgencyId"], 20);
        assert!(v["result"].is_null());
        let back: InspectionRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, i);
    }

    #[test]
    fn claims_carry_result_text() {
        let mut i = started();
        i.update(complete_patch()).unwrap();
        i.submit(InspectionResult::Passed).unwrap();
        let c = i.claims();
        assert_eq!(c.result, "passed");
        assert_eq!(c.inspection_id, 5);
        assert_eq!(c.inspector_license.as_deref(), Some("LIC-77"));
    }

    proptest! {
        #[test]
        fn moisture_range_enforced(m in -50.0f64..150.0) {
            let mut i = started();
            let res = i.update(InspectionPatch { moisture_level: Some(m), ..Default::default() });
            prop_assert_eq!(res.is_ok(), (0.0..=100.0).contains(&m));
        }

        #[test]
        fn score_range_enforced(s in -50.0f64..150.0) {
            let mut i = started();
            let res = i.update(InspectionPatch { grain_quality_score: Some(s), ..Default::default() });
            prop_assert_eq!(res.is_ok(), (0.0..=100.0).contains(&s));
        }
    }
}
