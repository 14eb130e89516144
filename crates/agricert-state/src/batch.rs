//! # Batch Lifecycle State Machine
//!
//! A batch is one export lot owned by one exporter.
//!
//! ## States
//!
//! ```text
//! Submitted ──▶ UnderInspection ──▶ Certified ──▶ Revoked ──▶ Certified (re-issue)
//!     │                │
//!     │                └──▶ Rejected (terminal)
//!     │
//!     └──▶ Deleted (terminal, soft)
//! ```
//!
//! A `conditional` inspection result leaves the batch in
//! `UnderInspection`. Descriptive fields can only be edited, and the
//! batch only deleted, while it is `Submitted`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use agricert_core::{ActorId, AgriError, BatchId, BatchNumber, Timestamp};
use agricert_vc::{AttachmentClaim, BatchClaims};

use crate::inspection::InspectionResult;

// ─── Batch Status ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Submitted,
    UnderInspection,
    Certified,
    Rejected,
    Revoked,
    Deleted,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderInspection => "under_inspection",
            Self::Certified => "certified",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
            Self::Deleted => "deleted",
        }
    }

    /// No transition leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Deleted)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = AgriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "under_inspection" => Ok(Self::UnderInspection),
            "certified" => Ok(Self::Certified),
            "rejected" => Ok(Self::Rejected),
            "revoked" => Ok(Self::Revoked),
            "deleted" => Ok(Self::Deleted),
            other => Err(AgriError::invalid(format!("Unknown batch status: {other}"))),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BatchError {
    #[error("invalid batch transition: {from} -> {to}")]
    InvalidTransition { from: BatchStatus, to: BatchStatus },

    #[error("Cannot update batch after inspection has started")]
    NotEditable { status: BatchStatus },

    #[error("Cannot delete batch after inspection has started")]
    NotDeletable { status: BatchStatus },

    #[error("Cannot upload attachments to this batch")]
    AttachmentsClosed { status: BatchStatus },
}

impl From<BatchError> for AgriError {
    fn from(err: BatchError) -> Self {
        AgriError::InvalidState(err.to_string())
    }
}

// ─── Transition History ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTransitionRecord {
    pub from_status: BatchStatus,
    pub to_status: BatchStatus,
    pub timestamp: Timestamp,
    pub reason: String,
}

// ─── Input Shapes ────────────────────────────────────────────────────

/// Creation payload. Every field is optional at the boundary so that
/// missing fields surface as validation messages, not parse errors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewBatch {
    pub product_type: Option<String>,
    pub product_name: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub origin_location: Option<String>,
    pub destination_country: Option<String>,
    pub packaging_type: Option<String>,
    pub storage_conditions: Option<String>,
}

/// Fields an owner may change while the batch is `Submitted`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchPatch {
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub packaging_type: Option<String>,
    pub storage_conditions: Option<String>,
    pub destination_country: Option<String>,
}

impl BatchPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn validate(&self) -> Result<(), AgriError> {
        let mut errors = Vec::new();
        if self.is_empty() {
            errors.push("No valid fields to update".to_string());
        }
        if self.quantity.is_some_and(|q| !(q > 0.0 && q.is_finite())) {
            errors.push("Quantity must be greater than 0".to_string());
        }
        if self.unit.as_deref().is_some_and(|u| u.trim().is_empty()) {
            errors.push("Unit is required".to_string());
        }
        if self.destination_country.as_deref().is_some_and(|d| d.trim().is_empty()) {
            errors.push("Destination country is required".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AgriError::Validation(errors))
        }
    }
}

fn present(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ─── Batch ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub id: BatchId,
    pub batch_number: BatchNumber,
    pub exporter_id: ActorId,
    pub product_type: String,
    pub product_name: String,
    pub quantity: f64,
    pub unit: String,
    pub origin_location: String,
    pub destination_country: String,
    pub packaging_type: Option<String>,
    pub storage_conditions: Option<String>,
    pub assigned_qa_id: Option<ActorId>,
    pub status: BatchStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub transitions: Vec<BatchTransitionRecord>,
}

impl BatchRecord {
    /// Validate a creation payload and build a `Submitted` batch.
    /// All validation messages are reported together.
    pub fn create(
        id: BatchId,
        batch_number: BatchNumber,
        exporter_id: ActorId,
        input: NewBatch,
    ) -> Result<Self, AgriError> {
        let mut errors = Vec::new();
        let product_type = present(&input.product_type);
        let product_name = present(&input.product_name);
        if product_type.is_none() || product_name.is_none() {
            errors.push("Product type and name are required".to_string());
        }
        let quantity = input.quantity.filter(|q| *q > 0.0 && q.is_finite());
        if quantity.is_none() {
            errors.push("Quantity must be greater than 0".to_string());
        }
        let unit = present(&input.unit);
        if unit.is_none() {
            errors.push("Unit is required".to_string());
        }
        let origin_location = present(&input.origin_location);
        if origin_location.is_none() {
            errors.push("Origin location is required".to_string());
        }
        let destination_country = present(&input.destination_country);
        if destination_country.is_none() {
            errors.push("Destination country is required".to_string());
        }

        match (product_type, product_name, quantity, unit, origin_location, destination_country) {
            (Some(pt), Some(pn), Some(q), Some(u), Some(o), Some(d)) => {
                let now = Timestamp::now();
                Ok(Self {
                    id,
                    batch_number,
                    exporter_id,
                    product_type: pt,
                    product_name: pn,
                    quantity: q,
                    unit: u,
                    origin_location: o,
                    destination_country: d,
                    packaging_type: present(&input.packaging_type),
                    storage_conditions: present(&input.storage_conditions),
                    assigned_qa_id: None,
                    status: BatchStatus::Submitted,
                    created_at: now,
                    updated_at: now,
                    transitions: Vec::new(),
                })
            }
            _ => Err(AgriError::Validation(errors)),
        }
    }

    pub fn is_owned_by(&self, actor: ActorId) -> bool {
        self.exporter_id == actor
    }

    pub fn is_assigned_to(&self, actor: ActorId) -> bool {
        self.assigned_qa_id == Some(actor)
    }

    /// Merge whitelisted fields (SUBMITTED only).
    pub fn apply_patch(&mut self, patch: BatchPatch) -> Result<(), AgriError> {
        if self.status != BatchStatus::Submitted {
            return Err(BatchError::NotEditable { status: self.status }.into());
        }
        patch.validate()?;
        if let Some(q) = patch.quantity {
            self.quantity = q;
        }
        if let Some(u) = present(&patch.unit) {
            self.unit = u;
        }
        if let Some(d) = present(&patch.destination_country) {
            self.destination_country = d;
        }
        if patch.packaging_type.is_some() {
            self.packaging_type = present(&patch.packaging_type);
        }
        if patch.storage_conditions.is_some() {
            self.storage_conditions = present(&patch.storage_conditions);
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Assign a QA agency (SUBMITTED → UNDER_INSPECTION).
    pub fn assign_qa(&mut self, qa_agency: ActorId) -> Result<(), BatchError> {
        self.require_status(&[BatchStatus::Submitted], BatchStatus::UnderInspection)?;
        self.assigned_qa_id = Some(qa_agency);
        self.do_transition(BatchStatus::UnderInspection, &format!("assigned to {qa_agency}"));
        Ok(())
    }

    /// Apply a submitted inspection result (UNDER_INSPECTION → CERTIFIED |
    /// REJECTED, or unchanged for `conditional`).
    pub fn record_result(&mut self, result: InspectionResult) -> Result<(), BatchError> {
        let target = match result {
            InspectionResult::Passed => BatchStatus::Certified,
            InspectionResult::Failed => BatchStatus::Rejected,
            InspectionResult::Conditional => BatchStatus::UnderInspection,
        };
        self.require_status(&[BatchStatus::UnderInspection], target)?;
        if target != self.status {
            self.do_transition(target, &format!("inspection {result}"));
        }
        Ok(())
    }

    /// Credential issued (CERTIFIED stays, REVOKED → CERTIFIED on re-issue).
    pub fn certify_on_issuance(&mut self) -> Result<(), BatchError> {
        self.require_status(
            &[BatchStatus::Certified, BatchStatus::Revoked],
            BatchStatus::Certified,
        )?;
        if self.status != BatchStatus::Certified {
            self.do_transition(BatchStatus::Certified, "credential re-issued");
        }
        Ok(())
    }

    /// Credential revoked (CERTIFIED → REVOKED; already REVOKED is a no-op).
    pub fn revoke(&mut self, reason: &str) -> Result<(), BatchError> {
        self.require_status(
            &[BatchStatus::Certified, BatchStatus::Revoked],
            BatchStatus::Revoked,
        )?;
        if self.status != BatchStatus::Revoked {
            self.do_transition(BatchStatus::Revoked, reason);
        }
        Ok(())
    }

    /// Soft delete (SUBMITTED → DELETED).
    pub fn soft_delete(&mut self) -> Result<(), BatchError> {
        if self.status != BatchStatus::Submitted {
            return Err(BatchError::NotDeletable { status: self.status });
        }
        self.do_transition(BatchStatus::Deleted, "deleted by owner");
        Ok(())
    }

    pub fn ensure_accepts_attachments(&self) -> Result<(), BatchError> {
        match self.status {
            BatchStatus::Certified | BatchStatus::Deleted => {
                Err(BatchError::AttachmentsClosed { status: self.status })
            }
            _ => Ok(()),
        }
    }

    /// Projection used when building credential subjects.
    pub fn claims(&self, attachments: Vec<AttachmentClaim>) -> BatchClaims {
        BatchClaims {
            batch_number: self.batch_number.as_str().to_string(),
            product_type: self.product_type.clone(),
            product_name: self.product_name.clone(),
            quantity: self.quantity,
            unit: self.unit.clone(),
            origin_location: self.origin_location.clone(),
            destination_country: self.destination_country.clone(),
            packaging_type: self.packaging_type.clone(),
            storage_conditions: self.storage_conditions.clone(),
            created_at: self.created_at,
            attachments,
        }
    }

    fn require_status(&self, allowed: &[BatchStatus], to: BatchStatus) -> Result<(), BatchError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(BatchError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }

    fn do_transition(&mut self, to: BatchStatus, reason: &str) {
        let now = Timestamp::now();
        self.transitions.push(BatchTransitionRecord {
            from_status: self.status,
            to_status: to,
            timestamp: now,
            reason: reason.to_string(),
        });
        self.status = to;
        self.updated_at = now;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
