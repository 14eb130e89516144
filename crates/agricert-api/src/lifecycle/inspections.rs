//! Inspection operations.
//!
//! Result submission writes the inspection and its batch in one commit:
//! no reader ever sees a terminal result next to a batch still in
//! `under_inspection`, or the reverse.

use serde::Serialize;

use agricert_core::{AgriError, BatchId, InspectionId};
use agricert_state::{
    BatchRecord, BatchStatus, InspectionError, InspectionPatch, InspectionProgress,
    InspectionRecord, InspectionResult, Role,
};

use crate::auth::{require_role, CallerIdentity};
use crate::store::{StoreError, Write};

use super::Lifecycle;

/// An entry of a QA agency's work queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInspection {
    #[serde(flatten)]
    pub batch: BatchRecord,
    pub inspection_status: InspectionProgress,
    pub inspection_id: Option<InspectionId>,
}

impl Lifecycle {
    /// Start the single inspection of an assigned batch.
    pub async fn start_inspection(
        &self,
        caller: &CallerIdentity,
        batch_id: BatchId,
    ) -> Result<InspectionRecord, AgriError> {
        require_role(caller, &[Role::QaAgency])?;
        let agency = caller.actor_id()?;
        let batch = self.load_batch(batch_id)?;
        let already_started = self.ledger.inspection_for_batch(batch_id).is_some();
        let inspection = InspectionRecord::start(
            self.ledger.next_inspection_id(),
            &batch,
            agency,
            already_started,
        )?;

        let mut uow = self.ledger.begin();
        uow.stage(Write::InsertInspection(inspection.clone()));
        match uow.commit().await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => return Err(InspectionError::AlreadyStarted.into()),
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            batch_id = %batch_id,
            inspection_id = %inspection.id,
            actor_id = %agency,
            "inspection started"
        );
        Ok(inspection)
    }

    /// Merge measurement fields while no result is recorded.
    pub async fn update_inspection(
        &self,
        caller: &CallerIdentity,
        id: InspectionId,
        patch: InspectionPatch,
    ) -> Result<InspectionRecord, AgriError> {
        let mut inspection = self.load_own_inspection(caller, id)?;
        inspection.update(patch)?;

        let mut uow = self.ledger.begin();
        uow.stage(Write::UpdateInspection(inspection.clone()));
        match uow.commit().await {
            Ok(()) => {}
            Err(StoreError::GuardFailed(_)) => return Err(InspectionError::Completed.into()),
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(inspection_id = %id, "inspection findings updated");
        Ok(inspection)
    }

    /// Record the terminal result and derive the batch status, atomically.
    pub async fn submit_result(
        &self,
        caller: &CallerIdentity,
        id: InspectionId,
        result: InspectionResult,
    ) -> Result<(InspectionRecord, BatchRecord), AgriError> {
        let mut inspection = self.load_own_inspection(caller, id)?;
        let mut batch = self.load_batch(inspection.batch_id)?;
        inspection.submit(result)?;
        batch.record_result(result)?;

        let mut uow = self.ledger.begin();
        uow.stage(Write::UpdateInspection(inspection.clone()));
        uow.stage(Write::UpdateBatch {
            record: batch.clone(),
            expect: BatchStatus::UnderInspection,
        });
        match uow.commit().await {
            Ok(()) => {}
            Err(StoreError::GuardFailed(reason)) => {
                tracing::debug!(inspection_id = %id, %reason, "submission lost a race");
                return Err(InspectionError::ResultAlreadySubmitted.into());
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            inspection_id = %id,
            batch_id = %batch.id,
            result = %result,
            batch_status = %batch.status,
            "inspection result submitted"
        );
        Ok((inspection, batch))
    }

    /// Assigned batches still awaiting a result, oldest first.
    pub fn pending_inspections(
        &self,
        caller: &CallerIdentity,
    ) -> Result<Vec<PendingInspection>, AgriError> {
        require_role(caller, &[Role::QaAgency])?;
        let agency = caller.actor_id()?;
        let mut batches = self.ledger.batches_where(|b| {
            b.is_assigned_to(agency) && b.status == BatchStatus::UnderInspection
        });
        batches.sort_by_key(|b| (b.created_at, b.id));

        Ok(batches
            .into_iter()
            .filter_map(|batch| match self.ledger.inspection_for_batch(batch.id) {
                Some(i) if i.is_completed() => None,
                Some(i) => Some(PendingInspection {
                    batch,
                    inspection_status: InspectionProgress::InProgress,
                    inspection_id: Some(i.id),
                }),
                None => Some(PendingInspection {
                    batch,
                    inspection_status: InspectionProgress::NotStarted,
                    inspection_id: None,
                }),
            })
            .collect())
    }

    /// Visible to the performing QA agency, the batch owner and admins.
    pub fn get_inspection(
        &self,
        caller: &CallerIdentity,
        id: InspectionId,
    ) -> Result<InspectionRecord, AgriError> {
        let inspection = self.load_inspection(id)?;
        let allowed = match caller.role {
            Role::Admin => true,
            Role::QaAgency => inspection.is_performed_by(caller.actor_id()?),
            Role::Exporter => {
                let exporter = caller.actor_id()?;
                self.ledger
                    .batch(inspection.batch_id)
                    .is_some_and(|b| b.is_owned_by(exporter))
            }
        };
        if !allowed {
            return Err(AgriError::AccessDenied("Access denied".into()));
        }
        Ok(inspection)
    }

    pub fn inspection_for_batch(
        &self,
        caller: &CallerIdentity,
        batch_id: BatchId,
    ) -> Result<InspectionRecord, AgriError> {
        let batch = self.load_batch(batch_id)?;
        self.ensure_can_view(caller, &batch)?;
        self.ledger
            .inspection_for_batch(batch_id)
            .ok_or_else(|| AgriError::NotFound("No inspection found for this batch".into()))
    }

    fn load_inspection(&self, id: InspectionId) -> Result<InspectionRecord, AgriError> {
        self.ledger
            .inspection(id)
            .ok_or_else(|| AgriError::NotFound("Inspection not found".into()))
    }

    fn load_own_inspection(
        &self,
        caller: &CallerIdentity,
        id: InspectionId,
    ) -> Result<InspectionRecord, AgriError> {
        require_role(caller, &[Role::QaAgency])?;
        let agency = caller.actor_id()?;
        let inspection = self.load_inspection(id)?;
        if !inspection.is_performed_by(agency) {
            return Err(InspectionError::NotAssigned.into());
        }
        Ok(inspection)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::store::FaultPlan;

    // ── Start ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn only_assigned_agency_starts_once() {
        let engine = engine().await;
        let batch = engine.create_batch(&exporter(), rice()).await.unwrap();

        let err = engine.start_inspection(&qa(), batch.id).await.unwrap_err();
        assert!(matches!(err, AgriError::AccessDenied(_)));

        engine.assign_qa(&admin(), batch.id, QA).await.unwrap();
        let other = CallerIdentity::actor(Role::QaAgency, OTHER_QA);
        let err = engine.start_inspection(&other, batch.id).await.unwrap_err();
        assert_eq!(err.to_string(), "This batch is not assigned to you");

        let inspection = engine.start_inspection(&qa(), batch.id).await.unwrap();
        assert!(inspection.result.is_none());

        let err = engine.start_inspection(&qa(), batch.id).await.unwrap_err();
        assert!(matches!(err, AgriError::InvalidState(m) if m == "Inspection already started for this batch"));
    }

    // ── Submit ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn passed_result_certifies_batch() {
        let engine = engine().await;
        let (batch, inspection) = inspected_batch(&engine).await;
        let (inspection, updated) = engine
            .submit_result(&qa(), inspection, InspectionResult::Passed)
            .await
            .unwrap();
        assert_eq!(inspection.result, Some(InspectionResult::Passed));
        assert_eq!(updated.status, BatchStatus::Certified);
        assert_eq!(engine.ledger().batch(batch.id).unwrap().status, BatchStatus::Certified);
    }

    #[tokio::test]
    async fn failed_rejects_and_conditional_keeps_status() {
        let engine = engine().await;
        let (_, failed) = inspected_batch(&engine).await;
        let (_, batch) = engine
            .submit_result(&qa(), failed, InspectionResult::Failed)
            .await
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Rejected);

        let (_, conditional) = inspected_batch(&engine).await;
        let (_, batch) = engine
            .submit_result(&qa(), conditional, InspectionResult::Conditional)
            .await
            .unwrap();
        assert_eq!(batch.status, BatchStatus::UnderInspection);
    }

    #[tokio::test]
    async fn completed_inspection_is_frozen() {
        let engine = engine().await;
        let (_, id) = passed_batch(&engine).await;
        let before = engine.ledger().inspection(id).unwrap();

        let err = engine
            .update_inspection(&qa(), id, complete_findings())
            .await
            .unwrap_err();
        assert!(matches!(err, AgriError::InvalidState(m) if m == "Cannot update completed inspection"));
        let err = engine
            .submit_result(&qa(), id, InspectionResult::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, AgriError::InvalidState(m) if m == "Inspection result already submitted"));
        assert_eq!(engine.ledger().inspection(id).unwrap(), before);
    }

    #[tokio::test]
    async fn passing_without_inspector_name_is_rejected() {
        let engine = engine().await;
        let batch = engine.create_batch(&exporter(), rice()).await.unwrap();
        engine.assign_qa(&admin(), batch.id, QA).await.unwrap();
        let inspection = engine.start_inspection(&qa(), batch.id).await.unwrap();
        let patch = InspectionPatch {
            inspector_name: None,
            ..complete_findings()
        };
        engine.update_inspection(&qa(), inspection.id, patch).await.unwrap();

        let err = engine
            .submit_result(&qa(), inspection.id, InspectionResult::Passed)
            .await
            .unwrap_err();
        assert!(matches!(err, AgriError::Validation(_)));
        assert!(engine.ledger().inspection(inspection.id).unwrap().result.is_none());
        assert_eq!(
            engine.ledger().batch(batch.id).unwrap().status,
            BatchStatus::UnderInspection
        );
    }

    #[tokio::test]
    async fn interrupted_submission_leaves_both_records_untouched() {
        let engine = engine().await;
        let (batch, id) = inspected_batch(&engine).await;
        engine.ledger().inject_fault(FaultPlan { after_writes: 1 });

        let err = engine
            .submit_result(&qa(), id, InspectionResult::Passed)
            .await
            .unwrap_err();
        assert!(matches!(err, AgriError::Internal(_)));
        assert!(engine.ledger().inspection(id).unwrap().result.is_none());
        assert_eq!(
            engine.ledger().batch(batch.id).unwrap().status,
            BatchStatus::UnderInspection
        );

        engine
            .submit_result(&qa(), id, InspectionResult::Passed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn other_agency_cannot_touch_inspection() {
        let engine = engine().await;
        let (_, id) = inspected_batch(&engine).await;
        let other = CallerIdentity::actor(Role::QaAgency, OTHER_QA);
        let err = engine
            .update_inspection(&other, id, complete_findings())
            .await
            .unwrap_err();
        assert!(matches!(err, AgriError::AccessDenied(_)));
        let err = engine
            .submit_result(&other, id, InspectionResult::Passed)
            .await
            .unwrap_err();
        assert!(matches!(err, AgriError::AccessDenied(_)));
    }

    // ── Queries ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn pending_queue_annotates_progress() {
        let engine = engine().await;
        let first = engine.create_batch(&exporter(), rice()).await.unwrap();
        let second = engine.create_batch(&exporter(), rice()).await.unwrap();
        engine.assign_qa(&admin(), first.id, QA).await.unwrap();
        engine.assign_qa(&admin(), second.id, QA).await.unwrap();
        engine.start_inspection(&qa(), second.id).await.unwrap();
        let (_, done) = passed_batch(&engine).await;

        let pending = engine.pending_inspections(&qa()).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].batch.id, first.id);
        assert_eq!(pending[0].inspection_status, InspectionProgress::NotStarted);
        assert_eq!(pending[1].batch.id, second.id);
        assert_eq!(pending[1].inspection_status, InspectionProgress::InProgress);
        assert!(pending.iter().all(|p| p.inspection_id != Some(done)));

        let other = CallerIdentity::actor(Role::QaAgency, OTHER_QA);
        assert!(engine.pending_inspections(&other).unwrap().is_empty());
    }

    #[tokio::test]
    async fn inspection_visibility() {
        let engine = engine().await;
        let (batch, id) = inspected_batch(&engine).await;
        assert!(engine.get_inspection(&qa(), id).is_ok());
        assert!(engine.get_inspection(&exporter(), id).is_ok());
        assert!(engine.get_inspection(&admin(), id).is_ok());
        let rival = CallerIdentity::actor(Role::Exporter, OTHER_EXPORTER);
        assert!(engine.get_inspection(&rival, id).is_err());

        assert_eq!(engine.inspection_for_batch(&exporter(), batch.id).unwrap().id, id);
        let fresh = engine.create_batch(&exporter(), rice()).await.unwrap();
        let err = engine.inspection_for_batch(&exporter(), fresh.id).unwrap_err();
        assert!(matches!(err, AgriError::NotFound(_)));
        assert!(engine.get_inspection(&admin(), InspectionId(99)).is_err());
    }
}
