//! Batch operations: creation, listing, edits, QA assignment, soft
//! delete and attachments.

use std::cmp::Reverse;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use agricert_core::{ActorId, AgriError, BatchId, BatchNumber};
use agricert_state::{
    AttachmentRecord, BatchPatch, BatchRecord, BatchStatus, InspectionRecord, NewAttachment,
    NewBatch, Role,
};

use crate::attachments::DOWNLOAD_URL_TTL;
use crate::auth::{require_role, CallerIdentity};
use crate::middleware::metrics::BATCHES_CREATED;
use crate::store::{StoreError, Write};

use super::Lifecycle;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;
const NUMBER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BatchQuery {
    /// Filter by lifecycle status (e.g. `under_inspection`).
    pub status: Option<String>,
    pub product_type: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size, at most 100.
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPage {
    pub batches: Vec<BatchRecord>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    #[serde(flatten)]
    pub attachment: AttachmentRecord,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDetail {
    #[serde(flatten)]
    pub batch: BatchRecord,
    pub inspection: Option<InspectionRecord>,
    pub attachments: Vec<AttachmentView>,
}

impl Lifecycle {
    /// Create a batch in `submitted` for the calling exporter.
    pub async fn create_batch(
        &self,
        caller: &CallerIdentity,
        input: NewBatch,
    ) -> Result<BatchRecord, AgriError> {
        require_role(caller, &[Role::Exporter])?;
        let exporter = caller.actor_id()?;
        let mut batch =
            BatchRecord::create(self.ledger.next_batch_id(), BatchNumber::generate(), exporter, input)?;

        for attempt in 1..=NUMBER_ATTEMPTS {
            let mut uow = self.ledger.begin();
            uow.stage(Write::InsertBatch(batch.clone()));
            match uow.commit().await {
                Ok(()) => {
                    metrics::counter!(BATCHES_CREATED).increment(1);
                    tracing::info!(
                        batch_id = %batch.id,
                        batch_number = %batch.batch_number.as_str(),
                        actor_id = %exporter,
                        "batch created"
                    );
                    return Ok(batch);
                }
                Err(StoreError::Duplicate(reason)) if attempt < NUMBER_ATTEMPTS => {
                    tracing::debug!(%reason, attempt, "batch number collision, regenerating");
                    batch.batch_number = BatchNumber::generate();
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AgriError::Conflict("Could not allocate a unique batch number".into()))
    }

    /// Role-scoped, paginated batch listing, newest first.
    pub fn list_batches(
        &self,
        caller: &CallerIdentity,
        query: &BatchQuery,
    ) -> Result<BatchPage, AgriError> {
        let status = query
            .status
            .as_deref()
            .map(BatchStatus::from_str)
            .transpose()?;
        let scope: Option<(Role, ActorId)> = match caller.role {
            Role::Admin => None,
            role => Some((role, caller.actor_id()?)),
        };

        let mut batches = self.ledger.batches_where(|b| {
            let visible = match scope {
                None => true,
                Some((Role::Exporter, id)) => b.is_owned_by(id),
                Some((_, id)) => b.is_assigned_to(id),
            };
            let status_ok = match status {
                Some(s) => b.status == s,
                None => b.status != BatchStatus::Deleted,
            };
            let product_ok = query
                .product_type
                .as_deref()
                .map_or(true, |p| b.product_type == p);
            visible && status_ok && product_ok
        });
        batches.sort_by_key(|b| Reverse((b.created_at, b.id)));

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        let total = batches.len();
        let total_pages = total.div_ceil(limit as usize) as u32;
        let offset = (page as usize - 1).saturating_mul(limit as usize);
        let batches = batches.into_iter().skip(offset).take(limit as usize).collect();

        Ok(BatchPage {
            batches,
            total,
            page,
            limit,
            total_pages,
        })
    }

    /// One batch with its inspection and attachment download links.
    pub async fn get_batch(
        &self,
        caller: &CallerIdentity,
        id: BatchId,
    ) -> Result<BatchDetail, AgriError> {
        let batch = self.load_batch(id)?;
        self.ensure_can_view(caller, &batch)?;

        let mut attachments = Vec::new();
        for attachment in self.ledger.attachments_for_batch(id) {
            let download_url = self
                .attachments
                .download_url(&attachment.storage_key, DOWNLOAD_URL_TTL)
                .await?;
            attachments.push(AttachmentView {
                attachment,
                download_url,
            });
        }
        Ok(BatchDetail {
            inspection: self.ledger.inspection_for_batch(id),
            batch,
            attachments,
        })
    }

    pub async fn update_batch(
        &self,
        caller: &CallerIdentity,
        id: BatchId,
        patch: BatchPatch,
    ) -> Result<BatchRecord, AgriError> {
        let mut batch = self.load_batch(id)?;
        self.ensure_owner_or_admin(caller, &batch)?;
        if patch.is_empty() {
            return Err(AgriError::invalid("No valid fields to update"));
        }
        let expect = batch.status;
        batch.apply_patch(patch)?;

        let mut uow = self.ledger.begin();
        uow.stage(Write::UpdateBatch {
            record: batch.clone(),
            expect,
        });
        uow.commit().await?;
        tracing::info!(batch_id = %id, "batch updated");
        Ok(batch)
    }

    /// Soft delete. Attachment rows go in the same commit; stored objects
    /// are removed once it lands.
    pub async fn delete_batch(&self, caller: &CallerIdentity, id: BatchId) -> Result<(), AgriError> {
        let mut batch = self.load_batch(id)?;
        self.ensure_owner_or_admin(caller, &batch)?;
        let expect = batch.status;
        batch.soft_delete()?;
        let attachments = self.ledger.attachments_for_batch(id);

        let mut uow = self.ledger.begin();
        uow.stage(Write::UpdateBatch {
            record: batch,
            expect,
        });
        uow.stage(Write::DeleteAttachments(id));
        uow.commit().await?;

        for attachment in &attachments {
            if let Err(e) = self.attachments.delete(&attachment.storage_key).await {
                tracing::warn!(
                    batch_id = %id,
                    storage_key = %attachment.storage_key,
                    error = %e,
                    "failed to remove attachment object"
                );
            }
        }
        tracing::info!(batch_id = %id, attachments = attachments.len(), "batch deleted");
        Ok(())
    }

    /// Assign a QA agency (admin). `submitted → under_inspection`.
    pub async fn assign_qa(
        &self,
        caller: &CallerIdentity,
        id: BatchId,
        qa_agency: ActorId,
    ) -> Result<BatchRecord, AgriError> {
        require_role(caller, &[Role::Admin])?;
        let agency = self.load_actor(qa_agency, "QA agency")?;
        if agency.role != Role::QaAgency {
            return Err(AgriError::invalid("Assigned actor is not a QA agency"));
        }
        let mut batch = self.load_batch(id)?;
        let expect = batch.status;
        batch.assign_qa(qa_agency)?;

        let mut uow = self.ledger.begin();
        uow.stage(Write::UpdateBatch {
            record: batch.clone(),
            expect,
        });
        uow.commit().await?;
        tracing::info!(batch_id = %id, actor_id = %qa_agency, "QA agency assigned");
        Ok(batch)
    }

    /// Record attachment metadata (owner exporter).
    pub async fn add_attachment(
        &self,
        caller: &CallerIdentity,
        id: BatchId,
        input: NewAttachment,
    ) -> Result<AttachmentRecord, AgriError> {
        require_role(caller, &[Role::Exporter])?;
        let uploader = caller.actor_id()?;
        let batch = self.load_batch(id)?;
        if !batch.is_owned_by(uploader) {
            return Err(AgriError::AccessDenied("Access denied".into()));
        }
        batch.ensure_accepts_attachments()?;
        let attachment =
            AttachmentRecord::create(self.ledger.next_attachment_id(), id, uploader, input)?;

        let mut uow = self.ledger.begin();
        uow.stage(Write::InsertAttachment(attachment.clone()));
        uow.commit().await?;
        tracing::info!(batch_id = %id, attachment_id = %attachment.id, "attachment recorded");
        Ok(attachment)
    }
}
