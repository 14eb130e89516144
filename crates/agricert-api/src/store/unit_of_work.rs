//! # Unit of Work
//!
//! Stage writes, then commit them all or none.
//!
//! Each [`Write`] carries the guard it was decided under (expected batch
//! status, "no active credential for this inspection", "not revoked").
//! `commit()` locks the records the writes touch, re-checks every guard
//! against current state, runs the SQL transaction when a pool is
//! configured, and applies to memory last. A guard that fails aborts the
//! whole unit with nothing applied.
//!
//! Without a pool, check and apply happen under one table write lock.
//! With a pool, the SQL guards (conditional `UPDATE`s, unique indexes)
//! settle races between units that share no record lock.
//!
//! Dropping a unit without committing discards the staged writes.

use std::collections::BTreeSet;

use sqlx::PgConnection;

use agricert_core::{BatchId, CredentialKey, Timestamp};
use agricert_state::{
    ActorProfile, AttachmentRecord, BatchRecord, BatchStatus, CredentialRecord, InspectionRecord,
    VerificationLogEntry,
};
use agricert_vc::QrArtifact;

use super::locks::LockKey;
use super::{Ledger, StoreError, Tables};
use crate::db;

/// Abort the next commit after `after_writes` staged writes have been
/// executed, as if the process died mid-transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPlan {
    pub after_writes: usize,
}

#[derive(Debug, Clone)]
pub enum Write {
    InsertActor(ActorProfile),
    UpdateActor(ActorProfile),
    InsertBatch(BatchRecord),
    /// Replace the batch row if its stored status is still `expect`.
    UpdateBatch {
        record: BatchRecord,
        expect: BatchStatus,
    },
    InsertInspection(InspectionRecord),
    /// Replace the inspection row if no result has been stored.
    UpdateInspection(InspectionRecord),
    /// Insert if the inspection has no non-revoked credential.
    InsertCredential(CredentialRecord),
    /// Store revocation fields if the stored credential is not revoked.
    RevokeCredential(CredentialRecord),
    ReplaceQr {
        key: CredentialKey,
        qr: QrArtifact,
    },
    RecordVerification {
        key: CredentialKey,
        at: Timestamp,
    },
    InsertAttachment(AttachmentRecord),
    DeleteAttachments(BatchId),
    AppendVerification(VerificationLogEntry),
}

impl Write {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsertActor(_) => "insert_actor",
            Self::UpdateActor(_) => "update_actor",
            Self::InsertBatch(_) => "insert_batch",
            Self::UpdateBatch { .. } => "update_batch",
            Self::InsertInspection(_) => "insert_inspection",
            Self::UpdateInspection(_) => "update_inspection",
            Self::InsertCredential(_) => "insert_credential",
            Self::RevokeCredential(_) => "revoke_credential",
            Self::ReplaceQr { .. } => "replace_qr",
            Self::RecordVerification { .. } => "record_verification",
            Self::InsertAttachment(_) => "insert_attachment",
            Self::DeleteAttachments(_) => "delete_attachments",
            Self::AppendVerification(_) => "append_verification",
        }
    }

    /// Records whose state this write's guard or apply depends on.
    /// Counter increments and log appends take none.
    pub(crate) fn lock_keys(&self) -> Vec<LockKey> {
        match self {
            Self::InsertActor(a) | Self::UpdateActor(a) => vec![LockKey::Actor(a.id)],
            Self::InsertBatch(b) | Self::UpdateBatch { record: b, .. } => vec![LockKey::Batch(b.id)],
            Self::InsertInspection(i) => vec![LockKey::Batch(i.batch_id)],
            Self::UpdateInspection(i) => vec![LockKey::Inspection(i.id)],
            Self::InsertCredential(c) => vec![LockKey::Inspection(c.inspection_id)],
            Self::RevokeCredential(c) => vec![
                LockKey::Credential(c.key),
                LockKey::Inspection(c.inspection_id),
            ],
            Self::ReplaceQr { key, .. } => vec![LockKey::Credential(*key)],
            Self::InsertAttachment(a) => vec![LockKey::Batch(a.batch_id)],
            Self::DeleteAttachments(batch) => vec![LockKey::Batch(*batch)],
            Self::RecordVerification { .. } | Self::AppendVerification(_) => Vec::new(),
        }
    }

    /// Check this write's guard against the current tables.
    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        match self {
            Self::InsertActor(a) => {
                if tables.actors.contains_key(&a.id) {
                    return Err(StoreError::Duplicate(format!("actor {}", a.id)));
                }
            }
            Self::UpdateActor(a) => {
                if !tables.actors.contains_key(&a.id) {
                    return Err(StoreError::GuardFailed(format!("actor {} not found", a.id)));
                }
            }
            Self::InsertBatch(b) => {
                let taken = tables
                    .batches
                    .values()
                    .any(|x| x.id == b.id || x.batch_number == b.batch_number);
                if taken {
                    return Err(StoreError::Duplicate(format!(
                        "batch number {}",
                        b.batch_number.as_str()
                    )));
                }
            }
            Self::UpdateBatch { record, expect } => match tables.batches.get(&record.id) {
                Some(stored) if stored.status == *expect => {}
                Some(stored) => {
                    return Err(StoreError::GuardFailed(format!(
                        "batch {} is {} (expected {expect})",
                        record.id, stored.status
                    )))
                }
                None => {
                    return Err(StoreError::GuardFailed(format!(
                        "batch {} not found",
                        record.id
                    )))
                }
            },
            Self::InsertInspection(i) => {
                if tables.inspection_for_batch(i.batch_id).is_some() {
                    return Err(StoreError::Duplicate(format!(
                        "inspection for batch {}",
                        i.batch_id
                    )));
                }
            }
            Self::UpdateInspection(i) => match tables.inspections.get(&i.id) {
                Some(stored) if stored.result.is_none() => {}
                Some(_) => {
                    return Err(StoreError::GuardFailed(format!(
                        "inspection {} already has a result",
                        i.id
                    )))
                }
                None => {
                    return Err(StoreError::GuardFailed(format!(
                        "inspection {} not found",
                        i.id
                    )))
                }
            },
            Self::InsertCredential(c) => {
                if tables.active_credential_for_inspection(c.inspection_id).is_some() {
                    return Err(StoreError::Duplicate(format!(
                        "active credential for inspection {}",
                        c.inspection_id
                    )));
                }
            }
            Self::RevokeCredential(c) => credential_not_revoked(tables, c.key)?,
            Self::ReplaceQr { key, .. } | Self::RecordVerification { key, .. } => {
                if !tables.credentials.contains_key(key) {
                    return Err(StoreError::GuardFailed(format!("credential {key} not found")));
                }
            }
            Self::InsertAttachment(a) => {
                if !tables.batches.contains_key(&a.batch_id) {
                    return Err(StoreError::GuardFailed(format!(
                        "batch {} not found",
                        a.batch_id
                    )));
                }
            }
            Self::DeleteAttachments(_) | Self::AppendVerification(_) => {}
        }
        Ok(())
    }

    /// Run this write inside an open SQL transaction.
    async fn execute(&self, conn: &mut PgConnection) -> Result<(), StoreError> {
        let applied = match self {
            Self::InsertActor(a) => db::actors::insert(conn, a).await.map(|_| true)?,
            Self::UpdateActor(a) => db::actors::update(conn, a).await?,
            Self::InsertBatch(b) => db::batches::insert(conn, b).await.map(|_| true)?,
            Self::UpdateBatch { record, expect } => {
                db::batches::update(conn, record, *expect).await?
            }
            Self::InsertInspection(i) => db::inspections::insert(conn, i).await.map(|_| true)?,
            Self::UpdateInspection(i) => db::inspections::update_open(conn, i).await?,
            Self::InsertCredential(c) => db::credentials::insert(conn, c).await.map(|_| true)?,
            Self::RevokeCredential(c) => db::credentials::revoke(conn, c).await?,
            Self::ReplaceQr { key, qr } => db::credentials::replace_qr(conn, *key, qr).await?,
            Self::RecordVerification { key, at } => {
                db::credentials::record_verification(conn, *key, *at).await?
            }
            Self::InsertAttachment(a) => db::attachments::insert(conn, a).await.map(|_| true)?,
            Self::DeleteAttachments(batch) => {
                db::attachments::delete_for_batch(conn, *batch).await.map(|_| true)?
            }
            Self::AppendVerification(e) => {
                db::verification_logs::insert(conn, e).await.map(|_| true)?
            }
        };
        if applied {
            Ok(())
        } else {
            Err(StoreError::GuardFailed(format!(
                "{} matched no row in the database",
                self.kind()
            )))
        }
    }

    fn apply(self, tables: &mut Tables) {
        match self {
            Self::InsertActor(a) | Self::UpdateActor(a) => {
                tables.actors.insert(a.id, a);
            }
            Self::InsertBatch(b) | Self::UpdateBatch { record: b, .. } => {
                tables.batches.insert(b.id, b);
            }
            Self::InsertInspection(i) | Self::UpdateInspection(i) => {
                tables.inspections.insert(i.id, i);
            }
            Self::InsertCredential(c) => {
                tables.verification_log.track(c.credential_id.as_str());
                tables.credentials.insert(c.key, c);
            }
            Self::RevokeCredential(c) => {
                tables.credentials.insert(c.key, c);
            }
            Self::ReplaceQr { key, qr } => {
                if let Some(c) = tables.credentials.get_mut(&key) {
                    c.replace_qr(qr);
                }
            }
            Self::RecordVerification { key, at } => {
                if let Some(c) = tables.credentials.get_mut(&key) {
                    c.record_verification(at);
                }
            }
            Self::InsertAttachment(a) => {
                tables.attachments.insert(a.id, a);
            }
            Self::DeleteAttachments(batch) => {
                tables.attachments.retain(|_, a| a.batch_id != batch);
            }
            Self::AppendVerification(e) => tables.verification_log.append(e),
        }
    }
}

fn credential_not_revoked(tables: &Tables, key: CredentialKey) -> Result<(), StoreError> {
    match tables.credentials.get(&key) {
        Some(c) if !c.is_revoked => Ok(()),
        Some(_) => Err(StoreError::GuardFailed("Credential already revoked".to_string())),
        None => Err(StoreError::GuardFailed(format!("credential {key} not found"))),
    }
}

/// Staged writes against one [`Ledger`].
#[derive(Debug)]
pub struct UnitOfWork<'a> {
    ledger: &'a Ledger,
    writes: Vec<Write>,
}

impl<'a> UnitOfWork<'a> {
    pub(super) fn new(ledger: &'a Ledger) -> Self {
        Self {
            ledger,
            writes: Vec::new(),
        }
    }

    pub fn stage(&mut self, write: Write) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn rollback(self) {
        tracing::debug!(staged = self.writes.len(), "unit of work rolled back");
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        let UnitOfWork { ledger, writes } = self;
        if writes.is_empty() {
            return Ok(());
        }

        let keys: BTreeSet<LockKey> = writes.iter().flat_map(Write::lock_keys).collect();
        let _held = ledger.locks().acquire(keys).await;
        let count = writes.len();

        match ledger.pool() {
            None => {
                let mut tables = ledger.tables().write();
                for write in &writes {
                    write.check(&tables)?;
                }
                if let Some(f) = ledger.take_fault().filter(|f| f.after_writes < count) {
                    return Err(StoreError::FaultInjected(f.after_writes));
                }
                for write in writes {
                    write.apply(&mut tables);
                }
            }
            Some(pool) => {
                {
                    let tables = ledger.tables().read();
                    for write in &writes {
                        write.check(&tables)?;
                    }
                }
                let fault = ledger.take_fault().filter(|f| f.after_writes < count);

                let mut tx = pool.begin().await?;
                for (n, write) in writes.iter().enumerate() {
                    if fault.is_some_and(|f| f.after_writes == n) {
                        // Dropping `tx` rolls the transaction back.
                        return Err(StoreError::FaultInjected(n));
                    }
                    write.execute(&mut *tx).await?;
                }
                tx.commit().await?;

                let mut tables = ledger.tables().write();
                for write in writes {
                    write.apply(&mut tables);
                }
            }
        }
        tracing::debug!(writes = count, backend = ledger.backend(), "unit of work committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agricert_core::{ActorId, BatchNumber, InspectionId};
    use agricert_state::{InspectionResult, NewBatch};

    fn batch(ledger: &Ledger) -> BatchRecord {
        BatchRecord::create(
            ledger.next_batch_id(),
            BatchNumber::generate(),
            ActorId(1),
            NewBatch {
                product_type: Some("grain".into()),
                product_name: Some("Rice".into()),
                quantity: Some(10.0),
                unit: Some("kg".into()),
                origin_location: Some("Sindh".into()),
                destination_country: Some("DE".into()),
                ..Default::default()
            },
        )
        .unwrap()
    }

    async fn insert(ledger: &Ledger, b: &BatchRecord) {
        let mut uow = ledger.begin();
        uow.stage(Write::InsertBatch(b.clone()));
        uow.commit().await.unwrap();
    }

    // ── Guards ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn stale_status_guard_aborts_whole_unit() {
        let ledger = Ledger::in_memory();
        let b = batch(&ledger);
        insert(&ledger, &b).await;

        let mut assigned = b.clone();
        assigned.assign_qa(ActorId(2)).unwrap();
        let other = batch(&ledger);

        let mut uow = ledger.begin();
        uow.stage(Write::InsertBatch(other.clone()));
        uow.stage(Write::UpdateBatch {
            record: assigned,
            expect: BatchStatus::Certified,
        });
        let err = uow.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::GuardFailed(_)));

        assert_eq!(ledger.batch(b.id).unwrap().status, BatchStatus::Submitted);
        assert!(ledger.batch(other.id).is_none());
    }

    #[tokio::test]
    async fn duplicate_batch_number_rejected() {
        let ledger = Ledger::in_memory();
        let b = batch(&ledger);
        insert(&ledger, &b).await;

        let mut clash = batch(&ledger);
        clash.batch_number = b.batch_number.clone();
        let mut uow = ledger.begin();
        uow.stage(Write::InsertBatch(clash));
        assert!(matches!(uow.commit().await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn completed_inspection_cannot_be_rewritten() {
        let ledger = Ledger::in_memory();
        let mut b = batch(&ledger);
        b.assign_qa(ActorId(2)).unwrap();
        insert(&ledger, &b).await;

        let mut insp = InspectionRecord::start(ledger.next_inspection_id(), &b, ActorId(2), false).unwrap();
        let mut uow = ledger.begin();
        uow.stage(Write::InsertInspection(insp.clone()));
        uow.commit().await.unwrap();

        insp.submit(InspectionResult::Conditional).unwrap();
        let mut uow = ledger.begin();
        uow.stage(Write::UpdateInspection(insp.clone()));
        uow.commit().await.unwrap();

        let mut uow = ledger.begin();
        uow.stage(Write::UpdateInspection(insp));
        assert!(matches!(uow.commit().await, Err(StoreError::GuardFailed(_))));
    }

    #[tokio::test]
    async fn second_inspection_for_batch_rejected() {
        let ledger = Ledger::in_memory();
        let mut b = batch(&ledger);
        b.assign_qa(ActorId(2)).unwrap();
        insert(&ledger, &b).await;

        for expect_ok in [true, false] {
            let insp = InspectionRecord::start(ledger.next_inspection_id(), &b, ActorId(2), false).unwrap();
            let mut uow = ledger.begin();
            uow.stage(Write::InsertInspection(insp));
            assert_eq!(uow.commit().await.is_ok(), expect_ok);
        }
        assert_eq!(ledger.inspection_for_batch(b.id).unwrap().id, InspectionId(1));
    }

    // ── Record locks ─────────────────────────────────────────────────

    #[tokio::test]
    async fn commits_on_other_records_proceed_while_one_is_locked() {
        use std::time::Duration;
        use tokio::time::timeout;

        let ledger = Ledger::in_memory();
        let busy = batch(&ledger);
        insert(&ledger, &busy).await;
        let held = ledger
            .locks()
            .acquire([LockKey::Batch(busy.id)].into_iter().collect())
            .await;

        let other = batch(&ledger);
        let mut uow = ledger.begin();
        uow.stage(Write::InsertBatch(other.clone()));
        timeout(Duration::from_secs(1), uow.commit())
            .await
            .expect("unrelated batch commit waited")
            .unwrap();

        let entry = VerificationLogEntry {
            id: ledger.next_verification_id(),
            credential_id: "VC-unknown".into(),
            verifier: Default::default(),
            outcome: agricert_state::VerificationOutcome::Invalid,
            method: "api".into(),
            ip_address: None,
            user_agent: None,
            verified_at: Timestamp::now(),
        };
        let mut uow = ledger.begin();
        uow.stage(Write::AppendVerification(entry));
        timeout(Duration::from_secs(1), uow.commit())
            .await
            .expect("log append waited")
            .unwrap();

        let mut assigned = busy.clone();
        assigned.assign_qa(ActorId(2)).unwrap();
        let stage = |record: BatchRecord| {
            let mut uow = ledger.begin();
            uow.stage(Write::UpdateBatch {
                record,
                expect: BatchStatus::Submitted,
            });
            uow
        };
        let waiting = timeout(Duration::from_millis(50), stage(assigned.clone()).commit()).await;
        assert!(waiting.is_err(), "same-batch commit must wait for the lock");

        drop(held);
        stage(assigned).commit().await.unwrap();
        assert_eq!(ledger.batch(busy.id).unwrap().status, BatchStatus::UnderInspection);
        assert_eq!(ledger.locks().len(), 0);
    }

    // ── Faults / rollback ────────────────────────────────────────────

    #[tokio::test]
    async fn injected_fault_applies_nothing() {
        let ledger = Ledger::in_memory();
        let a = batch(&ledger);
        let b = batch(&ledger);
        ledger.inject_fault(FaultPlan { after_writes: 1 });

        let mut uow = ledger.begin();
        uow.stage(Write::InsertBatch(a.clone()));
        uow.stage(Write::InsertBatch(b.clone()));
        assert!(matches!(uow.commit().await, Err(StoreError::FaultInjected(1))));
        assert!(ledger.batch(a.id).is_none());
        assert!(ledger.batch(b.id).is_none());

        // One-shot: the next commit goes through.
        let mut uow = ledger.begin();
        uow.stage(Write::InsertBatch(a.clone()));
        uow.commit().await.unwrap();
        assert!(ledger.batch(a.id).is_some());
    }

    #[tokio::test]
    async fn dropped_unit_is_rollback() {
        let ledger = Ledger::in_memory();
        let a = batch(&ledger);
        {
            let mut uow = ledger.begin();
            uow.stage(Write::InsertBatch(a.clone()));
            assert_eq!(uow.len(), 1);
        }
        let mut uow = ledger.begin();
        uow.stage(Write::InsertBatch(a.clone()));
        uow.rollback();
        assert!(ledger.batch(a.id).is_none());
    }
}
