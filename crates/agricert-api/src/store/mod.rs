//! # Ledger
//!
//! The record store behind the lifecycle engine.
//!
//! ## Architecture
//!
//! In-memory tables (`parking_lot::RwLock`) are authoritative for reads.
//! Every write goes through a [`UnitOfWork`]: writes are staged, then
//! `commit()` re-checks each write's guard against the current tables and
//! applies all of them or none. A commit holds per-record locks for the
//! records it touches; commits on different records do not wait for each
//! other.
//!
//! When a Postgres pool is configured, `commit()` first runs the same
//! writes inside one SQL transaction (conditional `UPDATE`s plus the
//! unique indexes) and only updates memory once that transaction has
//! committed. Startup hydrates the tables from the database, except the
//! verification log, which stays in Postgres and is queried there.
//!
//! The table lock is never held across `.await`.

mod locks;
pub mod unit_of_work;
mod verification_log;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::{Mutex, RwLock};
use sqlx::PgPool;
use thiserror::Error;

use agricert_core::{
    ActorId, AgriError, AttachmentId, BatchId, CredentialKey, InspectionId, VerificationLogId,
};
use agricert_state::{
    ActorProfile, AttachmentRecord, BatchRecord, BatchStatus, CredentialRecord, InspectionRecord,
    VerificationLogEntry, VerificationStats,
};

pub use unit_of_work::{FaultPlan, UnitOfWork, Write};
pub use verification_log::DEFAULT_LOG_CAPACITY;

use locks::KeyedLocks;
use verification_log::VerificationLog;

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    /// A staged write's precondition no longer holds.
    #[error("write guard failed: {0}")]
    GuardFailed(String),

    /// A uniqueness rule rejected an insert.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A test fault aborted the commit.
    #[error("fault injected after {0} staged writes")]
    FaultInjected(usize),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return Self::Duplicate(db.message().to_string());
            }
        }
        Self::Backend(err.to_string())
    }
}

impl From<StoreError> for AgriError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::GuardFailed(msg) => AgriError::InvalidState(msg),
            StoreError::Duplicate(msg) => AgriError::Conflict(msg),
            StoreError::FaultInjected(_) | StoreError::Backend(_) => {
                AgriError::Internal(err.to_string())
            }
        }
    }
}

// ─── Tables ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) actors: BTreeMap<ActorId, ActorProfile>,
    pub(crate) batches: BTreeMap<BatchId, BatchRecord>,
    pub(crate) inspections: BTreeMap<InspectionId, InspectionRecord>,
    pub(crate) credentials: BTreeMap<CredentialKey, CredentialRecord>,
    pub(crate) attachments: BTreeMap<AttachmentId, AttachmentRecord>,
    pub(crate) verification_log: VerificationLog,
}

impl Tables {
    pub(crate) fn inspection_for_batch(&self, batch: BatchId) -> Option<&InspectionRecord> {
        self.inspections.values().find(|i| i.batch_id == batch)
    }

    pub(crate) fn active_credential_for_inspection(
        &self,
        inspection: InspectionId,
    ) -> Option<&CredentialRecord> {
        self.credentials
            .values()
            .find(|c| c.inspection_id == inspection && !c.is_revoked)
    }
}

#[derive(Debug)]
struct Sequences {
    actor: AtomicI64,
    batch: AtomicI64,
    inspection: AtomicI64,
    credential: AtomicI64,
    attachment: AtomicI64,
    verification: AtomicI64,
}

impl Sequences {
    fn starting_after(tables: &Tables, last_verification: i64) -> Self {
        fn next<K: Copy>(keys: impl Iterator<Item = K>, raw: impl Fn(K) -> i64) -> AtomicI64 {
            AtomicI64::new(keys.map(raw).max().unwrap_or(0) + 1)
        }
        Self {
            actor: next(tables.actors.keys().copied(), ActorId::get),
            batch: next(tables.batches.keys().copied(), BatchId::get),
            inspection: next(tables.inspections.keys().copied(), InspectionId::get),
            credential: next(tables.credentials.keys().copied(), CredentialKey::get),
            attachment: next(tables.attachments.keys().copied(), AttachmentId::get),
            verification: AtomicI64::new(last_verification + 1),
        }
    }
}

// ─── Ledger ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Ledger {
    tables: RwLock<Tables>,
    locks: KeyedLocks,
    sequences: Sequences,
    pool: Option<PgPool>,
    fault: Mutex<Option<FaultPlan>>,
}

impl Ledger {
    /// Memory-only ledger. State does not survive restarts.
    pub fn in_memory() -> Self {
        Self::from_tables(Tables::default(), 0, None)
    }

    /// Entries the memory-only log retains. Ignored with a database.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        if self.pool.is_none() {
            self.tables.get_mut().verification_log.set_capacity(capacity);
        }
        self
    }

    /// Postgres-backed ledger, hydrated from the database.
    pub async fn connect(pool: PgPool) -> Result<Self, StoreError> {
        let mut tables = Tables {
            verification_log: VerificationLog::with_capacity(0),
            ..Tables::default()
        };
        for a in crate::db::actors::load_all(&pool).await? {
            tables.actors.insert(a.id, a);
        }
        for b in crate::db::batches::load_all(&pool).await? {
            tables.batches.insert(b.id, b);
        }
        for i in crate::db::inspections::load_all(&pool).await? {
            tables.inspections.insert(i.id, i);
        }
        for c in crate::db::credentials::load_all(&pool).await? {
            tables.credentials.insert(c.key, c);
        }
        for a in crate::db::attachments::load_all(&pool).await? {
            tables.attachments.insert(a.id, a);
        }
        let last_verification = crate::db::verification_logs::max_id(&pool).await?;

        tracing::info!(
            batches = tables.batches.len(),
            inspections = tables.inspections.len(),
            credentials = tables.credentials.len(),
            "ledger hydrated from database"
        );
        Ok(Self::from_tables(tables, last_verification, Some(pool)))
    }

    fn from_tables(tables: Tables, last_verification: i64, pool: Option<PgPool>) -> Self {
        Self {
            sequences: Sequences::starting_after(&tables, last_verification),
            tables: RwLock::new(tables),
            locks: KeyedLocks::default(),
            pool,
            fault: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &'static str {
        if self.pool.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }

    /// Readiness check. The memory backend is always ready.
    pub async fn ping(&self) -> Result<(), StoreError> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }

    pub fn begin(&self) -> UnitOfWork<'_> {
        UnitOfWork::new(self)
    }

    /// Arm a fault for the next commit.
    pub fn inject_fault(&self, plan: FaultPlan) {
        *self.fault.lock() = Some(plan);
    }

    pub(crate) fn take_fault(&self) -> Option<FaultPlan> {
        self.fault.lock().take()
    }

    pub(crate) fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    pub(crate) fn tables(&self) -> &RwLock<Tables> {
        &self.tables
    }

    pub(crate) fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    // ── Id allocation ───────────────────────────────────────────────

    pub fn next_actor_id(&self) -> ActorId {
        ActorId(self.sequences.actor.fetch_add(1, Ordering::SeqCst))
    }

    pub fn next_batch_id(&self) -> BatchId {
        BatchId(self.sequences.batch.fetch_add(1, Ordering::SeqCst))
    }

    pub fn next_inspection_id(&self) -> InspectionId {
        InspectionId(self.sequences.inspection.fetch_add(1, Ordering::SeqCst))
    }

    pub fn next_credential_key(&self) -> CredentialKey {
        CredentialKey(self.sequences.credential.fetch_add(1, Ordering::SeqCst))
    }

    pub fn next_attachment_id(&self) -> AttachmentId {
        AttachmentId(self.sequences.attachment.fetch_add(1, Ordering::SeqCst))
    }

    pub fn next_verification_id(&self) -> VerificationLogId {
        VerificationLogId(self.sequences.verification.fetch_add(1, Ordering::SeqCst))
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn actor(&self, id: ActorId) -> Option<ActorProfile> {
        self.tables.read().actors.get(&id).cloned()
    }

    pub fn actors(&self) -> Vec<ActorProfile> {
        self.tables.read().actors.values().cloned().collect()
    }

    pub fn batch(&self, id: BatchId) -> Option<BatchRecord> {
        self.tables.read().batches.get(&id).cloned()
    }

    pub fn batch_by_number(&self, number: &str) -> Option<BatchRecord> {
        self.tables
            .read()
            .batches
            .values()
            .find(|b| b.batch_number.as_str() == number)
            .cloned()
    }

    pub fn batches_where(&self, filter: impl Fn(&BatchRecord) -> bool) -> Vec<BatchRecord> {
        self.tables
            .read()
            .batches
            .values()
            .filter(|b| filter(b))
            .cloned()
            .collect()
    }

    pub fn inspection(&self, id: InspectionId) -> Option<InspectionRecord> {
        self.tables.read().inspections.get(&id).cloned()
    }

    pub fn inspection_for_batch(&self, batch: BatchId) -> Option<InspectionRecord> {
        self.tables.read().inspection_for_batch(batch).cloned()
    }

    pub fn credential(&self, key: CredentialKey) -> Option<CredentialRecord> {
        self.tables.read().credentials.get(&key).cloned()
    }

    pub fn credential_by_id(&self, credential_id: &str) -> Option<CredentialRecord> {
        self.tables
            .read()
            .credentials
            .values()
            .find(|c| c.credential_id.as_str() == credential_id)
            .cloned()
    }

    pub fn credentials_where(
        &self,
        filter: impl Fn(&CredentialRecord) -> bool,
    ) -> Vec<CredentialRecord> {
        self.tables
            .read()
            .credentials
            .values()
            .filter(|c| filter(c))
            .cloned()
            .collect()
    }

    pub fn active_credential_for_inspection(
        &self,
        inspection: InspectionId,
    ) -> Option<CredentialRecord> {
        self.tables
            .read()
            .active_credential_for_inspection(inspection)
            .cloned()
    }

    pub fn attachments_for_batch(&self, batch: BatchId) -> Vec<AttachmentRecord> {
        self.tables
            .read()
            .attachments
            .values()
            .filter(|a| a.batch_id == batch)
            .cloned()
            .collect()
    }

    /// Statistics over every recorded attempt for `credential_id`, plus
    /// the `limit` most recent entries, newest first.
    pub async fn verification_history(
        &self,
        credential_id: &str,
        limit: usize,
    ) -> Result<(VerificationStats, Vec<VerificationLogEntry>), StoreError> {
        if let Some(pool) = &self.pool {
            let stats = crate::db::verification_logs::stats(pool, credential_id).await?;
            let recent = crate::db::verification_logs::recent(pool, credential_id, limit).await?;
            return Ok((stats, recent));
        }
        Ok(self.tables.read().verification_log.history(credential_id, limit))
    }

    // ── Repair ──────────────────────────────────────────────────────

    /// Flip to `revoked` every certified batch whose credentials are all
    /// revoked. This is the only half-applied revocation state a crash
    /// between the two writes can leave behind.
    pub async fn reconcile_revocations(&self) -> Result<usize, StoreError> {
        let stale: Vec<BatchRecord> = {
            let tables = self.tables.read();
            tables
                .batches
                .values()
                .filter(|b| b.status == BatchStatus::Certified)
                .filter(|b| {
                    let mut creds = tables.credentials.values().filter(|c| c.batch_id == b.id);
                    let mut any = false;
                    let all_revoked = creds.all(|c| {
                        any = true;
                        c.is_revoked
                    });
                    any && all_revoked
                })
                .cloned()
                .collect()
        };

        let mut repaired = 0;
        for mut batch in stale {
            if batch.revoke("reconciled: credential revoked").is_err() {
                continue;
            }
            let mut uow = self.begin();
            uow.stage(Write::UpdateBatch {
                record: batch.clone(),
                expect: BatchStatus::Certified,
            });
            match uow.commit().await {
                Ok(()) => {
                    tracing::warn!(batch_id = %batch.id, "repaired half-applied revocation");
                    repaired += 1;
                }
                Err(StoreError::GuardFailed(reason)) => {
                    tracing::debug!(batch_id = %batch.id, %reason, "batch changed during reconcile");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agricert_core::{BatchNumber, CredentialId, Timestamp};
    use agricert_state::{NewBatch, NewCredential};
    use agricert_vc::{QrArtifact, QrMode};
    use serde_json::json;

    fn batch(ledger: &Ledger, exporter: ActorId) -> BatchRecord {
        BatchRecord::create(
            ledger.next_batch_id(),
            BatchNumber::generate(),
            exporter,
            NewBatch {
                product_type: Some("grain".into()),
                product_name: Some("Rice".into()),
                quantity: Some(1000.0),
                unit: Some("kg".into()),
                origin_location: Some("Punjab".into()),
                destination_country: Some("NL".into()),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn credential(ledger: &Ledger, batch: BatchId, inspection: InspectionId) -> CredentialRecord {
        let now = Timestamp::now();
        CredentialRecord::issue(
            ledger.next_credential_key(),
            NewCredential {
                credential_id: CredentialId::generate(),
                batch_id: batch,
                inspection_id: inspection,
                credential_type: "AgriQualityCertificate".into(),
                document: json!({"proof": {"proofValue": "p"}}),
                signature: "p".into(),
                qr: QrArtifact {
                    image: String::new(),
                    media_type: "image/svg+xml".into(),
                    payload: String::new(),
                    encoded: String::new(),
                    checksum: String::new(),
                    url: String::new(),
                    mode: QrMode::Reference,
                    generated_at: now,
                },
                issued_by: ActorId(2),
                issued_at: now,
                expires_at: now.add_months(12).unwrap(),
            },
        )
    }

    // ── Sequences / reads ────────────────────────────────────────────

    #[test]
    fn ids_are_monotonic_per_table() {
        let ledger = Ledger::in_memory();
        assert_eq!(ledger.next_batch_id(), BatchId(1));
        assert_eq!(ledger.next_batch_id(), BatchId(2));
        assert_eq!(ledger.next_actor_id(), ActorId(1));
        assert_eq!(ledger.backend(), "memory");
    }

    #[tokio::test]
    async fn committed_batch_is_readable_by_number() {
        let ledger = Ledger::in_memory();
        let b = batch(&ledger, ActorId(1));
        let mut uow = ledger.begin();
        uow.stage(Write::InsertBatch(b.clone()));
        uow.commit().await.unwrap();

        assert_eq!(ledger.batch(b.id), Some(b.clone()));
        assert_eq!(ledger.batch_by_number(b.batch_number.as_str()).map(|x| x.id), Some(b.id));
    }

    // ── Reconciliation ───────────────────────────────────────────────

    #[tokio::test]
    async fn reconcile_flips_certified_batch_with_only_revoked_credentials() {
        let ledger = Ledger::in_memory();
        let mut b = batch(&ledger, ActorId(1));
        b.assign_qa(ActorId(2)).unwrap();
        b.record_result(agricert_state::InspectionResult::Passed).unwrap();
        let mut c = credential(&ledger, b.id, InspectionId(1));
        c.revoke(Some(ActorId(3)), "fraud").unwrap();

        // Credential revoked, batch left certified: the crash window.
        let mut uow = ledger.begin();
        uow.stage(Write::InsertBatch(b.clone()));
        uow.stage(Write::InsertCredential(c));
        uow.commit().await.unwrap();

        assert_eq!(ledger.reconcile_revocations().await.unwrap(), 1);
        assert_eq!(ledger.batch(b.id).unwrap().status, BatchStatus::Revoked);
        assert_eq!(ledger.reconcile_revocations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reconcile_leaves_reissued_batch_alone() {
        let ledger = Ledger::in_memory();
        let mut b = batch(&ledger, ActorId(1));
        b.assign_qa(ActorId(2)).unwrap();
        b.record_result(agricert_state::InspectionResult::Passed).unwrap();
        let mut old = credential(&ledger, b.id, InspectionId(1));
        old.revoke(None, "superseded").unwrap();
        let fresh = credential(&ledger, b.id, InspectionId(1));

        let mut uow = ledger.begin();
        uow.stage(Write::InsertBatch(b.clone()));
        uow.stage(Write::InsertCredential(old));
        uow.stage(Write::InsertCredential(fresh));
        uow.commit().await.unwrap();

        assert_eq!(ledger.reconcile_revocations().await.unwrap(), 0);
        assert_eq!(ledger.batch(b.id).unwrap().status, BatchStatus::Certified);
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert!(matches!(
            AgriError::from(StoreError::Duplicate("x".into())),
            AgriError::Conflict(_)
        ));
        assert!(matches!(
            AgriError::from(StoreError::GuardFailed("x".into())),
            AgriError::InvalidState(_)
        ));
        assert!(matches!(
            AgriError::from(StoreError::FaultInjected(1)),
            AgriError::Internal(_)
        ));
    }
}
