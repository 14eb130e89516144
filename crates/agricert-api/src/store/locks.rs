//! # Per-record commit locks
//!
//! A commit locks only the records its writes touch, so units of work on
//! unrelated batches and credentials run their SQL transactions in
//! parallel. Keys are taken in sorted order, which rules out lock-order
//! deadlocks between multi-record units. Idle entries are pruned when the
//! last holder lets go.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use agricert_core::{ActorId, BatchId, CredentialKey, InspectionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum LockKey {
    Actor(ActorId),
    Batch(BatchId),
    Inspection(InspectionId),
    Credential(CredentialKey),
}

#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    slots: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held record locks. Releases and prunes on drop, including when the
/// acquiring future is cancelled halfway.
#[derive(Debug)]
pub(crate) struct HeldLocks<'a> {
    registry: &'a KeyedLocks,
    keys: Vec<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub(crate) async fn acquire(&self, keys: BTreeSet<LockKey>) -> HeldLocks<'_> {
        let mut held = HeldLocks {
            registry: self,
            keys: Vec::with_capacity(keys.len()),
            guards: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            let slot = self.slots.lock().entry(key).or_default().clone();
            held.keys.push(key);
            held.guards.push(slot.lock_owned().await);
        }
        held
    }

    /// Keys with a holder or a waiter.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Drop for HeldLocks<'_> {
    fn drop(&mut self) {
        self.guards.clear();
        let mut slots = self.registry.slots.lock();
        for key in &self.keys {
            if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn keys(list: &[LockKey]) -> BTreeSet<LockKey> {
        list.iter().copied().collect()
    }

    #[tokio::test]
    async fn disjoint_keys_do_not_wait() {
        let locks = KeyedLocks::default();
        let _a = locks.acquire(keys(&[LockKey::Batch(BatchId(1))])).await;
        let b = timeout(
            Duration::from_secs(1),
            locks.acquire(keys(&[LockKey::Batch(BatchId(2))])),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn shared_key_waits_for_release() {
        let locks = KeyedLocks::default();
        let first = locks
            .acquire(keys(&[LockKey::Credential(CredentialKey(1)), LockKey::Batch(BatchId(1))]))
            .await;
        let blocked = timeout(
            Duration::from_millis(50),
            locks.acquire(keys(&[LockKey::Batch(BatchId(1))])),
        )
        .await;
        assert!(blocked.is_err());

        drop(first);
        let second = timeout(
            Duration::from_secs(1),
            locks.acquire(keys(&[LockKey::Batch(BatchId(1))])),
        )
        .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let locks = KeyedLocks::default();
        {
            let _held = locks
                .acquire(keys(&[LockKey::Actor(ActorId(1)), LockKey::Inspection(InspectionId(4))]))
                .await;
            assert_eq!(locks.len(), 2);
        }
        assert_eq!(locks.len(), 0);

        // A cancelled acquire leaves nothing behind either.
        let held = locks.acquire(keys(&[LockKey::Batch(BatchId(9))])).await;
        let _ = timeout(
            Duration::from_millis(20),
            locks.acquire(keys(&[LockKey::Actor(ActorId(1)), LockKey::Batch(BatchId(9))])),
        )
        .await;
        drop(held);
        assert_eq!(locks.len(), 0);
    }
}
