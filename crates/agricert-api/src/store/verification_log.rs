//! # Memory-only verification log
//!
//! A ring of the most recent entries plus running statistics per stored
//! credential. Statistics stay exact after old entries fall out of the
//! ring. Ids that never named a stored credential get no statistics, so
//! the map is bounded by the credential table.
//!
//! With a database configured the ledger keeps capacity 0 here and reads
//! history from `verification_logs` instead.

use std::collections::{HashMap, VecDeque};

use agricert_state::{VerificationLogEntry, VerificationStats};

/// Entries the memory-only ledger keeps unless configured otherwise.
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub(crate) struct VerificationLog {
    recent: VecDeque<VerificationLogEntry>,
    capacity: usize,
    stats: HashMap<String, VerificationStats>,
}

impl Default for VerificationLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl VerificationLog {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            recent: VecDeque::new(),
            capacity,
            stats: HashMap::new(),
        }
    }

    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        if capacity == 0 {
            self.stats.clear();
        }
        self.trim();
    }

    /// Start statistics for a newly stored credential.
    pub(crate) fn track(&mut self, credential_id: &str) {
        if self.capacity > 0 {
            self.stats.entry(credential_id.to_string()).or_default();
        }
    }

    pub(crate) fn append(&mut self, entry: VerificationLogEntry) {
        if self.capacity == 0 {
            return;
        }
        if let Some(stats) = self.stats.get_mut(&entry.credential_id) {
            stats.record(&entry);
        }
        self.recent.push_back(entry);
        self.trim();
    }

    /// Statistics and up to `limit` retained entries, newest first.
    pub(crate) fn history(
        &self,
        credential_id: &str,
        limit: usize,
    ) -> (VerificationStats, Vec<VerificationLogEntry>) {
        let stats = self.stats.get(credential_id).cloned().unwrap_or_default();
        let mut entries: Vec<_> = self
            .recent
            .iter()
            .filter(|e| e.credential_id == credential_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.verified_at.cmp(&a.verified_at).then(b.id.cmp(&a.id)));
        entries.truncate(limit);
        (stats, entries)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.recent.len()
    }

    fn trim(&mut self) {
        while self.recent.len() > self.capacity {
            self.recent.pop_front();
        }
    }
}
