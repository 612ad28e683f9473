use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{StoreError, TrackingStore, now_us};
use crate::model::record::{
    DedupKey, JournalEntry, NewJournalEntry, NewRecord, RecordId, Status, TrackingRecord,
};

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<RecordId, TrackingRecord>,
    next_record: i64,
    next_journal: i64,
    operations: u64,
    notifications: Vec<RecordId>,
}

/// In-process store. Enforces dedup-key uniqueness and `lock_version`
/// checks like the SQLite store, and counts every call so tests can assert
/// the store was never touched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))?;
        state.operations += 1;
        Ok(state)
    }

    /// Number of trait calls served so far.
    #[must_use]
    pub fn operations(&self) -> u64 {
        self.state.lock().map_or(0, |s| s.operations)
    }

    /// Records whose create fired outbound notifications.
    #[must_use]
    pub fn notifications(&self) -> Vec<RecordId> {
        self.state
            .lock()
            .map(|s| s.notifications.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<TrackingRecord> {
        self.state
            .lock()
            .map(|s| s.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Move a record to `status` outside the reconcile protocol, as an
    /// operator closing an issue would. Bumps `lock_version`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Missing`] for an unknown record.
    pub fn set_status(&self, id: RecordId, status: Status) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let record = state.records.get_mut(&id).ok_or(StoreError::Missing(id))?;
        record.status = Some(status);
        record.lock_version += 1;
        record.updated_at_us = now_us();
        Ok(())
    }
}

impl TrackingStore for MemoryStore {
    fn find_record(&self, key: &DedupKey) -> Result<Option<TrackingRecord>, StoreError> {
        let state = self.state()?;
        Ok(state.records.values().find(|r| &r.key == key).cloned())
    }

    fn create_record(&self, new: NewRecord) -> Result<TrackingRecord, StoreError> {
        let mut state = self.state()?;
        if state.records.values().any(|r| r.key == new.key) {
            return Err(StoreError::Duplicate);
        }

        state.next_record += 1;
        let id = RecordId(state.next_record);
        let now = now_us();
        let record = TrackingRecord {
            id,
            key: new.key,
            status: Some(new.status),
            assignee: new.assignee,
            category: new.category,
            priority: new.priority,
            description: new.description,
            attributes: new.attributes,
            journal: Vec::new(),
            lock_version: 0,
            created_at_us: now,
            updated_at_us: now,
        };
        state.records.insert(id, record.clone());
        if !new.suppress_notifications {
            state.notifications.push(id);
        }
        Ok(record)
    }

    fn increment_counter(&self, id: RecordId, field: &str) -> Result<i64, StoreError> {
        let mut state = self.state()?;
        let record = state.records.get_mut(&id).ok_or(StoreError::Missing(id))?;
        let current = record
            .attributes
            .get(field)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        record.attributes.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    fn reload(&self, id: RecordId) -> Result<TrackingRecord, StoreError> {
        let state = self.state()?;
        state.records.get(&id).cloned().ok_or(StoreError::Missing(id))
    }

    fn commit_journal_update(
        &self,
        record: &TrackingRecord,
        new_status: Option<&Status>,
        entry: NewJournalEntry,
    ) -> Result<TrackingRecord, StoreError> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let stored = state
            .records
            .get_mut(&record.id)
            .ok_or(StoreError::Missing(record.id))?;
        if stored.lock_version != record.lock_version {
            return Err(StoreError::Conflict(record.id));
        }

        state.next_journal += 1;
        let now = now_us();
        stored.journal.push(JournalEntry {
            id: state.next_journal,
            author: entry.author,
            notes: entry.notes,
            status_change: new_status.map(|s| s.name.clone()),
            created_at_us: now,
        });
        if let Some(status) = new_status {
            stored.status = Some(status.clone());
        }
        stored.lock_version += 1;
        stored.updated_at_us = now;
        Ok(stored.clone())
    }
}
