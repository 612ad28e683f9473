//! Tracking store collaborator.
//!
//! The reconciler talks to persistence only through [`TrackingStore`]. Two
//! implementations ship with the crate: [`memory::MemoryStore`] for tests and
//! embedding, and [`crate::db::SqliteStore`] for the CLI.
//!
//! Stores must provide per-record optimistic concurrency: every status and
//! journal commit bumps `lock_version`, and a commit carrying a stale
//! `lock_version` fails with [`StoreError::Conflict`]. Counter increments are
//! atomic on their own and do not touch `lock_version`.

pub mod memory;

use std::time::Duration;

use crate::error::ErrorCode;
use crate::model::record::{
    DedupKey, NewJournalEntry, NewRecord, RecordId, Status, TrackingRecord,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The record changed since it was read.
    #[error("record {0} was modified concurrently")]
    Conflict(RecordId),

    /// Another writer already created a record with the same dedup key.
    #[error("a record with the same dedup key already exists")]
    Duplicate,

    #[error("store did not respond within {0:?}")]
    Timeout(Duration),

    #[error("record {0} not found")]
    Missing(RecordId),

    #[error("store failure: {0}")]
    Backend(String),
}

impl StoreError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Conflict(_) => ErrorCode::WriteConflict,
            Self::Timeout(_) => ErrorCode::StoreTimeout,
            Self::Missing(_) => ErrorCode::RecordNotFound,
            Self::Duplicate | Self::Backend(_) => ErrorCode::StoreFailure,
        }
    }
}

pub trait TrackingStore: Send + Sync {
    /// Record matching the full dedup key, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be queried.
    fn find_record(&self, key: &DedupKey) -> Result<Option<TrackingRecord>, StoreError>;

    /// Atomically create a record with its initial attributes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when the key is taken, or another
    /// [`StoreError`] when nothing was written.
    fn create_record(&self, record: NewRecord) -> Result<TrackingRecord, StoreError>;

    /// Add one to an integer custom attribute, creating it at `1`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Missing`] for an unknown record.
    fn increment_counter(&self, id: RecordId, field: &str) -> Result<i64, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::Missing`] for an unknown record.
    fn reload(&self, id: RecordId) -> Result<TrackingRecord, StoreError>;

    /// Append `entry` and optionally move to `new_status` in one write,
    /// provided `record.lock_version` is still current.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the stored `lock_version`
    /// differs from the one on `record`.
    fn commit_journal_update(
        &self,
        record: &TrackingRecord,
        new_status: Option<&Status>,
        entry: NewJournalEntry,
    ) -> Result<TrackingRecord, StoreError>;
}

pub(crate) fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
