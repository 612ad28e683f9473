use anyhow::Result;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, ffi, params};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};
use tracing::debug;

use super::open_database;
use crate::model::record::{
    CategoryId, DedupKey, GroupId, JournalEntry, NewJournalEntry, NewRecord, Principal,
    PriorityId, ProjectId, RecordId, Status, TrackerId, TrackingRecord, UserId,
};
use crate::store::{StoreError, TrackingStore, now_us};

const RECORD_COLUMNS: &str = "record_id, project_id, tracker_id, subject, author_id, \
     status_name, status_is_closed, assignee_kind, assignee_id, category_id, priority_id, \
     description, lock_version, created_at_us, updated_at_us";

/// Pending outbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: i64,
    pub record_id: RecordId,
    pub event: String,
    pub created_at_us: i64,
}

/// Pause between attempts to take the connection from another thread.
const CONN_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// [`TrackingStore`] on a single SQLite connection.
///
/// Writes run in `IMMEDIATE` transactions so the write lock is taken up
/// front. One timeout budget covers both waits: for the connection inside
/// this process, then for SQLite's own lock. Exhausting it yields
/// [`StoreError::Timeout`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    timeout: Duration,
}

impl SqliteStore {
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, timeout: Duration) -> Result<Self> {
        let conn = open_database(path, timeout)?;
        Ok(Self {
            conn: Mutex::new(conn),
            timeout,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.conn.try_lock() {
                Ok(conn) => {
                    // SQLite gets whatever is left of the budget.
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    conn.busy_timeout(remaining).map_err(|e| self.map_err(e))?;
                    return Ok(conn);
                }
                Err(TryLockError::Poisoned(_)) => {
                    return Err(StoreError::Backend("sqlite connection lock poisoned".into()));
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        debug!(timeout = ?self.timeout, "sqlite connection busy");
                        return Err(StoreError::Timeout(self.timeout));
                    }
                    std::thread::sleep(CONN_POLL_INTERVAL);
                }
            }
        }
    }

    fn map_err(&self, err: rusqlite::Error) -> StoreError {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                StoreError::Timeout(self.timeout)
            }
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                StoreError::Duplicate
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }

    /// Most recently updated records first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn list_records(&self, limit: usize) -> Result<Vec<TrackingRecord>, StoreError> {
        let conn = self.conn()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let ids = recent_record_ids(&conn, limit).map_err(|e| self.map_err(e))?;

        ids.into_iter()
            .filter_map(|id| load_record(&conn, id).transpose())
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| self.map_err(e))
    }

    /// Move a record to `status` outside the reconcile protocol. Bumps
    /// `lock_version` like any other status write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Missing`] for an unknown record.
    pub fn set_status(&self, id: RecordId, status: &Status) -> Result<TrackingRecord, StoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE records
                 SET status_name = ?1, status_is_closed = ?2,
                     lock_version = lock_version + 1, updated_at_us = ?3
                 WHERE record_id = ?4",
                params![status.name, status.is_closed, now_us(), id.0],
            )
            .map_err(|e| self.map_err(e))?;
        if changed == 0 {
            return Err(StoreError::Missing(id));
        }
        self.load(&conn, id)
    }

    /// Notifications not yet delivered, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn pending_notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let conn = self.conn()?;
        pending_notifications(&conn).map_err(|e| self.map_err(e))
    }

    fn load(&self, conn: &Connection, id: RecordId) -> Result<TrackingRecord, StoreError> {
        load_record(conn, id)
            .map_err(|e| self.map_err(e))?
            .ok_or(StoreError::Missing(id))
    }
}

impl TrackingStore for SqliteStore {
    fn find_record(&self, key: &DedupKey) -> Result<Option<TrackingRecord>, StoreError> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT record_id FROM records
                 WHERE project_id = ?1 AND tracker_id = ?2 AND subject = ?3 AND author_id = ?4",
                params![key.project.0, key.tracker.0, key.subject, key.author.0],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| self.map_err(e))?;

        match id {
            Some(id) => load_record(&conn, RecordId(id)).map_err(|e| self.map_err(e)),
            None => Ok(None),
        }
    }

    fn create_record(&self, new: NewRecord) -> Result<TrackingRecord, StoreError> {
        let mut conn = self.conn()?;
        let id = insert_record(&mut conn, &new).map_err(|e| self.map_err(e))?;
        debug!(record_id = %id, subject = %new.key.subject, "created record");
        self.load(&conn, id)
    }

    fn increment_counter(&self, id: RecordId, field: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        upsert_counter(&mut conn, id, field)
            .map_err(|e| self.map_err(e))?
            .ok_or(StoreError::Missing(id))
    }

    fn reload(&self, id: RecordId) -> Result<TrackingRecord, StoreError> {
        let conn = self.conn()?;
        self.load(&conn, id)
    }

    fn commit_journal_update(
        &self,
        record: &TrackingRecord,
        new_status: Option<&Status>,
        entry: NewJournalEntry,
    ) -> Result<TrackingRecord, StoreError> {
        let mut conn = self.conn()?;
        let applied = apply_journal_update(&mut conn, record, new_status, &entry)
            .map_err(|e| self.map_err(e))?;
        if !applied {
            let exists = record_exists(&conn, record.id).map_err(|e| self.map_err(e))?;
            return Err(if exists {
                StoreError::Conflict(record.id)
            } else {
                StoreError::Missing(record.id)
            });
        }
        self.load(&conn, record.id)
    }
}

fn insert_record(conn: &mut Connection, new: &NewRecord) -> rusqlite::Result<RecordId> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = now_us();
    tx.execute(
        "INSERT INTO records (project_id, tracker_id, subject, author_id,
                              status_name, status_is_closed, assignee_kind, assignee_id,
                              category_id, priority_id, description, lock_version,
                              created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?12)",
        params![
            new.key.project.0,
            new.key.tracker.0,
            new.key.subject,
            new.key.author.0,
            new.status.name,
            new.status.is_closed,
            new.assignee.map(Principal::kind),
            new.assignee.map(Principal::raw_id),
            new.category.map(|c| c.0),
            new.priority.0,
            new.description,
            now,
        ],
    )?;
    let id = tx.last_insert_rowid();

    for (name, value) in &new.attributes {
        tx.execute(
            "INSERT INTO record_attributes (record_id, name, value) VALUES (?1, ?2, ?3)",
            params![id, name, value],
        )?;
    }
    if !new.suppress_notifications {
        tx.execute(
            "INSERT INTO notifications (record_id, event, created_at_us) VALUES (?1, 'created', ?2)",
            params![id, now],
        )?;
    }
    tx.commit()?;
    Ok(RecordId(id))
}

/// `None` when the record does not exist.
fn upsert_counter(conn: &mut Connection, id: RecordId, field: &str) -> rusqlite::Result<Option<i64>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !record_exists(&tx, id)? {
        return Ok(None);
    }
    let value: i64 = tx.query_row(
        "INSERT INTO record_attributes (record_id, name, value) VALUES (?1, ?2, '1')
         ON CONFLICT(record_id, name)
         DO UPDATE SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)
         RETURNING CAST(value AS INTEGER)",
        params![id.0, field],
        |row| row.get(0),
    )?;
    tx.commit()?;
    Ok(Some(value))
}

/// `false` when no row carried `record.lock_version`; nothing is written
/// in that case.
fn apply_journal_update(
    conn: &mut Connection,
    record: &TrackingRecord,
    new_status: Option<&Status>,
    entry: &NewJournalEntry,
) -> rusqlite::Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = now_us();
    let changed = match new_status {
        Some(status) => tx.execute(
            "UPDATE records
             SET status_name = ?1, status_is_closed = ?2,
                 lock_version = lock_version + 1, updated_at_us = ?3
             WHERE record_id = ?4 AND lock_version = ?5",
            params![status.name, status.is_closed, now, record.id.0, record.lock_version],
        )?,
        None => tx.execute(
            "UPDATE records
             SET lock_version = lock_version + 1, updated_at_us = ?1
             WHERE record_id = ?2 AND lock_version = ?3",
            params![now, record.id.0, record.lock_version],
        )?,
    };
    if changed == 0 {
        return Ok(false);
    }

    tx.execute(
        "INSERT INTO journals (record_id, author_id, notes, status_change, created_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.id.0,
            entry.author.0,
            entry.notes,
            new_status.map(|s| s.name.as_str()),
            now
        ],
    )?;
    tx.commit()?;
    Ok(true)
}

fn record_exists(conn: &Connection, id: RecordId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM records WHERE record_id = ?1)",
        [id.0],
        |row| row.get(0),
    )
}

fn recent_record_ids(conn: &Connection, limit: i64) -> rusqlite::Result<Vec<RecordId>> {
    let mut stmt = conn.prepare(
        "SELECT record_id FROM records ORDER BY updated_at_us DESC, record_id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], |row| row.get::<_, i64>(0).map(RecordId))?;
    rows.collect()
}

fn pending_notifications(conn: &Connection) -> rusqlite::Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT notification_id, record_id, event, created_at_us
         FROM notifications
         WHERE delivered_at_us IS NULL
         ORDER BY notification_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Notification {
            id: row.get(0)?,
            record_id: RecordId(row.get(1)?),
            event: row.get(2)?,
            created_at_us: row.get(3)?,
        })
    })?;
    rows.collect()
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackingRecord> {
    let status_name: Option<String> = row.get(5)?;
    let status_is_closed: bool = row.get(6)?;
    let assignee_kind: Option<String> = row.get(7)?;
    let assignee_id: Option<i64> = row.get(8)?;
    let assignee = match (assignee_kind.as_deref(), assignee_id) {
        (Some("user"), Some(id)) => Some(Principal::User(UserId(id))),
        (Some("group"), Some(id)) => Some(Principal::Group(GroupId(id))),
        _ => None,
    };

    Ok(TrackingRecord {
        id: RecordId(row.get(0)?),
        key: DedupKey {
            project: ProjectId(row.get(1)?),
            tracker: TrackerId(row.get(2)?),
            subject: row.get(3)?,
            author: UserId(row.get(4)?),
        },
        status: status_name.map(|name| Status {
            name,
            is_closed: status_is_closed,
        }),
        assignee,
        category: row.get::<_, Option<i64>>(9)?.map(CategoryId),
        priority: PriorityId(row.get(10)?),
        description: row.get(11)?,
        attributes: BTreeMap::new(),
        journal: Vec::new(),
        lock_version: row.get(12)?,
        created_at_us: row.get(13)?,
        updated_at_us: row.get(14)?,
    })
}

fn load_record(conn: &Connection, id: RecordId) -> rusqlite::Result<Option<TrackingRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE record_id = ?1");
    let Some(mut record) = conn.query_row(&sql, [id.0], row_to_record).optional()? else {
        return Ok(None);
    };

    let mut stmt =
        conn.prepare("SELECT name, value FROM record_attributes WHERE record_id = ?1")?;
    record.attributes = stmt
        .query_map([id.0], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

    let mut stmt = conn.prepare(
        "SELECT journal_id, author_id, notes, status_change, created_at_us
         FROM journals WHERE record_id = ?1 ORDER BY journal_id",
    )?;
    record.journal = stmt
        .query_map([id.0], |row| {
            Ok(JournalEntry {
                id: row.get(0)?,
                author: UserId(row.get(1)?),
                notes: row.get(2)?,
                status_change: row.get(3)?,
                created_at_us: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(record))
}
