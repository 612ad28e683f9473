//! SQLite schema for the tracking store.
//!
//! - `records` holds one row per dedup key; the unique index on
//!   `(project_id, tracker_id, subject, author_id)` makes a racing second
//!   create fail instead of duplicating the record
//! - `record_attributes` carries named custom attributes (error class,
//!   occurrences, environment)
//! - `journals` is the append-only change log
//! - `notifications` is the outbound notification outbox
//! - `store_meta` tracks the applied schema version

/// Migration v1: tables plus the dedup uniqueness constraint.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS records (
    record_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    tracker_id INTEGER NOT NULL,
    subject TEXT NOT NULL CHECK (length(subject) BETWEEN 1 AND 255),
    author_id INTEGER NOT NULL,
    status_name TEXT,
    status_is_closed INTEGER NOT NULL DEFAULT 0 CHECK (status_is_closed IN (0, 1)),
    assignee_kind TEXT CHECK (assignee_kind IS NULL OR assignee_kind IN ('user', 'group')),
    assignee_id INTEGER,
    category_id INTEGER,
    priority_id INTEGER NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    lock_version INTEGER NOT NULL DEFAULT 0,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    CHECK ((assignee_kind IS NULL) = (assignee_id IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_records_dedup
    ON records(project_id, tracker_id, subject, author_id);

CREATE TABLE IF NOT EXISTS record_attributes (
    record_id INTEGER NOT NULL REFERENCES records(record_id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    value TEXT NOT NULL,
    PRIMARY KEY (record_id, name)
);

CREATE TABLE IF NOT EXISTS journals (
    journal_id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL REFERENCES records(record_id) ON DELETE CASCADE,
    author_id INTEGER NOT NULL,
    notes TEXT NOT NULL,
    status_change TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL REFERENCES records(record_id) ON DELETE CASCADE,
    event TEXT NOT NULL CHECK (event IN ('created')),
    created_at_us INTEGER NOT NULL,
    delivered_at_us INTEGER
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_updated
    ON records(updated_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_records_project_status
    ON records(project_id, status_is_closed);

CREATE INDEX IF NOT EXISTS idx_record_attributes_name_value
    ON record_attributes(name, value);

CREATE INDEX IF NOT EXISTS idx_journals_record_created
    ON journals(record_id, created_at_us);

CREATE INDEX IF NOT EXISTS idx_notifications_pending
    ON notifications(delivered_at_us, created_at_us);
";

/// Indexes the latest schema must provide.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_records_dedup",
    "idx_records_updated",
    "idx_records_project_status",
    "idx_record_attributes_name_value",
    "idx_journals_record_created",
    "idx_notifications_pending",
];
