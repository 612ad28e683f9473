use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Custom attribute holding the notice's error class.
pub const ERROR_CLASS_FIELD: &str = "Error class";
/// Custom attribute counting reconciled notices.
pub const OCCURRENCES_FIELD: &str = "Occurrences";
/// Custom attribute holding the deployment environment tag.
pub const ENVIRONMENT_FIELD: &str = "Environment";

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(ProjectId);
id_type!(TrackerId);
id_type!(UserId);
id_type!(GroupId);
id_type!(CategoryId);
id_type!(PriorityId);
id_type!(
    /// Identity of a tracking record inside the store.
    RecordId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub identifier: String,
    /// Extra noise patterns applied after the built-in ones.
    pub backtrace_filters: Vec<String>,
    /// Source browser root, without a trailing `/`.
    pub repository_root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    pub id: TrackerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// Who a record is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Principal {
    User(UserId),
    Group(GroupId),
}

impl Principal {
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) => "group",
        }
    }

    #[must_use]
    pub const fn raw_id(self) -> i64 {
        match self {
            Self::User(UserId(id)) | Self::Group(GroupId(id)) => id,
        }
    }
}

/// Workflow status of a tracking record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub name: String,
    pub is_closed: bool,
}

impl Status {
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_closed: false,
        }
    }

    pub fn closed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_closed: true,
        }
    }
}

/// `(project, tracker, subject, author)`: one logical tracking record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub project: ProjectId,
    pub tracker: TrackerId,
    pub subject: String,
    pub author: UserId,
}

/// Append-only change-log entry on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub author: UserId,
    pub notes: String,
    /// Name of the status the record moved to with this entry, if any.
    pub status_change: Option<String>,
    pub created_at_us: i64,
}

/// Journal entry as submitted, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJournalEntry {
    pub author: UserId,
    pub notes: String,
}

/// Initial attributes for a record created on the first occurrence of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub key: DedupKey,
    pub assignee: Option<Principal>,
    pub category: Option<CategoryId>,
    pub priority: PriorityId,
    pub description: String,
    pub status: Status,
    pub attributes: BTreeMap<String, String>,
    /// When set, the store must not fire its outbound notifications for
    /// this create.
    pub suppress_notifications: bool,
}

/// Persistent issue accumulating occurrences of one deduplicated error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub id: RecordId,
    pub key: DedupKey,
    pub status: Option<Status>,
    pub assignee: Option<Principal>,
    pub category: Option<CategoryId>,
    pub priority: PriorityId,
    pub description: String,
    pub attributes: BTreeMap<String, String>,
    pub journal: Vec<JournalEntry>,
    /// Optimistic-concurrency stamp; bumped by every journal commit.
    pub lock_version: i64,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl TrackingRecord {
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.key.subject
    }

    /// Current occurrence counter, `0` when absent or unparseable.
    #[must_use]
    pub fn occurrences(&self) -> i64 {
        self.attributes
            .get(OCCURRENCES_FIELD)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// A record without a status, or with a closed one, must be reopened by
    /// the next occurrence.
    #[must_use]
    pub fn needs_reopen(&self) -> bool {
        self.status.as_ref().is_none_or(|status| status.is_closed)
    }
}
