//! Find-or-create a tracking record for a notice and append its journal
//! entry.
//!
//! Per notice:
//!
//! 1. resolve project and tracker; a miss fails before the store is touched
//! 2. derive the dedup key `(project, tracker, subject, author)`
//! 3. find the record, or create it with notifications suppressed
//! 4. bump the occurrence counter (its own atomic write)
//! 5. reload the record
//! 6. build the journal entry, reopening a closed or status-less record
//! 7. commit status + journal against the reloaded `lock_version`
//!
//! A conflict in step 7 repeats steps 5 to 7 once. A second conflict is
//! logged and reported as [`JournalOutcome::Lost`]: the counter bump from
//! step 4 stays committed, the journal entry does not.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::directory::{IdentityDirectory, LookupContext, ProjectDirectory};
use crate::error::IngestError;
use crate::filter::BacktraceFilter;
use crate::model::notice::Notice;
use crate::model::record::{
    DedupKey, ENVIRONMENT_FIELD, ERROR_CLASS_FIELD, NewJournalEntry, NewRecord, OCCURRENCES_FIELD,
    RecordId, TrackingRecord, UserId,
};
use crate::render::{Dialect, render};
use crate::store::{StoreError, TrackingStore};
use crate::summary::{self, ResolvedAttributes};

/// Journal commits attempted before giving up on the entry.
pub const MAX_COMMIT_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JournalOutcome {
    Appended { reopened: bool },
    /// Both commit attempts conflicted; the occurrence was counted but no
    /// journal entry was written.
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub record_id: RecordId,
    pub subject: String,
    pub created: bool,
    pub occurrences: i64,
    pub journal: JournalOutcome,
}

pub struct Reconciler {
    projects: Arc<dyn ProjectDirectory>,
    identity: Arc<dyn IdentityDirectory>,
    store: Arc<dyn TrackingStore>,
    dialect: Dialect,
}

impl Reconciler {
    pub fn new(
        projects: Arc<dyn ProjectDirectory>,
        identity: Arc<dyn IdentityDirectory>,
        store: Arc<dyn TrackingStore>,
        dialect: Dialect,
    ) -> Self {
        Self {
            projects,
            identity,
            store,
            dialect,
        }
    }

    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// # Errors
    ///
    /// Returns [`IngestError::ProjectNotFound`] or
    /// [`IngestError::TrackerNotFound`] without touching the store, and
    /// [`IngestError::Persistence`] when a store call fails or times out.
    #[instrument(
        skip(self, ctx, notice),
        fields(request_id = %ctx, project = ?notice.routing.project, error_class = %notice.error_class)
    )]
    pub fn reconcile(
        &self,
        ctx: &LookupContext,
        notice: &Notice,
    ) -> Result<Reconciliation, IngestError> {
        let routing = &notice.routing;
        let project_name = routing.project.as_deref().unwrap_or_default();
        let project = self
            .projects
            .find_project(ctx, project_name)
            .ok_or_else(|| IngestError::ProjectNotFound(project_name.to_string()))?;
        let tracker_name = routing.tracker.as_deref().unwrap_or_default();
        let tracker = self
            .projects
            .find_tracker(ctx, &project, tracker_name)
            .ok_or_else(|| IngestError::TrackerNotFound(tracker_name.to_string()))?;

        let filtered = BacktraceFilter::with_project_patterns(&project.backtrace_filters)
            .apply(&notice.backtrace);
        if filtered.anomalies > 0 {
            warn!(anomalies = filtered.anomalies, "dropped backtrace frames without file");
        }
        let attrs = ResolvedAttributes::resolve(ctx, self.identity.as_ref(), &project, notice);
        let subject = summary::subject(
            &notice.environment_name,
            &notice.error_class,
            filtered.error_line(),
        );
        let key = DedupKey {
            project: project.id,
            tracker: tracker.id,
            subject: subject.clone(),
            author: attrs.author.id,
        };

        let persist = |err: StoreError| {
            error!(
                error = %err,
                subject = %key.subject,
                project = %project.identifier,
                tracker = %tracker.name,
                "tracking store failure"
            );
            IngestError::Persistence(err)
        };

        let (record, created) = match self.store.find_record(&key).map_err(persist)? {
            Some(record) => (record, false),
            None => {
                let new = NewRecord {
                    key: key.clone(),
                    assignee: attrs.assignee,
                    category: attrs.category,
                    priority: attrs.priority,
                    description: summary::description(
                        filtered.error_line(),
                        &summary::resolve_repository_root(routing, &project),
                    ),
                    status: self.identity.default_status(ctx),
                    attributes: initial_attributes(notice),
                    suppress_notifications: true,
                };
                match self.store.create_record(new) {
                    Ok(record) => {
                        info!(record_id = %record.id, subject = %subject, "created tracking record");
                        (record, true)
                    }
                    Err(StoreError::Duplicate) => {
                        warn!(subject = %subject, "lost create race, reconciling against winner");
                        let winner = self
                            .store
                            .find_record(&key)
                            .map_err(persist)?
                            .ok_or(StoreError::Duplicate)
                            .map_err(persist)?;
                        (winner, false)
                    }
                    Err(err) => return Err(persist(err)),
                }
            }
        };

        let occurrences = self
            .store
            .increment_counter(record.id, OCCURRENCES_FIELD)
            .map_err(persist)?;

        let notes = render(
            self.dialect,
            &notice.error_message,
            &filtered.frames,
            notice,
            &notice.backtrace,
        );
        let journal = self
            .commit_journal(ctx, &record, attrs.author.id, &notes)
            .map_err(persist)?;

        info!(
            record_id = %record.id,
            created,
            occurrences,
            journal = ?journal,
            "reconciled notice"
        );
        Ok(Reconciliation {
            record_id: record.id,
            subject,
            created,
            occurrences,
            journal,
        })
    }

    fn commit_journal(
        &self,
        ctx: &LookupContext,
        record: &TrackingRecord,
        author: UserId,
        notes: &str,
    ) -> Result<JournalOutcome, StoreError> {
        let default_status = self.identity.default_status(ctx);

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let current = self.store.reload(record.id)?;
            let reopen = current.needs_reopen();
            let entry = NewJournalEntry {
                author,
                notes: notes.to_string(),
            };
            match self.store.commit_journal_update(
                &current,
                reopen.then_some(&default_status),
                entry,
            ) {
                Ok(_) => return Ok(JournalOutcome::Appended { reopened: reopen }),
                Err(StoreError::Conflict(id)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(record_id = %id, attempt, "journal commit conflicted, retrying");
                }
                Err(StoreError::Conflict(id)) => {
                    error!(
                        record_id = %id,
                        attempts = MAX_COMMIT_ATTEMPTS,
                        "journal commit conflicted again, giving up on the entry"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(JournalOutcome::Lost)
    }
}

fn initial_attributes(notice: &Notice) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    attributes.insert(ERROR_CLASS_FIELD.to_string(), notice.error_class.clone());
    if !notice.environment_name.is_empty() {
        attributes.insert(ENVIRONMENT_FIELD.to_string(), notice.environment_name.clone());
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::directory::StaticDirectory;
    use crate::model::notice::Frame;
    use crate::model::record::Status;
    use crate::store::memory::MemoryStore;

    fn setup() -> (Reconciler, Arc<MemoryStore>) {
        let config: Config = toml::from_str(
            "[[projects]]\nidentifier = \"shop\"\ntrackers = [\"Bug\"]\n",
        )
        .expect("parse");
        let dir = Arc::new(StaticDirectory::from_config(&config));
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(dir.clone(), dir, store.clone(), Dialect::Textile);
        (reconciler, store)
    }

    fn notice() -> Notice {
        let mut notice = Notice {
            error_class: "RuntimeError".into(),
            error_message: "boom".into(),
            backtrace: vec![Frame::new("[PROJECT_ROOT]/app/x.rb", 6, "index")],
            environment_name: "staging".into(),
            ..Notice::default()
        };
        notice.routing.project = Some("shop".into());
        notice.routing.tracker = Some("Bug".into());
        notice
    }

    #[test]
    fn first_notice_creates_second_appends() {
        let (reconciler, store) = setup();
        let ctx = LookupContext::new("t");

        let first = reconciler.reconcile(&ctx, &notice()).expect("first");
        assert!(first.created);
        assert_eq!(first.subject, "[staging] RuntimeError in app/x.rb:6");
        assert_eq!(first.occurrences, 1);

        let second = reconciler.reconcile(&ctx, &notice()).expect("second");
        assert!(!second.created);
        assert_eq!(second.record_id, first.record_id);
        assert_eq!(second.occurrences, 2);

        let record = &store.records()[0];
        assert_eq!(record.journal.len(), 2);
        assert_eq!(record.attributes[ERROR_CLASS_FIELD], "RuntimeError");
        assert_eq!(record.attributes[ENVIRONMENT_FIELD], "staging");
        assert!(store.notifications().is_empty());
    }

    #[test]
    fn unknown_project_never_touches_store() {
        let (reconciler, store) = setup();
        let mut n = notice();
        n.routing.project = Some("nope".into());
        let err = reconciler
            .reconcile(&LookupContext::new("t"), &n)
            .expect_err("unknown project");
        assert!(matches!(err, IngestError::ProjectNotFound(p) if p == "nope"));
        assert_eq!(store.operations(), 0);
    }

    #[test]
    fn unknown_tracker_never_touches_store() {
        let (reconciler, store) = setup();
        let mut n = notice();
        n.routing.tracker = Some("Feature".into());
        let err = reconciler
            .reconcile(&LookupContext::new("t"), &n)
            .expect_err("unknown tracker");
        assert_eq!(err.status(), 404);
        assert_eq!(store.operations(), 0);
    }

    #[test]
    fn closed_record_is_reopened() {
        let (reconciler, store) = setup();
        let ctx = LookupContext::new("t");
        let first = reconciler.reconcile(&ctx, &notice()).expect("first");
        store
            .set_status(first.record_id, Status::closed("Closed"))
            .expect("close");

        let second = reconciler.reconcile(&ctx, &notice()).expect("second");
        assert_eq!(second.journal, JournalOutcome::Appended { reopened: true });
        let record = store.reload(first.record_id).expect("reload");
        assert_eq!(record.status, Some(Status::open("New")));
        assert_eq!(record.journal[1].status_change.as_deref(), Some("New"));
    }
}
