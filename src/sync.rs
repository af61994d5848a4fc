use crate::database::models::{StudentRecord, SyncState};
use crate::database::repositories::StudentRepository;
use crate::database::Database;
use crate::error::{RemoteError, StoreError};
use crate::remote::StudentApi;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pushes pending local mutations to the remote authority, one item at a
/// time, in a fixed order: adds, then updates, then deletes. A single item's
/// failure never aborts the batch; the outcome of every item lands in the
/// returned [`SyncReport`].
#[derive(Clone)]
pub struct SyncManager {
    database: Database,
    remote: Arc<dyn StudentApi>,
    in_flight: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// True when another pass was already in flight and this call was a
    /// no-op.
    pub skipped: bool,
    pub pushed_adds: usize,
    pub pushed_updates: usize,
    pub pushed_deletes: usize,
    pub failures: Vec<SyncFailure>,
    pub completed_at: DateTime<Utc>,
}

impl SyncReport {
    fn empty(skipped: bool) -> Self {
        Self {
            skipped,
            pushed_adds: 0,
            pushed_updates: 0,
            pushed_deletes: 0,
            failures: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.skipped && self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub local_id: i64,
    pub operation: SyncOperation,
    pub message: String,
}

struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncManager {
    pub fn new(database: Database, remote: Arc<dyn StudentApi>) -> Self {
        Self {
            database,
            remote,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs one complete sync pass. Re-entrant calls while a pass is in
    /// flight return immediately with `skipped = true` instead of racing the
    /// same records. Store failures abort the pass; remote failures are
    /// per-item and recorded.
    pub async fn sync_local_changes(&self) -> Result<SyncReport, StoreError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("sync pass already in flight, skipping");
            return Ok(SyncReport::empty(true));
        }
        let _guard = InFlightGuard(self.in_flight.clone());

        tracing::debug!("starting sync of pending local changes");
        let mut report = SyncReport::empty(false);
        self.push_adds(&mut report).await?;
        self.push_updates(&mut report).await?;
        self.push_deletes(&mut report).await?;
        report.completed_at = Utc::now();
        tracing::info!(
            pushed_adds = report.pushed_adds,
            pushed_updates = report.pushed_updates,
            pushed_deletes = report.pushed_deletes,
            failures = report.failures.len(),
            "sync pass completed"
        );
        Ok(report)
    }

    async fn push_adds(&self, report: &mut SyncReport) -> Result<(), StoreError> {
        let pending = self
            .database
            .with_repositories(|repos| repos.students().list_pending_add())?;
        for record in pending {
            match self.remote.register_student(&record.to_domain()).await {
                Ok(created) => {
                    let Some(remote_id) = created.id else {
                        record_failure(
                            report,
                            &record,
                            SyncOperation::Add,
                            "remote returned a student without an id",
                        );
                        continue;
                    };
                    self.database.with_repositories(|repos| {
                        let students = repos.students();
                        students.set_remote_id(record.local_id, remote_id)?;
                        students.mark_synced(record.local_id)
                    })?;
                    report.pushed_adds += 1;
                    tracing::debug!(
                        local_id = record.local_id,
                        remote_id,
                        "registered pending student remotely"
                    );
                }
                Err(err) => record_remote_failure(report, &record, SyncOperation::Add, &err),
            }
        }
        Ok(())
    }

    async fn push_updates(&self, report: &mut SyncReport) -> Result<(), StoreError> {
        let pending = self
            .database
            .with_repositories(|repos| repos.students().list_pending_update())?;
        for record in pending {
            let Some(remote_id) = record.remote_id else {
                continue;
            };
            match self
                .remote
                .update_student(remote_id, &record.to_domain())
                .await
            {
                Ok(server) => {
                    let refreshed = StudentRecord {
                        local_id: record.local_id,
                        remote_id: server.id.or(Some(remote_id)),
                        name: server.name,
                        email: server.email,
                        phone: server.phone,
                        course_id: server.course_id,
                        state: SyncState::Synced,
                    };
                    self.database
                        .with_repositories(|repos| repos.students().upsert(&refreshed))?;
                    report.pushed_updates += 1;
                    tracing::debug!(
                        local_id = record.local_id,
                        remote_id,
                        "pushed pending update remotely"
                    );
                }
                Err(err) => record_remote_failure(report, &record, SyncOperation::Update, &err),
            }
        }
        Ok(())
    }

    async fn push_deletes(&self, report: &mut SyncReport) -> Result<(), StoreError> {
        let pending = self
            .database
            .with_repositories(|repos| repos.students().list_pending_delete())?;
        for record in pending {
            let Some(remote_id) = record.remote_id else {
                // The remote never knew about this record; nothing to tell it.
                self.database
                    .with_repositories(|repos| repos.students().delete(record.local_id))?;
                report.pushed_deletes += 1;
                continue;
            };
            match self.remote.delete_student(remote_id).await {
                Ok(()) => {
                    self.database
                        .with_repositories(|repos| repos.students().delete(record.local_id))?;
                    report.pushed_deletes += 1;
                    tracing::debug!(
                        local_id = record.local_id,
                        remote_id,
                        "confirmed remote delete, purged tombstone"
                    );
                }
                Err(err) if err.is_not_found() => {
                    // Already gone remotely; the delete is confirmed.
                    self.database
                        .with_repositories(|repos| repos.students().delete(record.local_id))?;
                    report.pushed_deletes += 1;
                }
                Err(err) => record_remote_failure(report, &record, SyncOperation::Delete, &err),
            }
        }
        Ok(())
    }
}

fn record_remote_failure(
    report: &mut SyncReport,
    record: &StudentRecord,
    operation: SyncOperation,
    err: &RemoteError,
) {
    tracing::warn!(
        local_id = record.local_id,
        ?operation,
        error = %err,
        "per-item sync failure, leaving record pending"
    );
    record_failure(report, record, operation, &err.to_string());
}

fn record_failure(
    report: &mut SyncReport,
    record: &StudentRecord,
    operation: SyncOperation,
    message: &str,
) {
    report.failures.push(SyncFailure {
        local_id: record.local_id,
        operation,
        message: message.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{NewStudentRecord, Student};
    use crate::database::open_in_memory;
    use crate::remote::mock::MockStudentApi;

    fn student(name: &str, course_id: i64) -> Student {
        Student {
            id: None,
            name: name.into(),
            email: format!("{name}@example.com"),
            phone: "555-0100".into(),
            course_id,
        }
    }

    fn setup() -> (SyncManager, Database, Arc<MockStudentApi>) {
        let db = open_in_memory();
        let remote = Arc::new(MockStudentApi::new());
        let manager = SyncManager::new(db.clone(), remote.clone());
        (manager, db, remote)
    }

    fn insert_pending_add(db: &Database, name: &str) -> i64 {
        db.with_repositories(|repos| repos.students().insert(&student(name, 1).as_pending_add()))
            .unwrap()
    }

    #[tokio::test]
    async fn add_then_sync_round_trip() {
        let (manager, db, _remote) = setup();
        let local_id = insert_pending_add(&db, "ada");

        let before = db
            .with_repositories(|r| r.students().get(local_id))
            .unwrap()
            .unwrap();
        assert_eq!(before.remote_id, None);
        assert!(!before.state.is_synced());

        let report = manager.sync_local_changes().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.pushed_adds, 1);

        let after = db
            .with_repositories(|r| r.students().get(local_id))
            .unwrap()
            .unwrap();
        assert!(after.remote_id.is_some());
        assert_eq!(after.state, SyncState::Synced);
    }

    #[tokio::test]
    async fn partial_failure_does_not_abort_the_batch() {
        let (manager, db, remote) = setup();
        let first = insert_pending_add(&db, "ada");
        let second = insert_pending_add(&db, "brian");
        let third = insert_pending_add(&db, "clara");
        remote.reject_name("brian");

        let report = manager.sync_local_changes().await.unwrap();
        assert_eq!(report.pushed_adds, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].local_id, second);
        assert_eq!(report.failures[0].operation, SyncOperation::Add);

        db.with_repositories(|repos| {
            let students = repos.students();
            assert_eq!(students.get(first)?.unwrap().state, SyncState::Synced);
            assert!(students.get(first)?.unwrap().remote_id.is_some());
            let stuck = students.get(second)?.unwrap();
            assert_eq!(stuck.state, SyncState::PendingAdd);
            assert_eq!(stuck.remote_id, None);
            assert_eq!(students.get(third)?.unwrap().state, SyncState::Synced);
            Ok(())
        })
        .unwrap();
    }

    #[tokio::test]
    async fn pending_update_pushes_server_representation() {
        let (manager, db, remote) = setup();
        remote.seed(vec![Student {
            id: Some(10),
            ..student("ada", 1)
        }]);
        let local_id = db
            .with_repositories(|repos| {
                repos.students().insert(&NewStudentRecord {
                    remote_id: Some(10),
                    name: "ada lovelace".into(),
                    email: "ada@example.com".into(),
                    phone: "555-0100".into(),
                    course_id: 1,
                    state: SyncState::PendingUpdate,
                })
            })
            .unwrap();

        let report = manager.sync_local_changes().await.unwrap();
        assert_eq!(report.pushed_updates, 1);

        let after = db
            .with_repositories(|r| r.students().get(local_id))
            .unwrap()
            .unwrap();
        assert_eq!(after.state, SyncState::Synced);
        assert_eq!(after.name, "ada lovelace");
        assert_eq!(after.remote_id, Some(10));
    }

    #[tokio::test]
    async fn pending_delete_drains_with_and_without_remote_identity() {
        let (manager, db, remote) = setup();
        remote.seed(vec![Student {
            id: Some(21),
            ..student("ada", 1)
        }]);
        let (with_remote, without_remote) = db
            .with_repositories(|repos| {
                let students = repos.students();
                let a = students.insert(&NewStudentRecord {
                    remote_id: Some(21),
                    name: "ada".into(),
                    email: "ada@example.com".into(),
                    phone: "555-0100".into(),
                    course_id: 1,
                    state: SyncState::PendingDelete,
                })?;
                let b = students.insert(&NewStudentRecord {
                    remote_id: None,
                    name: "brian".into(),
                    email: "brian@example.com".into(),
                    phone: "555-0101".into(),
                    course_id: 1,
                    state: SyncState::PendingDelete,
                })?;
                Ok((a, b))
            })
            .unwrap();

        let report = manager.sync_local_changes().await.unwrap();
        assert_eq!(report.pushed_deletes, 2);
        assert!(!remote.contains(21));

        db.with_repositories(|repos| {
            let students = repos.students();
            assert!(students.get(with_remote)?.is_none());
            assert!(students.get(without_remote)?.is_none());
            assert!(students.list_pending_delete()?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[tokio::test]
    async fn failed_delete_leaves_tombstone_for_retry() {
        let (manager, db, remote) = setup();
        remote.seed(vec![Student {
            id: Some(33),
            ..student("ada", 1)
        }]);
        let local_id = db
            .with_repositories(|repos| {
                repos.students().insert(&NewStudentRecord {
                    remote_id: Some(33),
                    name: "ada".into(),
                    email: "ada@example.com".into(),
                    phone: "555-0100".into(),
                    course_id: 1,
                    state: SyncState::PendingDelete,
                })
            })
            .unwrap();

        remote.set_offline(true);
        let report = manager.sync_local_changes().await.unwrap();
        assert_eq!(report.pushed_deletes, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].operation, SyncOperation::Delete);

        let still_there = db
            .with_repositories(|r| r.students().get(local_id))
            .unwrap()
            .unwrap();
        assert_eq!(still_there.state, SyncState::PendingDelete);

        remote.set_offline(false);
        let report = manager.sync_local_changes().await.unwrap();
        assert_eq!(report.pushed_deletes, 1);
    }

    #[tokio::test]
    async fn overlapping_invocation_is_a_no_op() {
        let (manager, _db, _remote) = setup();
        // Simulate an in-flight pass by holding the flag.
        manager.in_flight.store(true, Ordering::SeqCst);
        let report = manager.sync_local_changes().await.unwrap();
        assert!(report.skipped);
        assert_eq!(report.pushed_adds, 0);

        manager.in_flight.store(false, Ordering::SeqCst);
        let report = manager.sync_local_changes().await.unwrap();
        assert!(!report.skipped);
    }
}
