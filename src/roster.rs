use crate::connectivity::ConnectivityProbe;
use crate::database::models::{Student, StudentRecord, SyncState};
use crate::database::repositories::StudentRepository;
use crate::database::Database;
use crate::error::StoreError;
use crate::remote::StudentApi;
use crate::sync::{SyncManager, SyncReport};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Where a fetched result set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataOrigin {
    /// Straight from the remote authority.
    Api,
    /// Served from the local cache while offline.
    Local,
    /// Served from an empty local cache while offline.
    LocalNoData,
    /// Served from the local cache after the remote call failed.
    LocalWithError,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataOrigin::Api => "api",
            DataOrigin::Local => "local",
            DataOrigin::LocalNoData => "local-no-data",
            DataOrigin::LocalWithError => "local-with-error",
        };
        f.write_str(label)
    }
}

/// Immutable snapshot consumed by the presentation layer. Replaced wholesale
/// on every transition; readers never observe a partial update.
#[derive(Debug, Clone, Serialize)]
pub struct RosterState {
    pub loading: bool,
    pub students: Vec<Student>,
    pub error: Option<String>,
    pub origin: DataOrigin,
    pub syncing: bool,
}

impl Default for RosterState {
    fn default() -> Self {
        Self {
            loading: false,
            students: Vec::new(),
            error: None,
            origin: DataOrigin::Api,
            syncing: false,
        }
    }
}

/// Answers roster queries with the freshest available truth and applies
/// local-first mutations. Every operation publishes a new [`RosterState`]
/// snapshot and returns it.
#[derive(Clone)]
pub struct RosterService {
    database: Database,
    remote: Arc<dyn StudentApi>,
    probe: Arc<dyn ConnectivityProbe>,
    sync: SyncManager,
    state: Arc<watch::Sender<RosterState>>,
    last_course: Arc<Mutex<Option<i64>>>,
}

impl RosterService {
    pub fn new(
        database: Database,
        remote: Arc<dyn StudentApi>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let sync = SyncManager::new(database.clone(), remote.clone());
        let (state, _) = watch::channel(RosterState::default());
        Self {
            database,
            remote,
            probe,
            sync,
            state: Arc::new(state),
            last_course: Arc::new(Mutex::new(None)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RosterState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> RosterState {
        self.state.borrow().clone()
    }

    pub fn sync_manager(&self) -> SyncManager {
        self.sync.clone()
    }

    /// Fetches the roster for a course: remote truth when online (written
    /// through to the cache), local cache otherwise, degrading gracefully on
    /// remote failure. The result is deduplicated by identity, first
    /// occurrence wins.
    pub async fn fetch_by_course(&self, course_id: i64) -> RosterState {
        if let Ok(mut guard) = self.last_course.lock() {
            *guard = Some(course_id);
        }
        self.begin();

        if self.probe.is_online() {
            match self.remote.list_by_course(course_id).await {
                Ok(students) => {
                    let students = dedup_students(students);
                    if let Err(err) = self.cache_remote_students(&students) {
                        tracing::error!(error = %err, course_id, "failed to cache fetched roster");
                        return self.finish(
                            students,
                            DataOrigin::Api,
                            Some(format!("failed to cache roster locally: {err}")),
                        );
                    }
                    self.finish(students, DataOrigin::Api, None)
                }
                Err(err) => {
                    tracing::warn!(error = %err, course_id, "remote roster fetch failed, falling back to cache");
                    match self.load_local(course_id) {
                        Ok(local) => self.finish(
                            local,
                            DataOrigin::LocalWithError,
                            Some(format!("failed to load students from remote: {err}")),
                        ),
                        Err(store_err) => self.fail(format!(
                            "remote fetch failed ({err}) and local cache unavailable: {store_err}"
                        )),
                    }
                }
            }
        } else {
            match self.load_local(course_id) {
                Ok(local) => {
                    let origin = if local.is_empty() {
                        DataOrigin::LocalNoData
                    } else {
                        DataOrigin::Local
                    };
                    self.finish(local, origin, None)
                }
                Err(err) => self.fail(format!("failed to read local cache: {err}")),
            }
        }
    }

    /// Single-record fetch keyed by the remote identity, with the same
    /// online/offline/fallback shape as the roster fetch. A missing record
    /// is a user-visible not-found state, not a failure.
    pub async fn fetch_by_id(&self, remote_id: i64) -> RosterState {
        self.begin();

        if self.probe.is_online() {
            match self.remote.get_student(remote_id).await {
                Ok(student) => {
                    if let Err(err) = self.cache_remote_students(std::slice::from_ref(&student)) {
                        tracing::error!(error = %err, remote_id, "failed to cache fetched student");
                    }
                    self.finish(vec![student], DataOrigin::Api, None)
                }
                Err(err) if err.is_not_found() => {
                    self.finish(Vec::new(), DataOrigin::Api, Some("student not found".into()))
                }
                Err(err) => {
                    tracing::warn!(error = %err, remote_id, "remote student fetch failed, falling back to cache");
                    match self.load_cached_student(remote_id) {
                        Ok(Some(student)) => self.finish(
                            vec![student],
                            DataOrigin::LocalWithError,
                            Some(format!("failed to load student from remote: {err}")),
                        ),
                        Ok(None) => self.finish(
                            Vec::new(),
                            DataOrigin::LocalWithError,
                            Some("student not found".into()),
                        ),
                        Err(store_err) => {
                            self.fail(format!("failed to read local cache: {store_err}"))
                        }
                    }
                }
            }
        } else {
            match self.load_cached_student(remote_id) {
                Ok(Some(student)) => self.finish(vec![student], DataOrigin::Local, None),
                Ok(None) => self.finish(
                    Vec::new(),
                    DataOrigin::Local,
                    Some("student not found".into()),
                ),
                Err(err) => self.fail(format!("failed to read local cache: {err}")),
            }
        }
    }

    /// Stores the student locally as a pending add (always), pushes it
    /// immediately when online, then refreshes the course roster.
    pub async fn add_student(&self, student: Student) -> RosterState {
        self.begin();
        let entry = student.as_pending_add();
        let local_id = match self
            .database
            .with_repositories(|repos| repos.students().insert(&entry))
        {
            Ok(id) => id,
            Err(err) => return self.fail(format!("failed to store student locally: {err}")),
        };
        tracing::debug!(local_id, course_id = student.course_id, "stored student as pending add");

        if self.probe.is_online() {
            match self.remote.register_student(&student).await {
                Ok(created) => match created.id {
                    Some(remote_id) => {
                        let confirmed = self.database.with_repositories(|repos| {
                            let students = repos.students();
                            students.set_remote_id(local_id, remote_id)?;
                            students.mark_synced(local_id)
                        });
                        if let Err(err) = confirmed {
                            return self
                                .fail(format!("failed to record remote identity: {err}"));
                        }
                    }
                    None => {
                        tracing::warn!(local_id, "remote returned a student without an id, keeping pending");
                    }
                },
                Err(err) => {
                    tracing::warn!(local_id, error = %err, "failed to push new student, will retry on next sync");
                }
            }
        }

        self.fetch_by_course(student.course_id).await
    }

    /// Persists the edit as a pending update (a record the remote has never
    /// seen stays a pending add), pushes it immediately when possible, then
    /// refreshes.
    pub async fn update_student(&self, local_id: i64, student: Student) -> RosterState {
        self.begin();
        let existing = match self
            .database
            .with_repositories(|repos| repos.students().get(local_id))
        {
            Ok(Some(record)) => record,
            Ok(None) => return self.fail("student not found"),
            Err(err) => return self.fail(format!("failed to read local cache: {err}")),
        };

        let next_state = if existing.remote_id.is_some() {
            SyncState::PendingUpdate
        } else {
            SyncState::PendingAdd
        };
        let edited = existing.with_fields(&student, next_state);
        if let Err(err) = self
            .database
            .with_repositories(|repos| repos.students().upsert(&edited))
        {
            return self.fail(format!("failed to store edit locally: {err}"));
        }

        if self.probe.is_online() {
            if let Some(remote_id) = existing.remote_id {
                match self.remote.update_student(remote_id, &student).await {
                    Ok(server) => {
                        let refreshed = StudentRecord {
                            local_id,
                            remote_id: server.id.or(Some(remote_id)),
                            name: server.name,
                            email: server.email,
                            phone: server.phone,
                            course_id: server.course_id,
                            state: SyncState::Synced,
                        };
                        if let Err(err) = self
                            .database
                            .with_repositories(|repos| repos.students().upsert(&refreshed))
                        {
                            return self
                                .fail(format!("failed to store confirmed update: {err}"));
                        }
                    }
                    Err(err) => {
                        tracing::warn!(local_id, error = %err, "failed to push update, will retry on next sync");
                    }
                }
            }
        }

        self.fetch_by_course(student.course_id).await
    }

    /// Deletes locally first: a record the remote never knew about is purged
    /// outright, anything else becomes a tombstone that survives until the
    /// remote delete is confirmed.
    pub async fn delete_student(&self, local_id: i64, course_id: i64) -> RosterState {
        self.begin();
        let existing = match self
            .database
            .with_repositories(|repos| repos.students().get(local_id))
        {
            Ok(Some(record)) => record,
            Ok(None) => return self.fail("student not found"),
            Err(err) => return self.fail(format!("failed to read local cache: {err}")),
        };

        match existing.remote_id {
            None => {
                if let Err(err) = self
                    .database
                    .with_repositories(|repos| repos.students().delete(local_id))
                {
                    return self.fail(format!("failed to delete student locally: {err}"));
                }
                tracing::debug!(local_id, "purged never-synced student");
            }
            Some(remote_id) => {
                let mut tombstone = existing.clone();
                tombstone.state = SyncState::PendingDelete;
                if let Err(err) = self
                    .database
                    .with_repositories(|repos| repos.students().upsert(&tombstone))
                {
                    return self.fail(format!("failed to tombstone student: {err}"));
                }

                if self.probe.is_online() {
                    match self.remote.delete_student(remote_id).await {
                        Ok(()) => {
                            if let Err(err) = self
                                .database
                                .with_repositories(|repos| repos.students().delete(local_id))
                            {
                                return self
                                    .fail(format!("failed to purge deleted student: {err}"));
                            }
                        }
                        Err(err) if err.is_not_found() => {
                            // Already gone remotely; treat the delete as
                            // confirmed.
                            if let Err(err) = self
                                .database
                                .with_repositories(|repos| repos.students().delete(local_id))
                            {
                                return self
                                    .fail(format!("failed to purge deleted student: {err}"));
                            }
                        }
                        Err(err) => {
                            tracing::warn!(local_id, remote_id, error = %err, "failed to push delete, tombstone kept for retry");
                        }
                    }
                }
            }
        }

        self.fetch_by_course(course_id).await
    }

    /// Runs one sync pass, reflecting progress in the `syncing` flag.
    /// Per-item failures land in the report, not in the snapshot error.
    pub async fn sync_now(&self) -> Result<SyncReport, StoreError> {
        self.publish(|s| RosterState {
            syncing: true,
            ..s.clone()
        });
        let result = self.sync.sync_local_changes().await;
        match &result {
            Ok(_) => {
                self.publish(|s| RosterState {
                    syncing: false,
                    ..s.clone()
                });
            }
            Err(err) => {
                let message = format!("sync failed: {err}");
                self.publish(|s| RosterState {
                    syncing: false,
                    error: Some(message.clone()),
                    ..s.clone()
                });
            }
        }
        result
    }

    /// Re-fetches the most recently requested course, if any. Used by the
    /// connectivity monitor after a transition.
    pub async fn refresh(&self) -> Option<RosterState> {
        let course_id = self.last_course.lock().ok().and_then(|guard| *guard)?;
        Some(self.fetch_by_course(course_id).await)
    }

    fn load_local(&self, course_id: i64) -> Result<Vec<Student>, StoreError> {
        let records = self
            .database
            .with_repositories(|repos| repos.students().list_for_course(course_id))?;
        Ok(dedup_records(records)
            .into_iter()
            .map(|record| record.to_domain())
            .collect())
    }

    fn load_cached_student(&self, remote_id: i64) -> Result<Option<Student>, StoreError> {
        let record = self
            .database
            .with_repositories(|repos| repos.students().get_by_remote_id(remote_id))?;
        Ok(record
            .filter(|r| r.state != SyncState::PendingDelete)
            .map(|r| r.to_domain()))
    }

    /// Writes fetched records through to the cache as synced truth. Rows
    /// currently tombstoned keep their pending delete; the tombstone is
    /// dropped only once the remote confirms the delete.
    fn cache_remote_students(&self, students: &[Student]) -> Result<(), StoreError> {
        self.database.with_repositories(|repos| {
            let table = repos.students();
            for student in students {
                let Some(remote_id) = student.id else {
                    tracing::debug!("skipping remote student without id during write-through");
                    continue;
                };
                match table.get_by_remote_id(remote_id)? {
                    Some(existing) if existing.state == SyncState::PendingDelete => continue,
                    Some(existing) => {
                        table.upsert(&StudentRecord {
                            local_id: existing.local_id,
                            remote_id: Some(remote_id),
                            name: student.name.clone(),
                            email: student.email.clone(),
                            phone: student.phone.clone(),
                            course_id: student.course_id,
                            state: SyncState::Synced,
                        })?;
                    }
                    None => {
                        table.insert(&student.as_synced_cache())?;
                    }
                }
            }
            Ok(())
        })
    }

    /// Publishes the start-of-operation snapshot: loading, previous error
    /// cleared so stale errors never outlive the operation that produced
    /// them.
    fn begin(&self) {
        self.publish(|s| RosterState {
            loading: true,
            error: None,
            ..s.clone()
        });
    }

    fn finish(
        &self,
        students: Vec<Student>,
        origin: DataOrigin,
        error: Option<String>,
    ) -> RosterState {
        self.publish(|s| RosterState {
            loading: false,
            students: students.clone(),
            error: error.clone(),
            origin,
            syncing: s.syncing,
        })
    }

    fn fail(&self, message: impl Into<String>) -> RosterState {
        let message = message.into();
        tracing::error!(error = %message, "roster operation failed");
        self.publish(|s| RosterState {
            loading: false,
            error: Some(message.clone()),
            ..s.clone()
        })
    }

    fn publish<F>(&self, f: F) -> RosterState
    where
        F: FnOnce(&RosterState) -> RosterState,
    {
        let next = {
            let current = self.state.borrow();
            f(&current)
        };
        self.state.send_replace(next.clone());
        next
    }
}

/// First occurrence wins: a repeated identity further down the list is
/// dropped.
fn dedup_students(students: Vec<Student>) -> Vec<Student> {
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(students.len());
    for student in students {
        match student.id {
            Some(id) if !seen.insert(id) => {
                tracing::debug!(remote_id = id, "dropping duplicate identity from remote response");
            }
            _ => result.push(student),
        }
    }
    result
}

/// Dedup for cached rows: remote identity preferred, local identity
/// otherwise (which is unique by construction).
fn dedup_records(records: Vec<StudentRecord>) -> Vec<StudentRecord> {
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(records.len());
    for record in records {
        let key = match record.remote_id {
            Some(remote_id) => (true, remote_id),
            None => (false, record.local_id),
        };
        if seen.insert(key) {
            result.push(record);
        }
    }
    result
}
