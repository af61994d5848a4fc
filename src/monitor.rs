use crate::connectivity::ConnectivityProbe;
use crate::roster::RosterService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Background task that samples the connectivity probe on a fixed period and
/// reacts to transitions only. Regaining the remote drains pending local
/// changes and re-fetches; losing it re-fetches so the published snapshot
/// reflects the cache.
pub struct ConnectivityMonitor {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn spawn(
        probe: Arc<dyn ConnectivityProbe>,
        roster: RosterService,
        period: Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            // First sample establishes the baseline without acting; only
            // later changes count as transitions.
            ticker.tick().await;
            let mut last_online = probe.is_online();
            tracing::info!(online = last_online, "connectivity monitor started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("connectivity monitor stopping");
                        return;
                    }
                }

                let online = probe.is_online();
                if online == last_online {
                    continue;
                }
                last_online = online;

                if online {
                    tracing::info!("remote reachable again, draining pending changes");
                    match roster.sync_now().await {
                        Ok(report) if report.is_clean() => {
                            tracing::info!(
                                adds = report.pushed_adds,
                                updates = report.pushed_updates,
                                deletes = report.pushed_deletes,
                                "sync pass complete"
                            );
                        }
                        Ok(report) => {
                            tracing::warn!(
                                failures = report.failures.len(),
                                "sync pass completed with failures"
                            );
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "sync pass aborted");
                        }
                    }
                    roster.refresh().await;
                } else {
                    tracing::warn!("remote unreachable, serving from local cache");
                    roster.refresh().await;
                }
            }
        });
        Self { handle, shutdown }
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::SharedProbe;
    use crate::database::models::Student;
    use crate::database::open_in_memory;
    use crate::database::repositories::StudentRepository;
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

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(80)).await;
    }

    #[tokio::test]
    async fn regaining_connectivity_drains_pending_changes() {
        let db = open_in_memory();
        let remote = Arc::new(MockStudentApi::new());
        let probe = SharedProbe::new(false);
        let roster = RosterService::new(db.clone(), remote.clone(), Arc::new(probe.clone()));

        roster.add_student(student("ada", 7)).await;
        assert_eq!(
            db.with_repositories(|r| r.students().list_pending_add())
                .unwrap()
                .len(),
            1
        );

        let monitor = ConnectivityMonitor::spawn(
            Arc::new(probe.clone()),
            roster.clone(),
            Duration::from_millis(10),
        );
        settle().await;

        probe.set_online(true);
        settle().await;
        monitor.shutdown().await;

        let unsynced = db
            .with_repositories(|r| r.students().list_unsynced())
            .unwrap();
        assert!(unsynced.is_empty());
        assert_eq!(
            remote
                .register_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn losing_connectivity_republishes_from_cache() {
        let db = open_in_memory();
        let remote = Arc::new(MockStudentApi::new());
        remote.seed(vec![Student {
            id: Some(1),
            ..student("ada", 7)
        }]);
        let probe = SharedProbe::new(true);
        let roster = RosterService::new(db, remote.clone(), Arc::new(probe.clone()));

        let state = roster.fetch_by_course(7).await;
        assert_eq!(state.origin, crate::roster::DataOrigin::Api);

        let monitor = ConnectivityMonitor::spawn(
            Arc::new(probe.clone()),
            roster.clone(),
            Duration::from_millis(10),
        );
        settle().await;

        probe.set_online(false);
        settle().await;
        monitor.shutdown().await;

        let latest = roster.current();
        assert_eq!(latest.origin, crate::roster::DataOrigin::Local);
        assert_eq!(latest.students.len(), 1);
    }

    #[tokio::test]
    async fn steady_state_takes_no_action() {
        let db = open_in_memory();
        let remote = Arc::new(MockStudentApi::new());
        let probe = SharedProbe::new(true);
        let roster = RosterService::new(db, remote.clone(), Arc::new(probe.clone()));
        roster.fetch_by_course(7).await;
        let baseline = remote.list_calls.load(std::sync::atomic::Ordering::SeqCst);

        let monitor = ConnectivityMonitor::spawn(
            Arc::new(probe),
            roster,
            Duration::from_millis(10),
        );
        settle().await;
        monitor.shutdown().await;

        // No transition happened, so the monitor never re-fetched.
        assert_eq!(
            remote.list_calls.load(std::sync::atomic::Ordering::SeqCst),
            baseline
        );
    }
}
