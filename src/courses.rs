use crate::database::models::Course;
use crate::error::RemoteError;
use crate::remote::CourseApi;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Snapshot of the course list. Courses carry no offline cache, so the only
/// degraded state is an error with whatever was last fetched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CourseState {
    pub loading: bool,
    pub courses: Vec<Course>,
    pub error: Option<String>,
}

/// Online-only surface over the parent course records.
#[derive(Clone)]
pub struct CourseService {
    remote: Arc<dyn CourseApi>,
    state: Arc<watch::Sender<CourseState>>,
}

impl CourseService {
    pub fn new(remote: Arc<dyn CourseApi>) -> Self {
        let (state, _) = watch::channel(CourseState::default());
        Self {
            remote,
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CourseState> {
        self.state.subscribe()
    }

    pub async fn fetch_courses(&self) -> CourseState {
        self.publish(|s| CourseState {
            loading: true,
            error: None,
            courses: s.courses.clone(),
        });
        match self.remote.list_courses().await {
            Ok(courses) => self.publish(|_| CourseState {
                loading: false,
                courses,
                error: None,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "course list fetch failed");
                self.publish(|s| CourseState {
                    loading: false,
                    courses: s.courses.clone(),
                    error: Some(format!("failed to load courses: {err}")),
                })
            }
        }
    }

    pub async fn get_course(&self, id: i64) -> Result<Course, RemoteError> {
        self.remote.get_course(id).await
    }

    pub async fn create_course(&self, course: &Course) -> Result<Course, RemoteError> {
        let created = self.remote.create_course(course).await?;
        self.fetch_courses().await;
        Ok(created)
    }

    pub async fn update_course(&self, id: i64, course: &Course) -> Result<Course, RemoteError> {
        let updated = self.remote.update_course(id, course).await?;
        self.fetch_courses().await;
        Ok(updated)
    }

    pub async fn delete_course(&self, id: i64) -> Result<(), RemoteError> {
        self.remote.delete_course(id).await?;
        self.fetch_courses().await;
        Ok(())
    }

    fn publish<F>(&self, f: F) -> CourseState
    where
        F: FnOnce(&CourseState) -> CourseState,
    {
        let next = {
            let current = self.state.borrow();
            f(&current)
        };
        self.state.send_replace(next.clone());
        next
    }
}
