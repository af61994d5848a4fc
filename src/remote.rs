use crate::database::models::{Course, Student};
use crate::error::RemoteError;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote authority for student records. Every call is request/response and
/// may fail with a transport or application-level error.
#[async_trait]
pub trait StudentApi: Send + Sync {
    async fn list_by_course(&self, course_id: i64) -> Result<Vec<Student>, RemoteError>;
    async fn get_student(&self, remote_id: i64) -> Result<Student, RemoteError>;
    /// Registers a new student; the returned record carries the
    /// server-assigned identity.
    async fn register_student(&self, student: &Student) -> Result<Student, RemoteError>;
    async fn update_student(
        &self,
        remote_id: i64,
        student: &Student,
    ) -> Result<Student, RemoteError>;
    async fn delete_student(&self, remote_id: i64) -> Result<(), RemoteError>;
}

/// Remote authority for the parent course records. Courses carry no offline
/// cache, so this surface is consumed online only.
#[async_trait]
pub trait CourseApi: Send + Sync {
    async fn list_courses(&self) -> Result<Vec<Course>, RemoteError>;
    async fn get_course(&self, id: i64) -> Result<Course, RemoteError>;
    async fn create_course(&self, course: &Course) -> Result<Course, RemoteError>;
    async fn update_course(&self, id: i64, course: &Course) -> Result<Course, RemoteError>;
    async fn delete_course(&self, id: i64) -> Result<(), RemoteError>;
}

/// HTTP implementation over the original REST surface.
#[derive(Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport(err: reqwest::Error) -> RemoteError {
    RemoteError::Unreachable(err.to_string())
}

#[async_trait]
impl StudentApi for HttpRemote {
    async fn list_by_course(&self, course_id: i64) -> Result<Vec<Student>, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("api/student/byCourse/{course_id}")))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn get_student(&self, remote_id: i64) -> Result<Student, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("api/student/getStudent/{remote_id}")))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn register_student(&self, student: &Student) -> Result<Student, RemoteError> {
        let response = self
            .client
            .post(self.url("api/student/registerStudent"))
            .json(student)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn update_student(
        &self,
        remote_id: i64,
        student: &Student,
    ) -> Result<Student, RemoteError> {
        let response = self
            .client
            .put(self.url(&format!("api/student/updateStudent/{remote_id}")))
            .json(student)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn delete_student(&self, remote_id: i64) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.url(&format!("api/student/deleteStudent/{remote_id}")))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl CourseApi for HttpRemote {
    async fn list_courses(&self) -> Result<Vec<Course>, RemoteError> {
        let response = self
            .client
            .get(self.url("api/course"))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn get_course(&self, id: i64) -> Result<Course, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("api/course/{id}")))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn create_course(&self, course: &Course) -> Result<Course, RemoteError> {
        let response = self
            .client
            .post(self.url("api/course"))
            .json(course)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn update_course(&self, id: i64, course: &Course) -> Result<Course, RemoteError> {
        let response = self
            .client
            .put(self.url(&format!("api/course/{id}")))
            .json(course)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn delete_course(&self, id: i64) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.url(&format!("api/course/{id}")))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory stand-in for the remote authority with switchable
    /// reachability and per-name failure injection.
    pub struct MockStudentApi {
        state: Mutex<MockState>,
        offline: AtomicBool,
        reject_names: Mutex<HashSet<String>>,
        pub register_calls: AtomicUsize,
        pub list_calls: AtomicUsize,
    }

    struct MockState {
        next_id: i64,
        students: HashMap<i64, Student>,
    }

    impl MockStudentApi {
        pub fn new() -> Self {
            Self {
                state: Mutex::new(MockState {
                    next_id: 1,
                    students: HashMap::new(),
                }),
                offline: AtomicBool::new(false),
                reject_names: Mutex::new(HashSet::new()),
                register_calls: AtomicUsize::new(0),
                list_calls: AtomicUsize::new(0),
            }
        }

        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        /// Makes register/update calls for students with this name fail with
        /// an application-level rejection.
        pub fn reject_name(&self, name: &str) {
            self.reject_names.lock().unwrap().insert(name.to_string());
        }

        pub fn seed(&self, students: Vec<Student>) {
            let mut state = self.state.lock().unwrap();
            for student in students {
                let id = student.id.unwrap_or_else(|| {
                    let id = state.next_id;
                    state.next_id += 1;
                    id
                });
                state.next_id = state.next_id.max(id + 1);
                state.students.insert(id, Student {
                    id: Some(id),
                    ..student
                });
            }
        }

        pub fn contains(&self, remote_id: i64) -> bool {
            self.state.lock().unwrap().students.contains_key(&remote_id)
        }

        fn gate(&self, name: Option<&str>) -> Result<(), RemoteError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(RemoteError::Unreachable("mock remote offline".into()));
            }
            if let Some(name) = name {
                if self.reject_names.lock().unwrap().contains(name) {
                    return Err(RemoteError::Rejected {
                        status: 422,
                        message: format!("rejected student {name}"),
                    });
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StudentApi for MockStudentApi {
        async fn list_by_course(&self, course_id: i64) -> Result<Vec<Student>, RemoteError> {
            self.gate(None)?;
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let state = self.state.lock().unwrap();
            let mut students: Vec<Student> = state
                .students
                .values()
                .filter(|s| s.course_id == course_id)
                .cloned()
                .collect();
            students.sort_by_key(|s| s.id);
            Ok(students)
        }

        async fn get_student(&self, remote_id: i64) -> Result<Student, RemoteError> {
            self.gate(None)?;
            let state = self.state.lock().unwrap();
            state.students.get(&remote_id).cloned().ok_or(RemoteError::Rejected {
                status: 404,
                message: format!("no student {remote_id}"),
            })
        }

        async fn register_student(&self, student: &Student) -> Result<Student, RemoteError> {
            self.gate(Some(&student.name))?;
            self.register_calls.fetch_add(1, Ordering::SeqCst);
            let mut state = self.state.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            let created = Student {
                id: Some(id),
                ..student.clone()
            };
            state.students.insert(id, created.clone());
            Ok(created)
        }

        async fn update_student(
            &self,
            remote_id: i64,
            student: &Student,
        ) -> Result<Student, RemoteError> {
            self.gate(Some(&student.name))?;
            let mut state = self.state.lock().unwrap();
            if !state.students.contains_key(&remote_id) {
                return Err(RemoteError::Rejected {
                    status: 404,
                    message: format!("no student {remote_id}"),
                });
            }
            let updated = Student {
                id: Some(remote_id),
                ..student.clone()
            };
            state.students.insert(remote_id, updated.clone());
            Ok(updated)
        }

        async fn delete_student(&self, remote_id: i64) -> Result<(), RemoteError> {
            self.gate(None)?;
            let mut state = self.state.lock().unwrap();
            state
                .students
                .remove(&remote_id)
                .map(|_| ())
                .ok_or(RemoteError::Rejected {
                    status: 404,
                    message: format!("no student {remote_id}"),
                })
        }
    }
}
