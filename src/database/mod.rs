pub mod models;
pub mod repositories;

use crate::config::CoursebookPaths;
use crate::error::StoreError;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub(crate) const MIGRATIONS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS students (
        local_id INTEGER PRIMARY KEY AUTOINCREMENT,
        remote_id INTEGER,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        course_id INTEGER NOT NULL,
        sync_state TEXT NOT NULL DEFAULT 'synced'
    );

    CREATE INDEX IF NOT EXISTS idx_students_course ON students(course_id);
    CREATE INDEX IF NOT EXISTS idx_students_remote ON students(remote_id);
"#;

/// Handle over the single SQLite connection. The mutex serializes the whole
/// write path, which is the per-record serialization the sync and mutation
/// layers rely on.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn connect(paths: &CoursebookPaths) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&paths.data_dir)?;
        let conn = Connection::open(&paths.db_path)?;
        let db = Self::from_connection(conn);
        db.ensure_migrations()?;
        Ok(db)
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn ensure_migrations(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATIONS)?;
            Ok(())
        })
    }

    pub fn with_repositories<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T, StoreError>,
    {
        self.with_conn(|conn| {
            let repos = repositories::SqliteRepositories::new(conn);
            f(repos)
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let guard = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&guard)
    }
}

#[cfg(test)]
pub(crate) fn open_in_memory() -> Database {
    let conn = Connection::open_in_memory().expect("in-memory db");
    let db = Database::from_connection(conn);
    db.ensure_migrations().expect("migrations");
    db
}
