use super::models::{NewStudentRecord, StudentRecord, SyncState};
use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Store contract for cached student records. All operations are local and
/// durable before they return; none of them touch the network.
pub trait StudentRepository {
    /// Inserts a new record and returns the store-assigned `local_id`.
    fn insert(&self, record: &NewStudentRecord) -> Result<i64, StoreError>;
    /// Insert-or-replace keyed by `local_id`. Replaying the same record is a
    /// no-op beyond the overwrite.
    fn upsert(&self, record: &StudentRecord) -> Result<(), StoreError>;
    fn get(&self, local_id: i64) -> Result<Option<StudentRecord>, StoreError>;
    fn get_by_remote_id(&self, remote_id: i64) -> Result<Option<StudentRecord>, StoreError>;
    /// Non-tombstoned records for a course; order unspecified.
    fn list_for_course(&self, course_id: i64) -> Result<Vec<StudentRecord>, StoreError>;
    /// Hard removal.
    fn delete(&self, local_id: i64) -> Result<(), StoreError>;
    fn list_unsynced(&self) -> Result<Vec<StudentRecord>, StoreError>;
    fn list_pending_add(&self) -> Result<Vec<StudentRecord>, StoreError>;
    fn list_pending_update(&self) -> Result<Vec<StudentRecord>, StoreError>;
    fn list_pending_delete(&self) -> Result<Vec<StudentRecord>, StoreError>;
    /// Clears every pending intent for the record.
    fn mark_synced(&self, local_id: i64) -> Result<(), StoreError>;
    fn set_remote_id(&self, local_id: i64, remote_id: i64) -> Result<(), StoreError>;
}

pub struct SqliteRepositories<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn students(&self) -> impl StudentRepository + '_ {
        SqliteStudentRepository { conn: self.conn }
    }
}

struct SqliteStudentRepository<'conn> {
    conn: &'conn Connection,
}

const STUDENT_COLUMNS: &str = "local_id, remote_id, name, email, phone, course_id, sync_state";

fn map_student_row(row: &Row<'_>) -> rusqlite::Result<StudentRecord> {
    let raw_state: String = row.get(6)?;
    let state = SyncState::parse(&raw_state).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown sync_state: {raw_state}").into(),
        )
    })?;
    Ok(StudentRecord {
        local_id: row.get(0)?,
        remote_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        course_id: row.get(5)?,
        state,
    })
}

impl<'conn> SqliteStudentRepository<'conn> {
    fn list_by_state(&self, state: SyncState) -> Result<Vec<StudentRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE sync_state = ?1"
        ))?;
        let rows = stmt.query_map(params![state.as_str()], map_student_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

impl<'conn> StudentRepository for SqliteStudentRepository<'conn> {
    fn insert(&self, record: &NewStudentRecord) -> Result<i64, StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO students (remote_id, name, email, phone, course_id, sync_state)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.remote_id,
                record.name,
                record.email,
                record.phone,
                record.course_id,
                record.state.as_str()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn upsert(&self, record: &StudentRecord) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO students (local_id, remote_id, name, email, phone, course_id, sync_state)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(local_id) DO UPDATE SET
                remote_id = excluded.remote_id,
                name = excluded.name,
                email = excluded.email,
                phone = excluded.phone,
                course_id = excluded.course_id,
                sync_state = excluded.sync_state
            "#,
            params![
                record.local_id,
                record.remote_id,
                record.name,
                record.email,
                record.phone,
                record.course_id,
                record.state.as_str()
            ],
        )?;
        Ok(())
    }

    fn get(&self, local_id: i64) -> Result<Option<StudentRecord>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE local_id = ?1"),
                params![local_id],
                map_student_row,
            )
            .optional()?)
    }

    fn get_by_remote_id(&self, remote_id: i64) -> Result<Option<StudentRecord>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE remote_id = ?1"),
                params![remote_id],
                map_student_row,
            )
            .optional()?)
    }

    fn list_for_course(&self, course_id: i64) -> Result<Vec<StudentRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE course_id = ?1 AND sync_state != ?2"
        ))?;
        let rows = stmt.query_map(
            params![course_id, SyncState::PendingDelete.as_str()],
            map_student_row,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn delete(&self, local_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM students WHERE local_id = ?1", params![local_id])?;
        Ok(())
    }

    fn list_unsynced(&self) -> Result<Vec<StudentRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE sync_state != ?1"
        ))?;
        let rows = stmt.query_map(params![SyncState::Synced.as_str()], map_student_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn list_pending_add(&self) -> Result<Vec<StudentRecord>, StoreError> {
        self.list_by_state(SyncState::PendingAdd)
    }

    fn list_pending_update(&self) -> Result<Vec<StudentRecord>, StoreError> {
        self.list_by_state(SyncState::PendingUpdate)
    }

    fn list_pending_delete(&self) -> Result<Vec<StudentRecord>, StoreError> {
        self.list_by_state(SyncState::PendingDelete)
    }

    fn mark_synced(&self, local_id: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE students SET sync_state = ?1 WHERE local_id = ?2",
            params![SyncState::Synced.as_str(), local_id],
        )?;
        Ok(())
    }

    fn set_remote_id(&self, local_id: i64, remote_id: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE students SET remote_id = ?1 WHERE local_id = ?2",
            params![remote_id, local_id],
        )?;
        Ok(())
    }
}
