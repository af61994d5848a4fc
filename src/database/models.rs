use serde::{Deserialize, Serialize};

/// Reconciliation state of a cached record. A single tagged value instead of
/// separate synced/pending flags, so contradictory combinations cannot be
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// The local copy matches the last known remote state.
    Synced,
    /// Created locally; the remote authority has never seen it.
    PendingAdd,
    /// Edited locally; the edit has not been confirmed remotely.
    PendingUpdate,
    /// Deleted locally; retained as a tombstone until the remote delete is
    /// confirmed.
    PendingDelete,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Synced => "synced",
            SyncState::PendingAdd => "pending_add",
            SyncState::PendingUpdate => "pending_update",
            SyncState::PendingDelete => "pending_delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "synced" => Some(SyncState::Synced),
            "pending_add" => Some(SyncState::PendingAdd),
            "pending_update" => Some(SyncState::PendingUpdate),
            "pending_delete" => Some(SyncState::PendingDelete),
            _ => None,
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced)
    }
}

/// Persisted form of a student. `local_id` is assigned by the store on
/// insert and never reused; `remote_id` stays empty until the remote
/// authority acknowledges the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRecord {
    pub local_id: i64,
    pub remote_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub course_id: i64,
    pub state: SyncState,
}

/// Insert form of a student, before the store has assigned a `local_id`.
#[derive(Debug, Clone)]
pub struct NewStudentRecord {
    pub remote_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub course_id: i64,
    pub state: SyncState,
}

impl StudentRecord {
    /// Wire/presentation form. The domain identity is the remote one once it
    /// exists.
    pub fn to_domain(&self) -> Student {
        Student {
            id: self.remote_id,
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            course_id: self.course_id,
        }
    }

    /// The same row with new scalar fields, keeping identity and state.
    pub fn with_fields(&self, student: &Student, state: SyncState) -> StudentRecord {
        StudentRecord {
            local_id: self.local_id,
            remote_id: self.remote_id,
            name: student.name.clone(),
            email: student.email.clone(),
            phone: student.phone.clone(),
            course_id: student.course_id,
            state,
        }
    }
}

/// Domain form of a student as exchanged with the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    /// Remote identity, present once the authority has assigned one.
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub course_id: i64,
}

impl Student {
    /// Cache entry for a locally created record the remote has never seen.
    pub fn as_pending_add(&self) -> NewStudentRecord {
        NewStudentRecord {
            remote_id: None,
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            course_id: self.course_id,
            state: SyncState::PendingAdd,
        }
    }

    /// Cache entry for a record fetched from the remote authority.
    pub fn as_synced_cache(&self) -> NewStudentRecord {
        NewStudentRecord {
            remote_id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            course_id: self.course_id,
            state: SyncState::Synced,
        }
    }
}

/// Parent record. Courses are fetched and mutated online only; the offline
/// cache covers students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Option<i64>,
    pub name: String,
    pub description: String,
    pub image: String,
    pub schedule: String,
    pub professor_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_state_round_trips_through_column_text() {
        for state in [
            SyncState::Synced,
            SyncState::PendingAdd,
            SyncState::PendingUpdate,
            SyncState::PendingDelete,
        ] {
            assert_eq!(SyncState::parse(state.as_str()), Some(state));
        }
        assert_eq!(SyncState::parse("bogus"), None);
    }

    #[test]
    fn pending_add_entry_has_no_remote_identity() {
        let student = Student {
            id: Some(7),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            phone: "555-0100".into(),
            course_id: 3,
        };
        let entry = student.as_pending_add();
        assert_eq!(entry.remote_id, None);
        assert_eq!(entry.state, SyncState::PendingAdd);

        let cached = student.as_synced_cache();
        assert_eq!(cached.remote_id, Some(7));
        assert_eq!(cached.state, SyncState::Synced);
    }
}
