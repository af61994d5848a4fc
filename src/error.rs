use thiserror::Error;

/// Failures talking to the remote authority.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// No connectivity, DNS/transport failure, or request timeout.
    #[error("remote service unreachable: {0}")]
    Unreachable(String),
    /// The authority answered with an application-level error.
    #[error("remote service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { status: 404, .. })
    }
}

/// Failures of the local persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("local store failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("local store mutex poisoned")]
    LockPoisoned,
}
