use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::domain::hash::ContentHash;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    #[error("{} already holds content hashing to {found}, expected {expected}", .path.display())]
    HashCollision {
        path: PathBuf,
        expected: ContentHash,
        found: ContentHash,
    },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StorageError {
    /// True when another connection holds a conflicting lock, so the whole
    /// transaction may succeed if run again.
    pub fn is_conflict(&self) -> bool {
        match self {
            StorageError::Database(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}
