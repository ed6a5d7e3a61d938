use std::path::PathBuf;

use thiserror::Error;

use crate::{domain::hash::ContentHash, storage::error::StorageError, tags::TagError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("upload rejected: {0}")]
    UnsupportedFormat(#[from] TagError),

    #[error("{} already holds content hashing to {found}, expected {expected}", .path.display())]
    HashCollision {
        path: PathBuf,
        expected: ContentHash,
        found: ContentHash,
    },

    #[error("gave up after {attempts} attempts conflicting with concurrent ingestions")]
    SerializationConflict { attempts: u32 },

    #[error(transparent)]
    Storage(StorageError),

    #[error("worker stopped before finishing the job")]
    WorkerLost,
}

impl IngestError {
    /// True when submitting the same upload again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IngestError::SerializationConflict { .. } | IngestError::WorkerLost
        )
    }
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::HashCollision {
                path,
                expected,
                found,
            } => IngestError::HashCollision {
                path,
                expected,
                found,
            },
            other => IngestError::Storage(other),
        }
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        IngestError::Storage(StorageError::Database(err))
    }
}
