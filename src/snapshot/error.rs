//! Snapshot log error types

use std::path::PathBuf;

use thiserror::Error;

use crate::error::ErrorKind;
use crate::snapshot::types::SnapshotId;

/// the main error type for snapshot log operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// the snapshot is not part of the current history
    #[error("unknown snapshot: {0}")]
    UnknownSnapshot(SnapshotId),

    /// repo is not initialized
    #[error("snapshot log not initialized: {0}")]
    NotInitialized(PathBuf),

    /// no snapshot has been captured yet
    #[error("snapshot log is empty: no snapshots found")]
    EmptyLog,

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl SnapshotError {
    /// check if this error indicates the snapshot doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, SnapshotError::UnknownSnapshot(_))
    }

    /// every snapshot failure is a storage failure to the layers above
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StorageFailure
    }
}

/// result type alias for snapshot log operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;
