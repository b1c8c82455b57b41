//! Collection store error types
//!
//! We use `thiserror` for ergonomic error definition and better error messages

use thiserror::Error;

use crate::error::ErrorKind;
use crate::snapshot::SnapshotError;
use crate::store::types::{CollectionName, InvalidNameError, RecordId};

/// the main error type for collection store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// the requested record was not found
    #[error("record not found: collection={collection}, id={id}")]
    RecordNotFound { collection: CollectionName, id: RecordId },

    /// a record with the caller-supplied id already exists
    #[error("record already exists: collection={collection}, id={id}")]
    RecordAlreadyExists { collection: CollectionName, id: RecordId },

    /// invalid collection name or record id
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// the record payload is not usable
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// the snapshot log failed
    #[error("snapshot log error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl StoreError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::RecordNotFound { .. })
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::RecordAlreadyExists { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::RecordNotFound { .. } => ErrorKind::NotFound,
            StoreError::RecordAlreadyExists { .. }
            | StoreError::InvalidName(_)
            | StoreError::InvalidRecord(_) => ErrorKind::InvalidInput,
            StoreError::Serialization(_) | StoreError::Io(_) | StoreError::Snapshot(_) => {
                ErrorKind::StorageFailure
            }
        }
    }
}

/// result type alias for collection store operations
pub type StoreResult<T> = Result<T, StoreError>;
