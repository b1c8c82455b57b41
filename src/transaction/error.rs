//! Transaction error types.

use thiserror::Error;

use crate::error::ErrorKind;
use crate::store::{InvalidNameError, StoreError};

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Collection store error, passed through unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Transaction not found.
    #[error("transaction not found: {0}")]
    NotFound(String),

    /// Transaction was already committed or rolled back.
    #[error("transaction {tx_id} is no longer active (state: {state})")]
    NotActive { tx_id: String, state: String },

    /// The id names a transaction that is active or recently finished.
    #[error("transaction id already in use: {0}")]
    AlreadyExists(String),

    /// Another transaction is active; its rollback would undo this work too.
    #[error("{action} would overlap active transaction {active}")]
    ConflictRisk { action: String, active: String },

    /// Unrecognized operation kind.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Malformed operation arguments.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Malformed transaction id.
    #[error("invalid transaction id: {0}")]
    InvalidId(InvalidNameError),

    /// Internal error.
    #[error("internal transaction error: {0}")]
    Internal(String),
}

impl TransactionError {
    /// Check if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransactionError::ConflictRisk { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransactionError::Store(e) => e.kind(),
            TransactionError::NotFound(_) => ErrorKind::NotFound,
            TransactionError::NotActive { .. } | TransactionError::AlreadyExists(_) => {
                ErrorKind::InvalidState
            }
            TransactionError::ConflictRisk { .. } => ErrorKind::ConflictRisk,
            TransactionError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            TransactionError::InvalidOperation(_) | TransactionError::InvalidId(_) => {
                ErrorKind::InvalidInput
            }
            TransactionError::Internal(_) => ErrorKind::StorageFailure,
        }
    }
}
