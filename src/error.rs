//! Error classification shared by every layer.
//!
//! Each layer keeps its own `thiserror` enum; `ErrorKind` is the coarse
//! category a caller (CLI, HTTP adapter, test) switches on.

use std::fmt;

use serde::Serialize;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// unknown record, collection entry, transaction or snapshot
    NotFound,
    /// operation against a non-active transaction, or a reused id
    InvalidState,
    /// unrecognized operation kind
    UnsupportedOperation,
    /// persistence or snapshot-log failure
    StorageFailure,
    /// a second transaction would overlap an active one
    ConflictRisk,
    /// malformed names, ids or record payloads
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::UnsupportedOperation => "unsupported operation",
            ErrorKind::StorageFailure => "storage failure",
            ErrorKind::ConflictRisk => "conflict risk",
            ErrorKind::InvalidInput => "invalid input",
        };
        f.write_str(name)
    }
}
