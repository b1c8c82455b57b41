//! core identifiers for the snapshot log.

use std::fmt;

use chrono::{DateTime, Utc};
use git2::Oid;
use serde::{Deserialize, Serialize};

/// Opaque token naming one captured snapshot.
///
/// Minted by a [`SnapshotLog`](crate::snapshot::SnapshotLog) and only ever
/// handed back to the same log. Callers must not parse it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// wrap a backend-specific token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// short form for display (first 7 chars, like git)
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(7).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SnapshotId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<CommitId> for SnapshotId {
    fn from(id: CommitId) -> Self {
        Self(id.0.to_string())
    }
}

/// One entry of the snapshot history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Git commit identifier.
///
/// The inner Oid is only accessible within the snapshot module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse a CommitId from a snapshot token
    pub fn from_snapshot(id: &SnapshotId) -> Option<Self> {
        Oid::from_str(id.as_str()).ok().map(CommitId)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

/// git signature (author/committer info)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// default signature for snapstore commits
    pub fn snapstore() -> Self {
        Self::new("SnapStore", "snapstore@localhost")
    }

    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::snapstore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_id_short() {
        let id = SnapshotId::new("0123456789abcdef");
        assert_eq!(id.short(), "0123456");

        let tiny = SnapshotId::new("abc");
        assert_eq!(tiny.short(), "abc");
    }

    #[test]
    fn test_commit_id_from_snapshot() {
        let oid = Oid::from_str("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap();
        let snapshot = SnapshotId::from(CommitId::new(oid));
        assert_eq!(CommitId::from_snapshot(&snapshot), Some(CommitId::new(oid)));
        assert_eq!(CommitId::from_snapshot(&SnapshotId::new("not-a-commit")), None);
    }
}
