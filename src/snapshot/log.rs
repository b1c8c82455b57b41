//! The contract every snapshot backend implements.

use crate::snapshot::error::SnapshotResult;
use crate::snapshot::types::{SnapshotId, SnapshotInfo};

/// An append-only sequence of immutable snapshots of one data directory.
///
/// The log captures whatever the data directory currently holds; the
/// collection store is responsible for having written its files first.
/// Implementations must be safe to share across threads. Callers serialize
/// mutating calls themselves (the store holds one lock around
/// write + capture).
pub trait SnapshotLog: Send + Sync {
    /// Capture the current data directory.
    ///
    /// When nothing changed since the head snapshot this is a no-op that
    /// returns the head id.
    fn capture(&self, description: &str) -> SnapshotResult<SnapshotId>;

    /// Record a descriptive snapshot even if nothing changed.
    fn mark(&self, description: &str) -> SnapshotResult<SnapshotId>;

    /// Restore the data directory to `id` and drop every later snapshot.
    ///
    /// Fails with `UnknownSnapshot` if `id` is not in the current history.
    fn revert(&self, id: &SnapshotId) -> SnapshotResult<()>;

    /// Snapshots, most recent first.
    fn history(&self, limit: Option<usize>) -> SnapshotResult<Vec<SnapshotInfo>>;

    /// The current tip.
    fn head(&self) -> SnapshotResult<SnapshotId>;

    /// Short backend name for diagnostics.
    fn backend_name(&self) -> &'static str;
}
