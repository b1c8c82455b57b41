//!  Branch and reference management.
//!
//!  The git snapshot log keeps exactly one branch, `main`, whose tip is the
//!  head snapshot. This module handles:
//! - Main branch initialization
//! - Head resolution
//! - Reachability checks used to validate revert targets

use git2::Repository;

use crate::snapshot::error::{SnapshotError, SnapshotResult};
use crate::snapshot::types::CommitId;

/// the only branch the snapshot log writes to
pub const MAIN_BRANCH: &str = "main";

/// full ref path of the main branch
pub fn main_ref_path() -> String {
    format!("refs/heads/{}", MAIN_BRANCH)
}

/// Manages Git references.
pub struct RefManager;

impl RefManager {
    /// Get the current HEAD commit (tip of main).
    pub fn head_commit(repo: &Repository) -> SnapshotResult<CommitId> {
        let head = repo.head().map_err(|e| {
            if e.code() == git2::ErrorCode::UnbornBranch {
                SnapshotError::EmptyLog
            } else {
                SnapshotError::Git(e)
            }
        })?;

        let commit = head.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }

    /// Check whether `candidate` is the head or one of its ancestors.
    ///
    /// Snapshots discarded by an earlier revert still exist as git objects
    /// but are no longer part of the history, so they don't count.
    pub fn is_in_history(repo: &Repository, head: CommitId, candidate: CommitId) -> SnapshotResult<bool> {
        if head == candidate {
            return Ok(true);
        }
        Ok(repo.graph_descendant_of(head.raw(), candidate.raw())?)
    }

    /// Make HEAD point at main, whether or not main has a commit yet.
    ///
    /// Called right after `git init`, before the initial commit.
    pub fn init_main_branch(repo: &Repository) -> SnapshotResult<()> {
        repo.set_head(&main_ref_path())?;
        Ok(())
    }
}
