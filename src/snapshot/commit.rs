//! Commit plumbing for the git snapshot log.
//!
//! Every snapshot is one commit whose only parent is the previous head, so
//! the history is a single first-parent chain on `main`. A mark reuses the
//! head's tree under a new message.

use chrono::{TimeZone, Utc};
use git2::{Repository, Sort};

use crate::snapshot::error::{SnapshotError, SnapshotResult};
use crate::snapshot::types::{CommitId, GitSignature, SnapshotInfo, TreeId};

/// message of the root commit created by `init`
pub const INITIAL_MESSAGE: &str = "[snapstore] Initialize data directory";

/// A commit about to be written.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotCommit<'a> {
    pub tree: TreeId,
    /// `None` only for the root snapshot
    pub parent: Option<CommitId>,
    pub message: &'a str,
}

impl SnapshotCommit<'_> {
    /// Write the commit and advance HEAD to it.
    pub fn append(&self, repo: &Repository, signature: &GitSignature) -> SnapshotResult<CommitId> {
        self.write(repo, signature, Some("HEAD"))
    }

    /// Write the commit without moving any ref.
    #[cfg(test)]
    pub(crate) fn write_detached(&self, repo: &Repository, signature: &GitSignature) -> SnapshotResult<CommitId> {
        self.write(repo, signature, None)
    }

    fn write(
        &self,
        repo: &Repository,
        signature: &GitSignature,
        update_ref: Option<&str>,
    ) -> SnapshotResult<CommitId> {
        let tree = repo.find_tree(self.tree.raw())?;
        let sig = signature.to_git2_signature()?;
        let parent = self
            .parent
            .map(|id| repo.find_commit(id.raw()))
            .transpose()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = repo.commit(update_ref, &sig, &sig, self.message, &tree, &parents)?;
        Ok(CommitId::new(oid))
    }
}

/// Tree recorded by a commit.
pub fn tree_of(repo: &Repository, id: CommitId) -> SnapshotResult<TreeId> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| SnapshotError::UnknownSnapshot(id.into()))?;
    Ok(TreeId::new(commit.tree_id()))
}

/// Stage every change in the work tree, deletions included, and write
/// the index out as a tree.
pub fn stage_work_tree(repo: &Repository) -> SnapshotResult<TreeId> {
    let mut index = repo.index()?;
    index.add_all(["*"], git2::IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"], None)?;
    index.write()?;
    Ok(TreeId::new(index.write_tree()?))
}

/// Create the root snapshot from whatever the work tree already holds.
pub fn create_initial_commit(repo: &Repository, signature: &GitSignature) -> SnapshotResult<CommitId> {
    SnapshotCommit {
        tree: stage_work_tree(repo)?,
        parent: None,
        message: INITIAL_MESSAGE,
    }
    .append(repo, signature)
}

/// Walk the first-parent chain from `head`, newest first.
pub fn first_parent_history(
    repo: &Repository,
    head: CommitId,
    limit: Option<usize>,
) -> SnapshotResult<Vec<SnapshotInfo>> {
    let mut revwalk = repo.revwalk()?;
    revwalk.push(head.raw())?;
    revwalk.set_sorting(Sort::TOPOLOGICAL)?;
    revwalk.simplify_first_parent()?;

    revwalk
        .take(limit.unwrap_or(usize::MAX))
        .map(|oid| -> SnapshotResult<SnapshotInfo> {
            let commit = repo.find_commit(oid?)?;
            Ok(snapshot_info(&commit))
        })
        .collect()
}

fn snapshot_info(commit: &git2::Commit<'_>) -> SnapshotInfo {
    let timestamp = Utc
        .timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_else(Utc::now);
    let message = commit.message().unwrap_or("");

    SnapshotInfo {
        id: CommitId::new(commit.id()).into(),
        description: message.lines().next().unwrap_or("").to_string(),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::types::SnapshotId;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn append(repo: &Repository, parent: CommitId, message: &str) -> CommitId {
        SnapshotCommit {
            tree: tree_of(repo, parent).unwrap(),
            parent: Some(parent),
            message,
        }
        .append(repo, &GitSignature::snapstore())
        .unwrap()
    }

    #[test]
    fn test_initial_commit() {
        let (_dir, repo) = setup_repo();
        let root = create_initial_commit(&repo, &GitSignature::snapstore()).unwrap();

        let commit = repo.find_commit(root.raw()).unwrap();
        assert_eq!(commit.parent_count(), 0);
        assert_eq!(commit.summary(), Some(INITIAL_MESSAGE));
        assert_eq!(repo.head().unwrap().target(), Some(root.raw()));
    }

    #[test]
    fn test_initial_commit_adopts_existing_files() {
        let (dir, repo) = setup_repo();
        std::fs::write(dir.path().join("users.json"), b"[]").unwrap();

        let root = create_initial_commit(&repo, &GitSignature::snapstore()).unwrap();
        let tree = repo.find_tree(tree_of(&repo, root).unwrap().raw()).unwrap();
        assert!(tree.get_name("users.json").is_some());
    }

    #[test]
    fn test_first_parent_history() {
        let (_dir, repo) = setup_repo();
        let c1 = create_initial_commit(&repo, &GitSignature::snapstore()).unwrap();
        let c2 = append(&repo, c1, "Second");
        let c3 = append(&repo, c2, "Third\n\nbody text");

        let history = first_parent_history(&repo, c3, None).unwrap();
        let ids: Vec<SnapshotId> = history.iter().map(|s| s.id.clone()).collect();
        let expected: Vec<SnapshotId> = vec![c3.into(), c2.into(), c1.into()];
        assert_eq!(ids, expected);
        assert_eq!(history[0].description, "Third");

        let limited = first_parent_history(&repo, c3, Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].description, "Second");
    }

    #[test]
    fn test_detached_commit_leaves_head() {
        let (_dir, repo) = setup_repo();
        let root = create_initial_commit(&repo, &GitSignature::snapstore()).unwrap();

        let detached = SnapshotCommit {
            tree: tree_of(&repo, root).unwrap(),
            parent: Some(root),
            message: "side",
        }
        .write_detached(&repo, &GitSignature::snapstore())
        .unwrap();

        assert_ne!(detached, root);
        assert_eq!(repo.head().unwrap().target(), Some(root.raw()));
    }
}
