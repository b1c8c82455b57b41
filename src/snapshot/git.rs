//!   Git-backed snapshot log.
//!
//!  The data directory doubles as the git work tree. Every capture stages the
//!  whole directory and commits it on `main`; a revert hard-resets `main` and
//!  the work tree to an earlier commit, discarding everything after it.

use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{Repository, RepositoryInitOptions, ResetType};
use parking_lot::Mutex;
use tracing::debug;

use crate::snapshot::commit::{self, SnapshotCommit};
use crate::snapshot::error::{SnapshotError, SnapshotResult};
use crate::snapshot::log::SnapshotLog;
use crate::snapshot::refs::{RefManager, MAIN_BRANCH};
use crate::snapshot::types::{CommitId, GitSignature, SnapshotId, SnapshotInfo, TreeId};

/// The git snapshot log.
///
/// `git2::Repository` is not `Sync`, so access goes through a mutex.
pub struct GitSnapshotLog {
    repo: Mutex<Repository>,
    path: PathBuf,
    signature: GitSignature,
}

impl GitSnapshotLog {
    /// Open an existing log.
    pub fn open(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| SnapshotError::NotInitialized(path.to_path_buf()))?;

        Ok(Self {
            repo: Mutex::new(repo),
            path: path.to_path_buf(),
            signature: GitSignature::snapstore(),
        })
    }

    /// Initialize a new log in `path`, adopting any files already there.
    pub fn init(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        let path = path.as_ref();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(MAIN_BRANCH);
        let repo = Repository::init_opts(path, &opts)?;

        RefManager::init_main_branch(&repo)?;
        let signature = GitSignature::snapstore();
        let root = commit::create_initial_commit(&repo, &signature)?;
        debug!(snapshot = %root, path = %path.display(), "initialized git snapshot log");

        Ok(Self {
            repo: Mutex::new(repo),
            path: path.to_path_buf(),
            signature,
        })
    }

    /// Open or initialize a log.
    pub fn open_or_init(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    /// Set the signature for commits.
    pub fn with_signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_repo<F, T>(&self, f: F) -> SnapshotResult<T>
    where
        F: FnOnce(&Repository) -> SnapshotResult<T>,
    {
        let repo = self.repo.lock();
        f(&repo)
    }

    fn append(
        &self,
        repo: &Repository,
        tree: TreeId,
        parent: CommitId,
        description: &str,
    ) -> SnapshotResult<CommitId> {
        SnapshotCommit {
            tree,
            parent: Some(parent),
            message: description,
        }
        .append(repo, &self.signature)
    }
}

impl SnapshotLog for GitSnapshotLog {
    fn capture(&self, description: &str) -> SnapshotResult<SnapshotId> {
        self.with_repo(|repo| {
            let head = RefManager::head_commit(repo)?;
            let tree_id = commit::stage_work_tree(repo)?;

            if commit::tree_of(repo, head)? == tree_id {
                debug!(description, "nothing to capture");
                return Ok(head.into());
            }

            let id = self.append(repo, tree_id, head, description)?;
            debug!(snapshot = %id, description, "captured snapshot");
            Ok(id.into())
        })
    }

    fn mark(&self, description: &str) -> SnapshotResult<SnapshotId> {
        self.with_repo(|repo| {
            let head = RefManager::head_commit(repo)?;
            let tree_id = commit::tree_of(repo, head)?;
            let id = self.append(repo, tree_id, head, description)?;
            debug!(snapshot = %id, description, "recorded marker snapshot");
            Ok(id.into())
        })
    }

    fn revert(&self, id: &SnapshotId) -> SnapshotResult<()> {
        self.with_repo(|repo| {
            let unknown = || SnapshotError::UnknownSnapshot(id.clone());
            let target = CommitId::from_snapshot(id).ok_or_else(|| unknown())?;
            let commit = repo.find_commit(target.raw()).map_err(|_| unknown())?;

            let head = RefManager::head_commit(repo)?;
            if !RefManager::is_in_history(repo, head, target)? {
                return Err(unknown());
            }

            let mut checkout = CheckoutBuilder::new();
            checkout.force().remove_untracked(true);
            repo.reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))?;
            debug!(snapshot = %target, from = %head, "reverted snapshot log");
            Ok(())
        })
    }

    fn history(&self, limit: Option<usize>) -> SnapshotResult<Vec<SnapshotInfo>> {
        self.with_repo(|repo| {
            let head = RefManager::head_commit(repo)?;
            commit::first_parent_history(repo, head, limit)
        })
    }

    fn head(&self) -> SnapshotResult<SnapshotId> {
        self.with_repo(|repo| RefManager::head_commit(repo).map(SnapshotId::from))
    }

    fn backend_name(&self) -> &'static str {
        "git"
    }
}

impl std::fmt::Debug for GitSnapshotLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitSnapshotLog")
            .field("path", &self.path)
            .field("signature", &self.signature)
            .finish()
    }
}
