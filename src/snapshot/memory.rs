//! In-memory snapshot log.
//!
//! Keeps a full copy of the data files for every snapshot. Nothing survives
//! the process, which makes it the backend of choice for tests and scratch
//! sessions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::fsio;
use crate::snapshot::commit::INITIAL_MESSAGE;
use crate::snapshot::error::{SnapshotError, SnapshotResult};
use crate::snapshot::log::SnapshotLog;
use crate::snapshot::types::{SnapshotId, SnapshotInfo};

type Image = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
struct MemorySnapshot {
    id: SnapshotId,
    description: String,
    timestamp: DateTime<Utc>,
    files: Image,
}

impl MemorySnapshot {
    fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            id: self.id.clone(),
            description: self.description.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// oldest first
    snapshots: Vec<MemorySnapshot>,
    next_seq: u64,
}

impl MemoryState {
    fn push(&mut self, description: &str, files: Image) -> SnapshotId {
        self.next_seq += 1;
        let id = SnapshotId::new(format!("{:016x}", self.next_seq));
        self.snapshots.push(MemorySnapshot {
            id: id.clone(),
            description: description.to_string(),
            timestamp: Utc::now(),
            files,
        });
        id
    }

    fn head(&self) -> SnapshotResult<&MemorySnapshot> {
        self.snapshots.last().ok_or(SnapshotError::EmptyLog)
    }
}

/// Snapshot log that keeps every snapshot's files in memory.
#[derive(Debug)]
pub struct MemorySnapshotLog {
    dir: PathBuf,
    state: Mutex<MemoryState>,
}

impl MemorySnapshotLog {
    /// Start a log over `dir`, taking the current contents as the root snapshot.
    pub fn open(dir: impl AsRef<Path>) -> SnapshotResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(SnapshotError::NotInitialized(dir));
        }

        let mut state = MemoryState::default();
        let root = state.push(INITIAL_MESSAGE, fsio::read_image(&dir)?);
        debug!(snapshot = %root, path = %dir.display(), "initialized memory snapshot log");

        Ok(Self {
            dir,
            state: Mutex::new(state),
        })
    }

    /// Get the data directory path.
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotLog for MemorySnapshotLog {
    fn capture(&self, description: &str) -> SnapshotResult<SnapshotId> {
        let image = fsio::read_image(&self.dir)?;
        let mut state = self.state.lock();

        let head = state.head()?;
        if head.files == image {
            debug!(description, "nothing to capture");
            return Ok(head.id.clone());
        }

        let id = state.push(description, image);
        debug!(snapshot = %id, description, "captured snapshot");
        Ok(id)
    }

    fn mark(&self, description: &str) -> SnapshotResult<SnapshotId> {
        let mut state = self.state.lock();
        let files = state.head()?.files.clone();
        let id = state.push(description, files);
        debug!(snapshot = %id, description, "recorded marker snapshot");
        Ok(id)
    }

    fn revert(&self, id: &SnapshotId) -> SnapshotResult<()> {
        let mut state = self.state.lock();
        let position = state
            .snapshots
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| SnapshotError::UnknownSnapshot(id.clone()))?;

        fsio::write_image(&self.dir, &state.snapshots[position].files)?;
        let dropped = state.snapshots.len() - position - 1;
        state.snapshots.truncate(position + 1);
        debug!(snapshot = %id, dropped, "reverted snapshot log");
        Ok(())
    }

    fn history(&self, limit: Option<usize>) -> SnapshotResult<Vec<SnapshotInfo>> {
        let state = self.state.lock();
        let newest_first = state.snapshots.iter().rev().map(MemorySnapshot::info);
        Ok(match limit {
            Some(n) => newest_first.take(n).collect(),
            None => newest_first.collect(),
        })
    }

    fn head(&self) -> SnapshotResult<SnapshotId> {
        Ok(self.state.lock().head()?.id.clone())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
