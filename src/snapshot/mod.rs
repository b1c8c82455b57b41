//! snapshot log for SnapStore
//!
//! a snapshot log records immutable versions of the data directory. The
//! collection store writes its files, then asks the log to capture them;
//! reverting restores the directory to an earlier version and forgets
//! everything after it.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SnapshotLog (trait)                        │
//! │      capture / mark / revert / history / head               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              │                               │
//!              ▼                               ▼
//!      ┌───────────────┐               ┌───────────────┐
//!      │GitSnapshotLog │               │MemorySnapshot │
//!      │ (one commit   │               │     Log       │
//!      │  per capture) │               │ (file images) │
//!      └───────────────┘               └───────────────┘
//!         │         │
//!         ▼         ▼
//!   ┌──────────┐ ┌──────────┐
//!   │  commit  │ │   refs   │
//!   │(history) │ │  (main)  │
//!   └──────────┘ └──────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use snapstore::snapshot::{GitSnapshotLog, SnapshotLog};
//!
//! let log = GitSnapshotLog::open_or_init("./data")?;
//! let before = log.head()?;
//!
//! std::fs::write("./data/users.json", b"[]")?;
//! log.capture("[CREATE] users/01j...")?;
//!
//! log.revert(&before)?;
//! ```

mod commit;
mod error;
mod git;
mod log;
mod memory;
mod refs;
mod types;

pub use commit::INITIAL_MESSAGE;
pub use error::{SnapshotError, SnapshotResult};
pub use git::GitSnapshotLog;
pub use log::SnapshotLog;
pub use memory::MemorySnapshotLog;
pub use types::{CommitId, GitSignature, SnapshotId, SnapshotInfo};
