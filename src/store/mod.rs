//! collection store for SnapStore
//!
//! collections are JSON arrays of records, one file per collection, next to a
//! `_metadata.json` summary. The upper layers (transaction coordinator,
//! database facade) use this API and never touch the files or the snapshot
//! log directly.
//!
//!  # Layout
//!
//! ```text
//! data/
//! ├── .git/              (git backend only)
//! ├── _metadata.json     per-collection counts + total
//! ├── orders.json        [ {record}, {record}, ... ]
//! └── users.json
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use snapstore::snapshot::GitSnapshotLog;
//! use snapstore::store::{CollectionName, CollectionStore};
//!
//! let log = GitSnapshotLog::open_or_init("./data")?;
//! let store = CollectionStore::new("./data", Box::new(log))?;
//!
//! let users = CollectionName::new("users")?;
//! let alice = store.create(&users, json!({"name": "Alice"}), None)?;
//! let alice = store.update(&users, &alice.id, json!({"age": 31}), None)?;
//! ```

mod collection;
mod error;
mod message;
mod metadata;
mod record;
mod types;

pub use collection::{CollectionStore, StoreOptions, StoreStatistics};
pub use error::{StoreError, StoreResult};
pub use message::SnapshotMessage;
pub use metadata::{CollectionMetadata, Metadata, METADATA_FILE};
pub use record::{Fields, Record, RESERVED_FIELDS};
pub use types::{CollectionName, InvalidNameError, RecordId};
