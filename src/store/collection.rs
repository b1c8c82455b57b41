//! The collection store.
//!
//! This is the central component of the data layer. It owns the collection
//! files and `_metadata.json` in the data directory and drives the snapshot
//! log so that every mutation becomes exactly one snapshot.
//!
//! All reads and writes go through one mutex. A mutation holds it across
//! read → apply → persist → metadata → capture; if persisting or capturing
//! fails, the directory is reverted to the snapshot it started from.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::fsio;
use crate::snapshot::{SnapshotId, SnapshotInfo, SnapshotLog};
use crate::store::error::{StoreError, StoreResult};
use crate::store::message::SnapshotMessage;
use crate::store::metadata::{Metadata, METADATA_FILE};
use crate::store::record::{self, Record};
use crate::store::types::{CollectionName, RecordId};

/// Store tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// how many snapshot descriptions `statistics` reports
    pub recent_snapshots: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { recent_snapshots: 10 }
    }
}

/// The collection store.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct CollectionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    dir: PathBuf,
    log: Box<dyn SnapshotLog>,
    options: StoreOptions,
    /// the global store lock
    lock: Mutex<()>,
}

impl CollectionStore {
    /// Create a store over `dir`, which `log` must already be tracking.
    pub fn new(dir: impl AsRef<Path>, log: Box<dyn SnapshotLog>) -> StoreResult<Self> {
        Self::with_options(dir, log, StoreOptions::default())
    }

    pub fn with_options(
        dir: impl AsRef<Path>,
        log: Box<dyn SnapshotLog>,
        options: StoreOptions,
    ) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("data directory {} does not exist", dir.display()),
            )));
        }

        Ok(Self {
            inner: Arc::new(StoreInner {
                dir,
                log,
                options,
                lock: Mutex::new(()),
            }),
        })
    }

    /// Get the data directory path.
    pub fn path(&self) -> &Path {
        &self.inner.dir
    }

    /// Name of the snapshot backend.
    pub fn backend_name(&self) -> &'static str {
        self.inner.log.backend_name()
    }

    // ==================== Reads ====================

    /// All records of a collection in insertion order.
    ///
    /// An unknown collection is simply empty.
    pub fn list(&self, collection: &CollectionName) -> StoreResult<Vec<Record>> {
        let _guard = self.inner.lock.lock();
        self.load(collection)
    }

    /// Get one record.
    pub fn get(&self, collection: &CollectionName, id: &RecordId) -> StoreResult<Option<Record>> {
        let _guard = self.inner.lock.lock();
        Ok(self.load(collection)?.into_iter().find(|r| &r.id == id))
    }

    /// Collections present in the data directory, sorted by name.
    pub fn collections(&self) -> StoreResult<Vec<CollectionName>> {
        let _guard = self.inner.lock.lock();
        self.list_collections()
    }

    /// The persisted metadata.
    pub fn metadata(&self) -> StoreResult<Metadata> {
        let _guard = self.inner.lock.lock();
        self.load_metadata()
    }

    /// Metadata, recent snapshot descriptions and collection names.
    pub fn statistics(&self) -> StoreResult<StoreStatistics> {
        let _guard = self.inner.lock.lock();
        Ok(StoreStatistics {
            backend: self.inner.log.backend_name(),
            metadata: self.load_metadata()?,
            recent_snapshots: self
                .inner
                .log
                .history(Some(self.inner.options.recent_snapshots))?,
            collections: self.list_collections()?,
        })
    }

    // ==================== Mutations ====================

    /// Create a record from a JSON object.
    ///
    /// A string `id` in the payload is used as the record id and must not
    /// exist yet; otherwise a ULID is generated.
    pub fn create(
        &self,
        collection: &CollectionName,
        payload: Value,
        tx_id: Option<&str>,
    ) -> StoreResult<Record> {
        let (explicit_id, fields) = record::split_payload(payload)?;

        self.mutate(collection, |records| {
            let id = match explicit_id {
                Some(id) => {
                    if records.iter().any(|r| r.id == id) {
                        return Err(StoreError::RecordAlreadyExists {
                            collection: collection.clone(),
                            id,
                        });
                    }
                    id
                }
                None => {
                    let mut id = RecordId::generate();
                    while records.iter().any(|r| r.id == id) {
                        id = RecordId::generate();
                    }
                    id
                }
            };

            let record = Record::new(id, fields);
            records.push(record.clone());
            let description = SnapshotMessage::create(collection.as_str(), record.id.as_str(), tx_id);
            Ok((record, description))
        })
    }

    /// Shallow-merge a JSON object into an existing record.
    pub fn update(
        &self,
        collection: &CollectionName,
        id: &RecordId,
        payload: Value,
        tx_id: Option<&str>,
    ) -> StoreResult<Record> {
        let fields = record::update_fields(payload)?;

        self.mutate(collection, |records| {
            let record = records
                .iter_mut()
                .find(|r| &r.id == id)
                .ok_or_else(|| StoreError::RecordNotFound {
                    collection: collection.clone(),
                    id: id.clone(),
                })?;

            record.merge(fields);
            let description = SnapshotMessage::update(collection.as_str(), id.as_str(), tx_id);
            Ok((record.clone(), description))
        })
    }

    /// Remove a record, returning its last value.
    pub fn delete(
        &self,
        collection: &CollectionName,
        id: &RecordId,
        tx_id: Option<&str>,
    ) -> StoreResult<Record> {
        self.mutate(collection, |records| {
            let position = records
                .iter()
                .position(|r| &r.id == id)
                .ok_or_else(|| StoreError::RecordNotFound {
                    collection: collection.clone(),
                    id: id.clone(),
                })?;

            let removed = records.remove(position);
            let description = SnapshotMessage::delete(collection.as_str(), id.as_str(), tx_id);
            Ok((removed, description))
        })
    }

    // ==================== Snapshots ====================

    /// The current snapshot log head.
    pub fn head(&self) -> StoreResult<SnapshotId> {
        let _guard = self.inner.lock.lock();
        Ok(self.inner.log.head()?)
    }

    /// Snapshot history, most recent first.
    pub fn history(&self, limit: Option<usize>) -> StoreResult<Vec<SnapshotInfo>> {
        let _guard = self.inner.lock.lock();
        Ok(self.inner.log.history(limit)?)
    }

    /// Restore the data directory to an earlier snapshot.
    pub fn revert(&self, id: &SnapshotId) -> StoreResult<()> {
        let _guard = self.inner.lock.lock();
        self.inner.log.revert(id)?;
        debug!(snapshot = %id, "store reverted");
        Ok(())
    }

    /// Capture whatever the directory holds now.
    pub fn capture(&self, description: &str) -> StoreResult<SnapshotId> {
        let _guard = self.inner.lock.lock();
        Ok(self.inner.log.capture(description)?)
    }

    /// Record a descriptive snapshot even if nothing changed.
    pub fn mark(&self, description: &str) -> StoreResult<SnapshotId> {
        let _guard = self.inner.lock.lock();
        Ok(self.inner.log.mark(description)?)
    }

    // ==================== Internals ====================

    /// Run one mutation as a single locked, snapshot-producing unit.
    ///
    /// `apply` edits the loaded records and returns its result plus the
    /// snapshot description. Nothing is written if `apply` fails.
    fn mutate<T, F>(&self, collection: &CollectionName, apply: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Vec<Record>) -> StoreResult<(T, String)>,
    {
        let _guard = self.inner.lock.lock();
        let before = self.inner.log.head()?;

        let mut records = self.load(collection)?;
        let (result, description) = apply(&mut records)?;

        let persisted = self
            .persist(collection, &records)
            .and_then(|()| self.inner.log.capture(&description).map_err(StoreError::from));

        match persisted {
            Ok(snapshot) => {
                debug!(%collection, snapshot = %snapshot, description = %description, "mutation captured");
                Ok(result)
            }
            Err(err) => {
                self.restore(&before, &err);
                Err(err)
            }
        }
    }

    fn persist(&self, collection: &CollectionName, records: &[Record]) -> StoreResult<()> {
        let bytes = record::serialize_collection(records)?;
        fsio::write_atomic(&self.collection_path(collection), &bytes)?;

        let mut counts = Vec::new();
        for name in self.list_collections()? {
            let count = if &name == collection {
                records.len()
            } else {
                self.load(&name)?.len()
            };
            counts.push((name, count));
        }
        let metadata = Metadata::rebuild(&self.load_metadata()?, counts, collection, Utc::now());
        let mut bytes = serde_json::to_vec_pretty(&metadata)?;
        bytes.push(b'\n');
        fsio::write_atomic(&self.inner.dir.join(METADATA_FILE), &bytes)?;
        Ok(())
    }

    /// Put the directory back to `before` after a failed write or capture.
    fn restore(&self, before: &SnapshotId, cause: &StoreError) {
        match self.inner.log.revert(before) {
            Ok(()) => warn!(snapshot = %before, error = %cause, "mutation failed, store restored"),
            Err(e) => warn!(
                snapshot = %before,
                error = %cause,
                revert_error = %e,
                "mutation failed and the store could not be restored"
            ),
        }
    }

    fn collection_path(&self, collection: &CollectionName) -> PathBuf {
        self.inner.dir.join(collection.file_name())
    }

    fn load(&self, collection: &CollectionName) -> StoreResult<Vec<Record>> {
        match fsio::read_optional(&self.collection_path(collection))? {
            Some(bytes) => record::deserialize_collection(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn load_metadata(&self) -> StoreResult<Metadata> {
        match fsio::read_optional(&self.inner.dir.join(METADATA_FILE))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Metadata::default()),
        }
    }

    fn list_collections(&self) -> StoreResult<Vec<CollectionName>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.inner.dir)? {
            let path = entry?.path();
            if !fsio::is_data_file(&path) {
                continue;
            }
            if let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(CollectionName::from_file_name)
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

impl fmt::Debug for CollectionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionStore")
            .field("dir", &self.inner.dir)
            .field("backend", &self.inner.log.backend_name())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Statistics about the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatistics {
    pub backend: &'static str,
    pub metadata: Metadata,
    pub recent_snapshots: Vec<SnapshotInfo>,
    pub collections: Vec<CollectionName>,
}

impl fmt::Display for StoreStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Store Statistics ({} backend):", self.backend)?;
        writeln!(f, "  Collections: {}", self.collections.len())?;
        for name in &self.collections {
            writeln!(f, "    {}: {} records", name, self.metadata.count(name))?;
        }
        writeln!(f, "  Total Records: {}", self.metadata.total_records)?;
        writeln!(f, "  Recent Snapshots:")?;
        for snapshot in &self.recent_snapshots {
            writeln!(f, "    {} {}", snapshot.id.short(), snapshot.description)?;
        }
        Ok(())
    }
}
