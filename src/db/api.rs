//! Database API - high-level interface for SnapStore.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Duration;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::db::command::{Command, CommandOutput};
use crate::error::ErrorKind;
use crate::snapshot::{
    GitSignature, GitSnapshotLog, MemorySnapshotLog, SnapshotError, SnapshotId, SnapshotInfo,
    SnapshotLog,
};
use crate::store::{
    CollectionName, CollectionStore, Record, RecordId, StoreError, StoreOptions, StoreStatistics,
};
use crate::transaction::{
    CoordinatorOptions, Transaction, TransactionCoordinator, TransactionError, TransactionHandle,
    TransactionOutcome, TransactionResult, TransactionStatistics,
};

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("snapshot log error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("database not found: {0}")]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::Snapshot(e) => e.kind(),
            DatabaseError::Store(e) => e.kind(),
            DatabaseError::Transaction(e) => e.kind(),
            DatabaseError::InvalidCommand(_) => ErrorKind::InvalidInput,
            DatabaseError::NotFound(_) => ErrorKind::NotFound,
            DatabaseError::Io(_) => ErrorKind::StorageFailure,
        }
    }
}

/// Which snapshot log implementation backs the data directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotBackend {
    /// one git commit per snapshot, survives restarts
    #[default]
    Git,
    /// full directory images in process memory
    Memory,
}

impl SnapshotBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotBackend::Git => "git",
            SnapshotBackend::Memory => "memory",
        }
    }
}

impl fmt::Display for SnapshotBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotBackend {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "git" => Ok(SnapshotBackend::Git),
            "memory" | "mem" => Ok(SnapshotBackend::Memory),
            other => Err(DatabaseError::InvalidCommand(format!(
                "unknown snapshot backend: {}",
                other
            ))),
        }
    }
}

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the data directory.
    pub path: PathBuf,
    /// Create if doesn't exist.
    pub create_if_missing: bool,
    /// Snapshot log implementation.
    pub backend: SnapshotBackend,
    /// Age after which `tx cleanup` rolls a transaction back.
    pub stale_after: Duration,
    /// Snapshot descriptions reported by `stats`.
    pub recent_snapshots: usize,
    /// Finished transactions kept for `tx show`.
    pub finished_history: usize,
    /// Author of git snapshots.
    pub signature: GitSignature,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let coordinator = CoordinatorOptions::default();
        Self {
            path: PathBuf::from(".snapstore"),
            create_if_missing: true,
            backend: SnapshotBackend::default(),
            stale_after: coordinator.stale_after,
            recent_snapshots: StoreOptions::default().recent_snapshots,
            finished_history: coordinator.finished_history,
            signature: GitSignature::snapstore(),
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn backend(mut self, backend: SnapshotBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn stale_after(mut self, age: Duration) -> Self {
        self.stale_after = age;
        self
    }

    /// `stale_after` given in minutes, as typed by a user.
    pub fn stale_after_minutes(self, minutes: i64) -> DatabaseResult<Self> {
        Ok(self.stale_after(minutes_to_duration(minutes)?))
    }

    pub fn recent_snapshots(mut self, count: usize) -> Self {
        self.recent_snapshots = count;
        self
    }

    pub fn finished_history(mut self, count: usize) -> Self {
        self.finished_history = count;
        self
    }

    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }
}

/// The main database handle.
pub struct Database {
    config: DatabaseConfig,
    store: CollectionStore,
    coordinator: TransactionCoordinator,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        Self::open_with_config(DatabaseConfig::new(path.as_ref()))
    }

    /// Open or create a database with custom configuration.
    pub fn open_with_config(config: DatabaseConfig) -> DatabaseResult<Self> {
        let path = &config.path;
        if !path.exists() {
            if !config.create_if_missing {
                return Err(DatabaseError::NotFound(path.clone()));
            }
            std::fs::create_dir_all(path)?;
        }

        let log: Box<dyn SnapshotLog> = match config.backend {
            SnapshotBackend::Git => {
                let log = if config.create_if_missing {
                    GitSnapshotLog::open_or_init(path)?
                } else {
                    GitSnapshotLog::open(path)?
                };
                Box::new(log.with_signature(config.signature.clone()))
            }
            SnapshotBackend::Memory => Box::new(MemorySnapshotLog::open(path)?),
        };

        let store = CollectionStore::with_options(
            path,
            log,
            StoreOptions {
                recent_snapshots: config.recent_snapshots,
            },
        )?;
        let coordinator = TransactionCoordinator::with_options(
            store.clone(),
            CoordinatorOptions {
                stale_after: config.stale_after,
                finished_history: config.finished_history,
            },
        );

        info!(path = %path.display(), backend = %config.backend, "database opened");
        Ok(Self {
            config,
            store,
            coordinator,
        })
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Get the configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    // ==================== Records ====================

    pub fn list(&self, collection: &str) -> DatabaseResult<Vec<Record>> {
        Ok(self.store.list(&collection_name(collection)?)?)
    }

    pub fn get(&self, collection: &str, id: &str) -> DatabaseResult<Option<Record>> {
        Ok(self.store.get(&collection_name(collection)?, &record_id(id)?)?)
    }

    pub fn create(&self, collection: &str, payload: Value) -> DatabaseResult<Record> {
        Ok(self.store.create(&collection_name(collection)?, payload, None)?)
    }

    pub fn update(&self, collection: &str, id: &str, payload: Value) -> DatabaseResult<Record> {
        Ok(self
            .store
            .update(&collection_name(collection)?, &record_id(id)?, payload, None)?)
    }

    pub fn delete(&self, collection: &str, id: &str) -> DatabaseResult<Record> {
        Ok(self
            .store
            .delete(&collection_name(collection)?, &record_id(id)?, None)?)
    }

    /// List all collections.
    pub fn collections(&self) -> DatabaseResult<Vec<CollectionName>> {
        Ok(self.store.collections()?)
    }

    // ==================== Snapshots ====================

    /// Get the snapshot history, most recent first.
    pub fn history(&self, limit: Option<usize>) -> DatabaseResult<Vec<SnapshotInfo>> {
        Ok(self.store.history(limit)?)
    }

    /// Revert the data directory to a snapshot.
    ///
    /// Refused while a transaction is active.
    pub fn revert_to(&self, snapshot: &str) -> DatabaseResult<()> {
        Ok(self.coordinator.revert_to(&SnapshotId::new(snapshot))?)
    }

    // ==================== Transactions ====================

    /// Begin a new transaction.
    pub fn begin(&self, tx_id: Option<&str>) -> DatabaseResult<Transaction> {
        Ok(self.coordinator.begin(tx_id)?)
    }

    /// Run one operation inside a transaction.
    pub fn execute_in(
        &self,
        tx_id: &str,
        kind: &str,
        collection: &str,
        record_id: Option<&str>,
        payload: Option<Value>,
    ) -> DatabaseResult<Record> {
        Ok(self
            .coordinator
            .execute_raw(tx_id, kind, collection, record_id, payload)?)
    }

    pub fn commit(&self, tx_id: &str) -> DatabaseResult<Transaction> {
        Ok(self.coordinator.commit(tx_id)?)
    }

    pub fn rollback(&self, tx_id: &str) -> DatabaseResult<Transaction> {
        Ok(self.coordinator.rollback(tx_id)?)
    }

    /// Roll back transactions older than `max_age`, or the configured age.
    pub fn cleanup_stale(&self, max_age: Option<Duration>) -> Vec<TransactionOutcome> {
        self.coordinator
            .cleanup_stale(max_age.unwrap_or(self.config.stale_after))
    }

    pub fn abort_all(&self) -> Vec<TransactionOutcome> {
        self.coordinator.abort_all()
    }

    /// Execute within a transaction.
    pub fn transaction<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&TransactionHandle<'_>) -> TransactionResult<T>,
    {
        Ok(self.coordinator.with_transaction(f)?)
    }

    /// Get database statistics.
    pub fn stats(&self) -> DatabaseResult<DatabaseStats> {
        Ok(DatabaseStats {
            store: self.store.statistics()?,
            transactions: self.coordinator.statistics(),
        })
    }

    // ==================== Commands ====================

    /// Parse and run one command line.
    pub fn execute(&self, line: &str) -> DatabaseResult<CommandOutput> {
        let command = Command::parse(line)?;
        self.run(command)
    }

    /// Run a parsed command.
    pub fn run(&self, command: Command) -> DatabaseResult<CommandOutput> {
        Ok(match command {
            Command::List { collection } => CommandOutput::Records(self.list(&collection)?),
            Command::Get { collection, id } => {
                let name = collection_name(&collection)?;
                let id = record_id(&id)?;
                match self.store.get(&name, &id)? {
                    Some(record) => CommandOutput::Record(record),
                    None => {
                        return Err(StoreError::RecordNotFound {
                            collection: name,
                            id,
                        }
                        .into())
                    }
                }
            }
            Command::Create {
                collection,
                payload,
            } => CommandOutput::Record(self.create(&collection, payload)?),
            Command::Update {
                collection,
                id,
                payload,
            } => CommandOutput::Record(self.update(&collection, &id, payload)?),
            Command::Delete { collection, id } => CommandOutput::Record(self.delete(&collection, &id)?),
            Command::Collections => CommandOutput::Collections(self.collections()?),
            Command::Stats => CommandOutput::Stats(self.stats()?),
            Command::History { limit } => CommandOutput::History(self.history(limit.or(Some(20)))?),
            Command::Revert { snapshot } => {
                self.revert_to(&snapshot)?;
                CommandOutput::Message(format!("Reverted to {}", snapshot))
            }
            Command::Begin { tx_id } => CommandOutput::Transaction(self.begin(tx_id.as_deref())?),
            Command::Execute {
                tx_id,
                kind,
                collection,
                record_id,
                payload,
            } => CommandOutput::Record(self.execute_in(
                &tx_id,
                &kind,
                &collection,
                record_id.as_deref(),
                payload,
            )?),
            Command::Commit { tx_id } => CommandOutput::Transaction(self.commit(&tx_id)?),
            Command::Rollback { tx_id } => CommandOutput::Transaction(self.rollback(&tx_id)?),
            Command::TxList => CommandOutput::Transactions(self.coordinator.active_transactions()),
            Command::TxShow { tx_id } => CommandOutput::Transaction(self.coordinator.get(&tx_id)?),
            Command::TxCleanup { minutes } => {
                let max_age = minutes.map(minutes_to_duration).transpose()?;
                CommandOutput::Outcomes(self.cleanup_stale(max_age))
            }
            Command::TxAbortAll => CommandOutput::Outcomes(self.abort_all()),
            Command::TxStats => CommandOutput::TransactionStats(self.coordinator.statistics()),
        })
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

fn minutes_to_duration(minutes: i64) -> DatabaseResult<Duration> {
    if minutes < 0 {
        return Err(DatabaseError::InvalidCommand(format!(
            "minutes must not be negative, got {}",
            minutes
        )));
    }
    Duration::try_minutes(minutes).ok_or_else(|| {
        DatabaseError::InvalidCommand(format!("{} minutes is out of range", minutes))
    })
}

fn collection_name(name: &str) -> DatabaseResult<CollectionName> {
    CollectionName::new(name).map_err(|e| StoreError::from(e).into())
}

fn record_id(id: &str) -> DatabaseResult<RecordId> {
    RecordId::new(id).map_err(|e| StoreError::from(e).into())
}

/// Database statistics.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub store: StoreStatistics,
    pub transactions: TransactionStatistics,
}

impl fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.store)?;
        write!(f, "{}", self.transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open(backend: SnapshotBackend) -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig::new(dir.path()).backend(backend);
        let db = Database::open_with_config(config).unwrap();
        (dir, db)
    }

    #[test]
    fn test_open_database() {
        let (_dir, db) = open(SnapshotBackend::Git);
        assert!(db.collections().unwrap().is_empty());
        assert_eq!(db.history(None).unwrap().len(), 1);
        assert_eq!(db.store().backend_name(), "git");
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig::new(dir.path().join("missing")).create_if_missing(false);
        let result = Database::open_with_config(config);
        assert!(matches!(result, Err(DatabaseError::NotFound(_))));
    }

    #[test]
    fn test_open_creates_nested_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("data");
        let db = Database::open(&path).unwrap();
        assert!(path.join(".git").exists());
        assert_eq!(db.path(), path.as_path());
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = TempDir::new().unwrap();
        let id = {
            let db = Database::open(dir.path()).unwrap();
            db.create("users", json!({"name": "Alice"})).unwrap().id
        };

        let db = Database::open(dir.path()).unwrap();
        let record = db.get("users", id.as_str()).unwrap().unwrap();
        assert_eq!(record.get("name"), Some(&json!("Alice")));
    }

    #[test]
    fn test_invalid_names() {
        let (_dir, db) = open(SnapshotBackend::Memory);
        let err = db.create("../etc", json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(db.get("users", "bad id").is_err());
    }

    #[test]
    fn test_execute_commands() {
        let (_dir, db) = open(SnapshotBackend::Memory);

        let created = db.execute("create users {\"id\": \"u1\", \"name\": \"A\"}").unwrap();
        assert!(matches!(created, CommandOutput::Record(ref r) if r.id.as_str() == "u1"));

        db.execute("update users u1 {\"age\": 31}").unwrap();
        match db.execute("get users u1").unwrap() {
            CommandOutput::Record(r) => assert_eq!(r.get("age"), Some(&json!(31))),
            other => panic!("unexpected output: {:?}", other),
        }

        let listing = db.execute("list users").unwrap().to_string();
        assert!(listing.contains("u1"));
        assert!(listing.contains("(1 records)"));

        let missing = db.execute("get users nobody").unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_transaction_commands() {
        let (_dir, db) = open(SnapshotBackend::Git);
        db.execute("create users {\"id\": \"u1\"}").unwrap();

        db.execute("begin t1").unwrap();
        db.execute("tx exec t1 delete users u1").unwrap();
        assert!(db.list("users").unwrap().is_empty());

        let err = db.execute("begin t2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictRisk);

        let err = db.execute("tx exec t1 merge users").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);

        match db.execute("rollback t1").unwrap() {
            CommandOutput::Transaction(tx) => assert_eq!(tx.operations.len(), 2),
            other => panic!("unexpected output: {:?}", other),
        }
        assert_eq!(db.list("users").unwrap().len(), 1);

        let shown = db.execute("tx show t1").unwrap().to_string();
        assert!(shown.contains("rolled_back"));
    }

    #[test]
    fn test_revert_command() {
        let (_dir, db) = open(SnapshotBackend::Git);
        let root = db.history(None).unwrap()[0].id.clone();
        db.create("users", json!({})).unwrap();

        db.execute(&format!("revert {}", root)).unwrap();
        assert!(db.list("users").unwrap().is_empty());

        let err = db.execute("revert 0000000000000000000000000000000000000000").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
    }

    #[test]
    fn test_cleanup_and_abort_commands() {
        let (_dir, db) = open(SnapshotBackend::Memory);
        db.begin(Some("t1")).unwrap();

        match db.execute("tx cleanup 30").unwrap() {
            CommandOutput::Outcomes(outcomes) => assert!(outcomes.is_empty()),
            other => panic!("unexpected output: {:?}", other),
        }

        match db.execute("tx abort-all").unwrap() {
            CommandOutput::Outcomes(outcomes) => {
                assert_eq!(outcomes.len(), 1);
                assert!(outcomes[0].is_success());
            }
            other => panic!("unexpected output: {:?}", other),
        }
        assert_eq!(db.coordinator().active_count(), 0);
    }

    #[test]
    fn test_cleanup_rejects_out_of_range_minutes() {
        let (_dir, db) = open(SnapshotBackend::Memory);
        db.begin(Some("t1")).unwrap();

        let err = db.execute("tx cleanup 9223372036854775807").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = db.execute("tx cleanup -5").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidCommand(_)));
        assert!(db.coordinator().is_active("t1"));

        assert!(DatabaseConfig::new(".").stale_after_minutes(i64::MAX).is_err());
        let config = DatabaseConfig::new(".").stale_after_minutes(45).unwrap();
        assert_eq!(config.stale_after, Duration::minutes(45));
    }

    #[test]
    fn test_transaction_closure() {
        let (_dir, db) = open(SnapshotBackend::Memory);
        let users = CollectionName::new("users").unwrap();

        db.transaction(|tx| {
            tx.create(&users, json!({"name": "A"}))?;
            tx.create(&users, json!({"name": "B"}))
        })
        .unwrap();
        assert_eq!(db.list("users").unwrap().len(), 2);

        let history = db.history(Some(1)).unwrap();
        assert!(history[0].description.starts_with("[COMMIT] Transaction"));
    }

    #[test]
    fn test_stats() {
        let (_dir, db) = open(SnapshotBackend::Git);
        db.create("users", json!({})).unwrap();
        db.create("orders", json!({})).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.store.metadata.total_records, 2);
        assert_eq!(stats.transactions.active_count, 0);

        let text = db.execute("stats").unwrap().to_string();
        assert!(text.contains("Total Records: 2"));
        assert!(text.contains("Active: 0"));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("git".parse::<SnapshotBackend>().unwrap(), SnapshotBackend::Git);
        assert_eq!("Memory".parse::<SnapshotBackend>().unwrap(), SnapshotBackend::Memory);
        assert!("svn".parse::<SnapshotBackend>().is_err());
    }
}
