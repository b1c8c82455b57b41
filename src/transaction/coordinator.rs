//! Transaction coordinator - owns every in-flight transaction.
//!
//! The coordinator is the only way to run transactional work. It handles:
//! - Checkpointing the snapshot log head at `begin`
//! - Forwarding operations to the store and logging their outcomes
//! - Commit markers and checkpoint reverts
//! - Stale cleanup and emergency abort
//!
//! Rollback reverts the *whole* snapshot log, so only one transaction may be
//! active at a time; `begin` fails with `ConflictRisk` otherwise.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::snapshot::SnapshotId;
use crate::store::{CollectionName, CollectionStore, Record, RecordId, SnapshotMessage};
use crate::transaction::context::{Operation, Transaction, TransactionStatus};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Coordinator tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// age after which `cleanup_stale_default` rolls a transaction back
    pub stale_after: Duration,
    /// how many finished transactions stay queryable
    pub finished_history: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::minutes(30),
            finished_history: 100,
        }
    }
}

/// Result of rolling back one transaction during cleanup or abort.
#[derive(Debug)]
pub struct TransactionOutcome {
    pub tx_id: String,
    pub outcome: TransactionResult<Transaction>,
}

impl TransactionOutcome {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(tx) => write!(f, "{}: {}", self.tx_id, tx.status),
            Err(e) => write!(f, "{}: failed ({})", self.tx_id, e),
        }
    }
}

/// Summary of the oldest active transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OldestTransaction {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub age_seconds: i64,
}

/// Statistics over the active transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatistics {
    pub active_count: usize,
    pub oldest_transaction: Option<OldestTransaction>,
    pub total_operations: usize,
    pub average_operations_per_transaction: f64,
}

impl fmt::Display for TransactionStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transaction Statistics:")?;
        writeln!(f, "  Active: {}", self.active_count)?;
        match &self.oldest_transaction {
            Some(oldest) => writeln!(f, "  Oldest: {} ({}s)", oldest.id, oldest.age_seconds)?,
            None => writeln!(f, "  Oldest: -")?,
        }
        writeln!(f, "  Total Operations: {}", self.total_operations)?;
        writeln!(
            f,
            "  Average Operations: {:.2}",
            self.average_operations_per_transaction
        )
    }
}

#[derive(Default)]
struct TransactionTable {
    active: BTreeMap<String, Transaction>,
    /// oldest first, bounded by `finished_history`
    finished: VecDeque<Transaction>,
}

impl TransactionTable {
    /// Look up an active transaction, telling unknown ids from finished ones.
    fn active_mut(&mut self, tx_id: &str) -> TransactionResult<&mut Transaction> {
        if let Some(tx) = self.active.get_mut(tx_id) {
            return Ok(tx);
        }
        match self.finished.iter().rev().find(|tx| tx.id == tx_id) {
            Some(tx) => Err(TransactionError::NotActive {
                tx_id: tx_id.to_string(),
                state: tx.status.to_string(),
            }),
            None => Err(TransactionError::NotFound(tx_id.to_string())),
        }
    }

    fn retire(&mut self, tx: Transaction, limit: usize) {
        self.finished.push_back(tx);
        while self.finished.len() > limit {
            self.finished.pop_front();
        }
    }
}

/// Transaction coordinator.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone)]
pub struct TransactionCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    store: CollectionStore,
    options: CoordinatorOptions,
    /// held across every lifecycle step; always taken before the store lock
    table: Mutex<TransactionTable>,
}

impl TransactionCoordinator {
    pub fn new(store: CollectionStore) -> Self {
        Self::with_options(store, CoordinatorOptions::default())
    }

    pub fn with_options(store: CollectionStore, options: CoordinatorOptions) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                options,
                table: Mutex::new(TransactionTable::default()),
            }),
        }
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &CollectionStore {
        &self.inner.store
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.inner.options
    }

    // ==================== Lifecycle ====================

    /// Begin a transaction, checkpointing the current snapshot log head.
    ///
    /// A rejected call leaves every transaction untouched.
    pub fn begin(&self, tx_id: Option<&str>) -> TransactionResult<Transaction> {
        let mut table = self.inner.table.lock();

        let tx_id = match tx_id {
            Some(id) => RecordId::new(id).map_err(TransactionError::InvalidId)?.to_string(),
            None => Ulid::new().to_string().to_lowercase(),
        };

        if table.active.contains_key(&tx_id) || table.finished.iter().any(|tx| tx.id == tx_id) {
            return Err(TransactionError::AlreadyExists(tx_id));
        }

        if let Some(active) = table.active.keys().next() {
            return Err(TransactionError::ConflictRisk {
                action: format!("begin {}", tx_id),
                active: active.clone(),
            });
        }

        let checkpoint = self.inner.store.head()?;
        let tx = Transaction::new(tx_id.clone(), checkpoint);
        info!(tx_id = %tx_id, checkpoint = %tx.checkpoint, "transaction started");

        table.active.insert(tx_id, tx.clone());
        Ok(tx)
    }

    /// Run one typed operation inside an active transaction.
    pub fn execute(&self, tx_id: &str, operation: Operation) -> TransactionResult<Record> {
        let mut table = self.inner.table.lock();
        let tx = table.active_mut(tx_id)?;
        self.apply(tx, operation)
    }

    /// Run an operation given as loosely typed parts.
    ///
    /// Unknown kinds and malformed arguments fail, and are still logged as
    /// failed operations of the transaction.
    pub fn execute_raw(
        &self,
        tx_id: &str,
        kind: &str,
        collection: &str,
        record_id: Option<&str>,
        payload: Option<Value>,
    ) -> TransactionResult<Record> {
        let mut table = self.inner.table.lock();
        let tx = table.active_mut(tx_id)?;

        match Operation::parse(kind, collection, record_id, payload.clone()) {
            Ok(operation) => self.apply(tx, operation),
            Err(err) => {
                let index = tx.log_pending(kind, collection, record_id, payload.unwrap_or(Value::Null));
                tx.log_failed(index, &err);
                debug!(tx_id, kind, error = %err, "rejected operation");
                Err(err)
            }
        }
    }

    /// Commit: keep every snapshot and record a closing marker.
    pub fn commit(&self, tx_id: &str) -> TransactionResult<Transaction> {
        let mut table = self.inner.table.lock();
        let tx = table.active_mut(tx_id)?;

        let head = self.inner.store.head()?;
        let marker = SnapshotMessage::transaction_commit(tx_id, tx.operations.len());
        self.inner.store.mark(&marker)?;

        let mut tx = match table.active.remove(tx_id) {
            Some(tx) => tx,
            None => return Err(TransactionError::Internal(format!("{} vanished during commit", tx_id))),
        };
        tx.commit_snapshot = Some(head);
        tx.finish(TransactionStatus::Committed);
        info!(tx_id, operations = tx.operations.len(), "transaction committed");

        table.retire(tx.clone(), self.inner.options.finished_history);
        Ok(tx)
    }

    /// Roll back: revert the snapshot log to the checkpoint.
    ///
    /// Every snapshot taken since the checkpoint is discarded, whoever made
    /// it. If the revert fails the transaction stays active.
    pub fn rollback(&self, tx_id: &str) -> TransactionResult<Transaction> {
        let mut table = self.inner.table.lock();
        self.rollback_locked(&mut table, tx_id)
    }

    // ==================== Reclamation ====================

    /// Roll back every active transaction older than `max_age`.
    pub fn cleanup_stale(&self, max_age: Duration) -> Vec<TransactionOutcome> {
        let mut table = self.inner.table.lock();
        let now = Utc::now();

        let stale: Vec<&Transaction> = table
            .active
            .values()
            .filter(|tx| tx.age(now) > max_age)
            .collect();
        let ids = newest_first(stale);

        for tx_id in &ids {
            warn!(tx_id = %tx_id, max_age_secs = max_age.num_seconds(), "rolling back stale transaction");
        }
        self.rollback_each(&mut table, ids)
    }

    /// `cleanup_stale` with the configured `stale_after`.
    pub fn cleanup_stale_default(&self) -> Vec<TransactionOutcome> {
        self.cleanup_stale(self.inner.options.stale_after)
    }

    /// Roll back every active transaction.
    pub fn abort_all(&self) -> Vec<TransactionOutcome> {
        let mut table = self.inner.table.lock();
        let ids = newest_first(table.active.values().collect());
        if !ids.is_empty() {
            warn!(count = ids.len(), "aborting all active transactions");
        }
        self.rollback_each(&mut table, ids)
    }

    // ==================== Queries ====================

    /// An active or recently finished transaction.
    pub fn get(&self, tx_id: &str) -> TransactionResult<Transaction> {
        let table = self.inner.table.lock();
        table
            .active
            .get(tx_id)
            .or_else(|| table.finished.iter().rev().find(|tx| tx.id == tx_id))
            .cloned()
            .ok_or_else(|| TransactionError::NotFound(tx_id.to_string()))
    }

    /// Active transactions, oldest first.
    pub fn active_transactions(&self) -> Vec<Transaction> {
        let table = self.inner.table.lock();
        let mut active: Vec<Transaction> = table.active.values().cloned().collect();
        active.sort_by_key(|tx| tx.started_at);
        active
    }

    /// Recently finished transactions, most recent first.
    pub fn finished_transactions(&self) -> Vec<Transaction> {
        self.inner.table.lock().finished.iter().rev().cloned().collect()
    }

    pub fn is_active(&self, tx_id: &str) -> bool {
        self.inner.table.lock().active.contains_key(tx_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.table.lock().active.len()
    }

    pub fn statistics(&self) -> TransactionStatistics {
        let table = self.inner.table.lock();
        let now = Utc::now();

        let active_count = table.active.len();
        let total_operations: usize = table.active.values().map(|tx| tx.operations.len()).sum();
        let oldest_transaction = table
            .active
            .values()
            .min_by_key(|tx| tx.started_at)
            .map(|tx| OldestTransaction {
                id: tx.id.clone(),
                started_at: tx.started_at,
                age_seconds: tx.age(now).num_seconds(),
            });

        TransactionStatistics {
            active_count,
            oldest_transaction,
            total_operations,
            average_operations_per_transaction: if active_count == 0 {
                0.0
            } else {
                total_operations as f64 / active_count as f64
            },
        }
    }

    // ==================== Helpers ====================

    /// Execute a function within a transaction, automatically committing or rolling back.
    ///
    /// If the function returns Ok, the transaction is committed.
    /// If the function returns Err, the transaction is rolled back and that
    /// error is returned even if the rollback fails too.
    pub fn with_transaction<F, T>(&self, f: F) -> TransactionResult<T>
    where
        F: FnOnce(&TransactionHandle<'_>) -> TransactionResult<T>,
    {
        let tx = self.begin(None)?;
        let handle = TransactionHandle {
            coordinator: self,
            tx_id: tx.id,
        };

        match f(&handle) {
            Ok(result) => {
                self.commit(&handle.tx_id)?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_error) = self.rollback(&handle.tx_id) {
                    warn!(
                        tx_id = %handle.tx_id,
                        error = %e,
                        rollback_error = %rollback_error,
                        "rollback after failed closure did not complete"
                    );
                }
                Err(e)
            }
        }
    }

    /// Revert the store to a snapshot outside any transaction.
    ///
    /// Refused while a transaction is active, since it would move the
    /// snapshot log out from under its checkpoint.
    pub fn revert_to(&self, snapshot: &SnapshotId) -> TransactionResult<()> {
        let table = self.inner.table.lock();
        if let Some(active) = table.active.keys().next() {
            return Err(TransactionError::ConflictRisk {
                action: format!("revert to {}", snapshot),
                active: active.clone(),
            });
        }
        self.inner.store.revert(snapshot)?;
        info!(snapshot = %snapshot, "store reverted to snapshot");
        Ok(())
    }

    fn apply(&self, tx: &mut Transaction, operation: Operation) -> TransactionResult<Record> {
        let kind = operation.kind();
        let index = tx.log_pending(
            kind.as_str(),
            operation.collection().as_str(),
            operation.record_id(),
            operation.arguments(),
        );

        let store = &self.inner.store;
        let tx_id = Some(tx.id.as_str());
        let result = match operation {
            Operation::Create { collection, payload } => store.create(&collection, payload, tx_id),
            Operation::Update {
                collection,
                id,
                payload,
            } => store.update(&collection, &id, payload, tx_id),
            Operation::Delete { collection, id } => store.delete(&collection, &id, tx_id),
        };

        match result {
            Ok(record) => {
                tx.log_completed(index, serde_json::to_value(&record).ok());
                debug!(tx_id = %tx.id, %kind, record = %record.id, "operation completed");
                Ok(record)
            }
            Err(e) => {
                let err = TransactionError::from(e);
                tx.log_failed(index, &err);
                debug!(tx_id = %tx.id, %kind, error = %err, "operation failed");
                Err(err)
            }
        }
    }

    fn rollback_locked(&self, table: &mut TransactionTable, tx_id: &str) -> TransactionResult<Transaction> {
        let checkpoint = table.active_mut(tx_id)?.checkpoint.clone();

        if let Err(e) = self.inner.store.revert(&checkpoint) {
            warn!(tx_id, checkpoint = %checkpoint, error = %e, "rollback failed, transaction left active");
            return Err(e.into());
        }

        let mut tx = match table.active.remove(tx_id) {
            Some(tx) => tx,
            None => return Err(TransactionError::Internal(format!("{} vanished during rollback", tx_id))),
        };
        tx.finish(TransactionStatus::RolledBack);
        info!(tx_id, checkpoint = %checkpoint, "transaction rolled back");

        table.retire(tx.clone(), self.inner.options.finished_history);
        Ok(tx)
    }

    fn rollback_each(&self, table: &mut TransactionTable, ids: Vec<String>) -> Vec<TransactionOutcome> {
        ids.into_iter()
            .map(|tx_id| {
                let outcome = self.rollback_locked(table, &tx_id);
                TransactionOutcome { tx_id, outcome }
            })
            .collect()
    }

    /// Shift a transaction's start time into the past.
    #[cfg(test)]
    pub(crate) fn backdate(&self, tx_id: &str, by: Duration) {
        if let Some(tx) = self.inner.table.lock().active.get_mut(tx_id) {
            tx.started_at = tx.started_at - by;
        }
    }
}

/// Ids ordered so later checkpoints are reverted before earlier ones.
fn newest_first(mut transactions: Vec<&Transaction>) -> Vec<String> {
    transactions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    transactions.into_iter().map(|tx| tx.id.clone()).collect()
}

impl fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("active_count", &self.active_count())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// A borrowed view of the transaction opened by `with_transaction`.
pub struct TransactionHandle<'a> {
    coordinator: &'a TransactionCoordinator,
    tx_id: String,
}

impl TransactionHandle<'_> {
    pub fn id(&self) -> &str {
        &self.tx_id
    }

    pub fn execute(&self, operation: Operation) -> TransactionResult<Record> {
        self.coordinator.execute(&self.tx_id, operation)
    }

    pub fn create(&self, collection: &CollectionName, payload: Value) -> TransactionResult<Record> {
        self.execute(Operation::Create {
            collection: collection.clone(),
            payload,
        })
    }

    pub fn update(&self, collection: &CollectionName, id: &RecordId, payload: Value) -> TransactionResult<Record> {
        self.execute(Operation::Update {
            collection: collection.clone(),
            id: id.clone(),
            payload,
        })
    }

    pub fn delete(&self, collection: &CollectionName, id: &RecordId) -> TransactionResult<Record> {
        self.execute(Operation::Delete {
            collection: collection.clone(),
            id: id.clone(),
        })
    }

    /// Read through to the store; sees every committed and uncommitted change.
    pub fn list(&self, collection: &CollectionName) -> TransactionResult<Vec<Record>> {
        Ok(self.coordinator.store().list(collection)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::snapshot::{GitSnapshotLog, MemorySnapshotLog};
    use crate::transaction::context::OperationStatus;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TransactionCoordinator) {
        let dir = TempDir::new().unwrap();
        let log = GitSnapshotLog::init(dir.path()).unwrap();
        let store = CollectionStore::new(dir.path(), Box::new(log)).unwrap();
        (dir, TransactionCoordinator::new(store))
    }

    fn setup_memory() -> (TempDir, TransactionCoordinator) {
        let dir = TempDir::new().unwrap();
        let log = MemorySnapshotLog::open(dir.path()).unwrap();
        let store = CollectionStore::new(dir.path(), Box::new(log)).unwrap();
        (dir, TransactionCoordinator::new(store))
    }

    fn users() -> CollectionName {
        CollectionName::new("users").unwrap()
    }

    #[test]
    fn test_rollback_scenario() {
        for (_dir, coordinator) in [setup(), setup_memory()] {
            let store = coordinator.store().clone();

            let created = store.create(&users(), json!({"name": "A"}), None).unwrap();
            assert_eq!(store.metadata().unwrap().count(&users()), 1);
            let updated = store.update(&users(), &created.id, json!({"age": 31}), None).unwrap();
            assert_eq!(updated.id, created.id);
            assert_eq!(updated.get("name"), Some(&json!("A")));

            let t1 = coordinator.begin(Some("t1")).unwrap();
            assert_eq!(t1.checkpoint, store.head().unwrap());
            coordinator
                .execute(
                    "t1",
                    Operation::Delete {
                        collection: users(),
                        id: created.id.clone(),
                    },
                )
                .unwrap();
            assert!(store.list(&users()).unwrap().is_empty());

            let rolled_back = coordinator.rollback("t1").unwrap();
            assert_eq!(rolled_back.status, TransactionStatus::RolledBack);
            assert_eq!(store.list(&users()).unwrap(), vec![updated]);
            assert_eq!(store.head().unwrap(), t1.checkpoint);
            assert!(!coordinator.is_active("t1"));
        }
    }

    #[test]
    fn test_commit_scenario() {
        let (dir, coordinator) = setup();
        coordinator.begin(Some("t2")).unwrap();
        let a = coordinator
            .execute_raw("t2", "create", "users", None, Some(json!({"name": "A"})))
            .unwrap();
        let b = coordinator
            .execute_raw("t2", "create", "users", Some("b"), Some(json!({"name": "B"})))
            .unwrap();
        assert_eq!(b.id.as_str(), "b");

        let committed = coordinator.commit("t2").unwrap();
        assert_eq!(committed.status, TransactionStatus::Committed);
        assert_eq!(committed.completed_operations(), 2);
        assert!(committed.commit_snapshot.is_some());

        let history = coordinator.store().history(Some(3)).unwrap();
        assert_eq!(history[0].description, "[COMMIT] Transaction t2 (2 operations)");
        assert_eq!(history[1].description, "[CREATE] users/b tx:t2");

        // a fresh store over the same directory sees both records
        drop(coordinator);
        let log = GitSnapshotLog::open(dir.path()).unwrap();
        let store = CollectionStore::new(dir.path(), Box::new(log)).unwrap();
        let ids: Vec<_> = store.list(&users()).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn test_cleanup_stale_scenario() {
        let (_dir, coordinator) = setup();
        let store = coordinator.store().clone();
        store.create(&users(), json!({"name": "A"}), None).unwrap();

        let t3 = coordinator.begin(Some("t3")).unwrap();
        coordinator
            .execute_raw("t3", "create", "users", None, Some(json!({"name": "B"})))
            .unwrap();
        assert_eq!(store.list(&users()).unwrap().len(), 2);

        // young transactions survive
        assert!(coordinator.cleanup_stale(Duration::minutes(30)).is_empty());

        coordinator.backdate("t3", Duration::hours(2));
        let outcomes = coordinator.cleanup_stale(Duration::minutes(30));

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].tx_id, "t3");
        assert!(outcomes[0].is_success());
        assert!(!coordinator.is_active("t3"));
        assert_eq!(store.head().unwrap(), t3.checkpoint);
        assert_eq!(store.list(&users()).unwrap().len(), 1);
    }

    #[test]
    fn test_second_begin_is_rejected() {
        let (_dir, coordinator) = setup();
        let first = coordinator.begin(Some("t1")).unwrap();

        let result = coordinator.begin(Some("t2"));
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictRisk);
        assert!(err.is_retryable());

        assert_eq!(coordinator.active_count(), 1);
        assert_eq!(coordinator.get("t1").unwrap(), first);
        assert!(coordinator.get("t2").unwrap_err().kind() == ErrorKind::NotFound);
    }

    #[test]
    fn test_reused_id_is_invalid_state() {
        let (_dir, coordinator) = setup();
        coordinator.begin(Some("t1")).unwrap();
        assert_eq!(
            coordinator.begin(Some("t1")).unwrap_err().kind(),
            ErrorKind::InvalidState
        );

        coordinator.commit("t1").unwrap();
        assert!(matches!(
            coordinator.begin(Some("t1")),
            Err(TransactionError::AlreadyExists(_))
        ));
        assert!(coordinator.begin(Some("bad id")).is_err());
    }

    #[test]
    fn test_terminal_and_unknown_transactions() {
        let (_dir, coordinator) = setup();
        coordinator.begin(Some("t1")).unwrap();
        coordinator.rollback("t1").unwrap();

        for result in [
            coordinator.commit("t1").map(|_| ()),
            coordinator.rollback("t1").map(|_| ()),
            coordinator
                .execute_raw("t1", "create", "users", None, Some(json!({})))
                .map(|_| ()),
        ] {
            assert!(matches!(result, Err(TransactionError::NotActive { .. })));
        }

        let unknown = coordinator.commit("nope").unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_failed_operations_are_logged_and_raised() {
        let (_dir, coordinator) = setup();
        coordinator.begin(Some("t1")).unwrap();

        let unsupported = coordinator.execute_raw("t1", "upsert", "users", None, Some(json!({})));
        assert_eq!(unsupported.unwrap_err().kind(), ErrorKind::UnsupportedOperation);

        let missing = coordinator.execute_raw("t1", "delete", "users", Some("ghost"), None);
        assert_eq!(missing.unwrap_err().kind(), ErrorKind::NotFound);

        let tx = coordinator.get("t1").unwrap();
        assert_eq!(tx.operations.len(), 2);
        assert!(tx.operations.iter().all(|op| op.status == OperationStatus::Failed));
        assert_eq!(tx.operations[0].kind, "upsert");
        assert_eq!(tx.operations[1].record_id.as_deref(), Some("ghost"));
        assert_eq!(tx.completed_operations(), 0);
    }

    #[test]
    fn test_create_logs_explicit_record_id() {
        let (_dir, coordinator) = setup();
        coordinator.begin(Some("t1")).unwrap();

        coordinator
            .execute_raw("t1", "create", "users", Some("b"), Some(json!({"name": "B"})))
            .unwrap();
        coordinator
            .execute_raw("t1", "create", "users", None, Some(json!({"name": "C"})))
            .unwrap();

        let tx = coordinator.get("t1").unwrap();
        assert_eq!(tx.operations[0].record_id.as_deref(), Some("b"));
        assert_eq!(tx.operations[1].record_id, None);
    }

    #[test]
    fn test_with_transaction_keeps_closure_error() {
        let (_dir, coordinator) = setup();
        let other = coordinator.clone();

        let result: TransactionResult<()> = coordinator.with_transaction(|tx| {
            tx.create(&users(), json!({"name": "A"}))?;
            // finishing the transaction here makes the automatic rollback fail
            other.rollback(tx.id())?;
            Err(TransactionError::InvalidOperation("closure failed".to_string()))
        });

        match result {
            Err(TransactionError::InvalidOperation(message)) => assert_eq!(message, "closure failed"),
            unexpected => panic!("unexpected result: {:?}", unexpected),
        }
        assert_eq!(coordinator.active_count(), 0);
        assert!(coordinator.store().list(&users()).unwrap().is_empty());
    }

    #[test]
    fn test_completed_operations_match_snapshots() {
        let (_dir, coordinator) = setup();
        let tx = coordinator.begin(None).unwrap();
        let store = coordinator.store().clone();

        let record = coordinator
            .execute_raw(&tx.id, "create", "users", None, Some(json!({"n": 1})))
            .unwrap();
        coordinator
            .execute_raw(&tx.id, "update", "users", Some(record.id.as_str()), Some(json!({"n": 2})))
            .unwrap();
        let _ = coordinator.execute_raw(&tx.id, "delete", "users", Some("ghost"), None);

        let history = store.history(None).unwrap();
        let since_checkpoint = history.iter().take_while(|s| s.id != tx.checkpoint).count();
        assert_eq!(since_checkpoint, coordinator.get(&tx.id).unwrap().completed_operations());
    }

    #[test]
    fn test_rollback_discards_outside_writes() {
        let (_dir, coordinator) = setup();
        let store = coordinator.store().clone();
        let orders = CollectionName::new("orders").unwrap();

        coordinator.begin(Some("t1")).unwrap();
        store.create(&orders, json!({"total": 5}), None).unwrap();
        coordinator.rollback("t1").unwrap();

        assert!(store.list(&orders).unwrap().is_empty());
    }

    #[test]
    fn test_abort_all() {
        let (_dir, coordinator) = setup();
        assert!(coordinator.abort_all().is_empty());

        let tx = coordinator.begin(None).unwrap();
        coordinator
            .execute_raw(&tx.id, "create", "users", None, Some(json!({})))
            .unwrap();

        let outcomes = coordinator.abort_all();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].to_string().contains("rolled_back"));
        assert_eq!(coordinator.active_count(), 0);
        assert!(coordinator.store().list(&users()).unwrap().is_empty());
        assert_eq!(coordinator.finished_transactions().len(), 1);
    }

    #[test]
    fn test_statistics() {
        let (_dir, coordinator) = setup();
        let empty = coordinator.statistics();
        assert_eq!(empty.active_count, 0);
        assert_eq!(empty.oldest_transaction, None);
        assert_eq!(empty.average_operations_per_transaction, 0.0);

        coordinator.begin(Some("t1")).unwrap();
        coordinator
            .execute_raw("t1", "create", "users", None, Some(json!({})))
            .unwrap();
        coordinator
            .execute_raw("t1", "create", "users", None, Some(json!({})))
            .unwrap();

        let stats = coordinator.statistics();
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.total_operations, 2);
        assert_eq!(stats.average_operations_per_transaction, 2.0);
        assert_eq!(stats.oldest_transaction.unwrap().id, "t1");
    }

    #[test]
    fn test_with_transaction() {
        let (_dir, coordinator) = setup();

        let record = coordinator
            .with_transaction(|tx| tx.create(&users(), json!({"name": "Alice"})))
            .unwrap();
        assert_eq!(coordinator.active_count(), 0);
        assert_eq!(coordinator.store().list(&users()).unwrap(), vec![record]);

        let result: TransactionResult<()> = coordinator.with_transaction(|tx| {
            tx.create(&users(), json!({"name": "Bob"}))?;
            assert_eq!(tx.list(&users())?.len(), 2);
            Err(TransactionError::Internal("test error".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(coordinator.store().list(&users()).unwrap().len(), 1);
    }

    #[test]
    fn test_revert_to_refused_during_transaction() {
        let (_dir, coordinator) = setup();
        let root = coordinator.store().head().unwrap();
        coordinator.store().create(&users(), json!({}), None).unwrap();

        coordinator.begin(Some("t1")).unwrap();
        assert_eq!(
            coordinator.revert_to(&root).unwrap_err().kind(),
            ErrorKind::ConflictRisk
        );
        coordinator.commit("t1").unwrap();

        coordinator.revert_to(&root).unwrap();
        assert!(coordinator.store().list(&users()).unwrap().is_empty());
    }

    #[test]
    fn test_finished_history_is_bounded() {
        let dir = TempDir::new().unwrap();
        let log = MemorySnapshotLog::open(dir.path()).unwrap();
        let store = CollectionStore::new(dir.path(), Box::new(log)).unwrap();
        let coordinator = TransactionCoordinator::with_options(
            store,
            CoordinatorOptions {
                finished_history: 2,
                ..CoordinatorOptions::default()
            },
        );

        for id in ["a", "b", "c"] {
            coordinator.begin(Some(id)).unwrap();
            coordinator.commit(id).unwrap();
        }
        let ids: Vec<_> = coordinator.finished_transactions().into_iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec!["c".to_string(), "b".to_string()]);
        assert_eq!(coordinator.get("a").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
