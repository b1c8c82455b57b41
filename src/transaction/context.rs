//! Transaction records and their operation logs.
//!
//! A `Transaction` is plain data owned by the coordinator. Callers get
//! clones; only the coordinator moves a transaction through its states:
//!
//! ```text
//! active ──commit──▶ committed
//!    │
//!    └──rollback───▶ rolled_back
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::snapshot::SnapshotId;
use crate::store::{CollectionName, RecordId};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Active,
    Committed,
    RolledBack,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled_back",
        }
    }

    /// no transitions leave a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Active)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutating operations a transaction can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            _ => Err(TransactionError::UnsupportedOperation(s.to_string())),
        }
    }
}

/// A typed operation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create {
        collection: CollectionName,
        payload: Value,
    },
    Update {
        collection: CollectionName,
        id: RecordId,
        payload: Value,
    },
    Delete {
        collection: CollectionName,
        id: RecordId,
    },
}

impl Operation {
    /// Build an operation from loosely typed parts.
    ///
    /// For `create`, a record id argument is folded into the payload.
    pub fn parse(
        kind: &str,
        collection: &str,
        id: Option<&str>,
        payload: Option<Value>,
    ) -> TransactionResult<Self> {
        let kind: OperationKind = kind.parse()?;
        let collection = CollectionName::new(collection)
            .map_err(|e| TransactionError::InvalidOperation(format!("collection: {}", e)))?;
        let id = id
            .map(RecordId::new)
            .transpose()
            .map_err(|e| TransactionError::InvalidOperation(format!("record id: {}", e)))?;

        let require_id = |id: Option<RecordId>| {
            id.ok_or_else(|| TransactionError::InvalidOperation(format!("{} requires a record id", kind)))
        };

        match kind {
            OperationKind::Create => {
                let mut payload = payload.unwrap_or_else(|| Value::Object(Default::default()));
                if let (Some(id), Value::Object(map)) = (id, &mut payload) {
                    map.insert("id".to_string(), Value::String(id.into()));
                }
                Ok(Operation::Create { collection, payload })
            }
            OperationKind::Update => Ok(Operation::Update {
                collection,
                id: require_id(id)?,
                payload: payload.ok_or_else(|| {
                    TransactionError::InvalidOperation("update requires a payload".to_string())
                })?,
            }),
            OperationKind::Delete => Ok(Operation::Delete {
                collection,
                id: require_id(id)?,
            }),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn collection(&self) -> &CollectionName {
        match self {
            Operation::Create { collection, .. }
            | Operation::Update { collection, .. }
            | Operation::Delete { collection, .. } => collection,
        }
    }

    /// The target record; for a create, the explicit `id` in the payload.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Operation::Create { payload, .. } => payload.get("id").and_then(Value::as_str),
            Operation::Update { id, .. } | Operation::Delete { id, .. } => Some(id.as_str()),
        }
    }

    /// the payload, if the operation carries one
    pub fn arguments(&self) -> Value {
        match self {
            Operation::Create { payload, .. } | Operation::Update { payload, .. } => payload.clone(),
            Operation::Delete { .. } => Value::Null,
        }
    }
}

/// Outcome of one logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Completed,
    Failed,
}

/// One entry of a transaction's operation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub sequence: usize,
    /// the kind as requested, which may be unrecognized
    pub kind: String,
    pub collection: String,
    pub record_id: Option<String>,
    pub arguments: Value,
    pub status: OperationStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A transaction: checkpoint, operation log and lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub status: TransactionStatus,
    pub started_at: DateTime<Utc>,
    /// head of the snapshot log when the transaction began
    pub checkpoint: SnapshotId,
    pub operations: Vec<OperationRecord>,
    pub finished_at: Option<DateTime<Utc>>,
    /// head of the snapshot log when the transaction committed
    pub commit_snapshot: Option<SnapshotId>,
}

impl Transaction {
    pub(crate) fn new(id: String, checkpoint: SnapshotId) -> Self {
        Self {
            id,
            status: TransactionStatus::Active,
            started_at: Utc::now(),
            checkpoint,
            operations: Vec::new(),
            finished_at: None,
            commit_snapshot: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// time since `begin`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }

    pub fn completed_operations(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| op.status == OperationStatus::Completed)
            .count()
    }

    /// Append a pending entry and return its index.
    pub(crate) fn log_pending(
        &mut self,
        kind: &str,
        collection: &str,
        record_id: Option<&str>,
        arguments: Value,
    ) -> usize {
        self.operations.push(OperationRecord {
            sequence: self.operations.len() + 1,
            kind: kind.to_string(),
            collection: collection.to_string(),
            record_id: record_id.map(str::to_string),
            arguments,
            status: OperationStatus::Pending,
            result: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        });
        self.operations.len() - 1
    }

    pub(crate) fn log_completed(&mut self, index: usize, result: Option<Value>) {
        if let Some(op) = self.operations.get_mut(index) {
            op.status = OperationStatus::Completed;
            op.result = result;
            op.finished_at = Some(Utc::now());
        }
    }

    pub(crate) fn log_failed(&mut self, index: usize, error: &TransactionError) {
        if let Some(op) = self.operations.get_mut(index) {
            op.status = OperationStatus::Failed;
            op.error = Some(error.to_string());
            op.finished_at = Some(Utc::now());
        }
    }

    pub(crate) fn finish(&mut self, status: TransactionStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}
