//! Transaction coordination for SnapStore.
//!
//! Transactions are checkpoints, not isolated workspaces. `begin` remembers
//! the snapshot log head; every operation runs against the shared store and
//! produces its own snapshot; `commit` keeps them all and records a marker;
//! `rollback` reverts the log to the checkpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 TransactionCoordinator                      │
//! │  (active set, operation logs, one transaction at a time)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ Transaction │       │  Operation  │       │ Collection  │
//!  │  (Context)  │       │    Log      │       │   Store     │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use snapstore::transaction::TransactionCoordinator;
//!
//! let coordinator = TransactionCoordinator::new(store);
//!
//! let tx = coordinator.begin(None)?;
//! coordinator.execute_raw(&tx.id, "create", "users", None, Some(json!({"name": "A"})))?;
//!
//! coordinator.commit(&tx.id)?;  // or coordinator.rollback(&tx.id)?;
//! ```

mod context;
mod coordinator;
mod error;

pub use context::{
    Operation, OperationKind, OperationRecord, OperationStatus, Transaction, TransactionStatus,
};
pub use coordinator::{
    CoordinatorOptions, OldestTransaction, TransactionCoordinator, TransactionHandle,
    TransactionOutcome, TransactionStatistics,
};
pub use error::{TransactionError, TransactionResult};
