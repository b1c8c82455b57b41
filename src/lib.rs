//! SnapStore - a checkpointed collection store
//!
//! Records live as JSON arrays, one file per collection, in a plain data
//! directory. Every mutation takes a snapshot of that directory (a git
//! commit, or an in-memory image), and transactions are checkpoints on the
//! snapshot log: commit keeps what happened since `begin`, rollback
//! reverts to it.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use snapstore::db::Database;
//!
//! let db = Database::open("./my_data").unwrap();
//! let tx = db.begin(None).unwrap();
//! db.execute_in(&tx.id, "create", "users", None, Some(json!({"name": "Alice"}))).unwrap();
//! db.rollback(&tx.id).unwrap();
//! ```

pub mod db;
pub mod error;
mod fsio;
pub mod snapshot;
pub mod store;
pub mod transaction;

pub use error::ErrorKind;
