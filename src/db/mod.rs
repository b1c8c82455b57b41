//! High-level Database API and REPL interface.
//!
//! `Database` wires a snapshot log, the collection store and the
//! transaction coordinator together over one data directory. `Command` is
//! the line language that `snapstore -e` and the REPL speak.

mod api;
mod command;
mod repl;

pub use api::{Database, DatabaseConfig, DatabaseError, DatabaseResult, DatabaseStats, SnapshotBackend};
pub use command::{Command, CommandOutput};
pub use repl::{Repl, ReplConfig};
