//! The line-oriented command language shared by `-e` and the REPL.
//!
//! ```text
//! list <collection>                      collections
//! get <collection> <id>                  stats
//! create <collection> <json>             history [n]
//! update <collection> <id> <json>        revert <snapshot>
//! delete <collection> <id>
//!
//! begin [tx]                             tx list
//! tx exec <tx> <kind> <collection> [id] [json]
//! commit <tx>                            tx show <tx>
//! rollback <tx>                          tx cleanup [minutes]
//!                                        tx abort-all
//!                                        tx stats
//! ```
//! JSON arguments always come last and may contain spaces.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use crate::db::api::{DatabaseError, DatabaseResult, DatabaseStats};
use crate::snapshot::SnapshotInfo;
use crate::store::{CollectionName, Record};
use crate::transaction::{Transaction, TransactionOutcome, TransactionStatistics};

/// A parsed command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List { collection: String },
    Get { collection: String, id: String },
    Create { collection: String, payload: Value },
    Update { collection: String, id: String, payload: Value },
    Delete { collection: String, id: String },
    Collections,
    Stats,
    History { limit: Option<usize> },
    Revert { snapshot: String },
    Begin { tx_id: Option<String> },
    Execute {
        tx_id: String,
        kind: String,
        collection: String,
        record_id: Option<String>,
        payload: Option<Value>,
    },
    Commit { tx_id: String },
    Rollback { tx_id: String },
    TxList,
    TxShow { tx_id: String },
    TxCleanup { minutes: Option<i64> },
    TxAbortAll,
    TxStats,
}

impl Command {
    /// Parse one command line.
    pub fn parse(line: &str) -> DatabaseResult<Self> {
        let mut args = Args::new(line);
        let verb = args.word("command")?.to_lowercase();

        let command = match verb.as_str() {
            "list" | "ls" => Command::List {
                collection: args.word("collection")?,
            },
            "get" => Command::Get {
                collection: args.word("collection")?,
                id: args.word("id")?,
            },
            "create" | "insert" => Command::Create {
                collection: args.word("collection")?,
                payload: args.json()?.unwrap_or_else(|| Value::Object(Default::default())),
            },
            "update" => Command::Update {
                collection: args.word("collection")?,
                id: args.word("id")?,
                payload: args
                    .json()?
                    .ok_or_else(|| invalid("update requires a JSON object"))?,
            },
            "delete" | "rm" => Command::Delete {
                collection: args.word("collection")?,
                id: args.word("id")?,
            },
            "collections" => Command::Collections,
            "stats" => Command::Stats,
            "history" | "log" => Command::History {
                limit: args.optional_number("limit")?,
            },
            "revert" => Command::Revert {
                snapshot: args.word("snapshot")?,
            },
            "begin" => Command::Begin {
                tx_id: args.optional_word(),
            },
            "commit" => Command::Commit {
                tx_id: args.word("transaction id")?,
            },
            "rollback" => Command::Rollback {
                tx_id: args.word("transaction id")?,
            },
            "tx" => Self::parse_tx(&mut args)?,
            other => return Err(invalid(format!("unknown command: {}", other))),
        };

        args.finish()?;
        Ok(command)
    }

    fn parse_tx(args: &mut Args<'_>) -> DatabaseResult<Self> {
        let sub = args.word("tx subcommand")?.to_lowercase();
        Ok(match sub.as_str() {
            "exec" | "execute" => {
                let tx_id = args.word("transaction id")?;
                let kind = args.word("operation kind")?;
                let collection = args.word("collection")?;
                let record_id = if args.at_json() { None } else { args.optional_word() };
                Command::Execute {
                    tx_id,
                    kind,
                    collection,
                    record_id,
                    payload: args.json()?,
                }
            }
            "list" | "ls" => Command::TxList,
            "show" => Command::TxShow {
                tx_id: args.word("transaction id")?,
            },
            "cleanup" => Command::TxCleanup {
                minutes: args.optional_number("minutes")?,
            },
            "abort-all" => Command::TxAbortAll,
            "stats" => Command::TxStats,
            "begin" => Command::Begin {
                tx_id: args.optional_word(),
            },
            "commit" => Command::Commit {
                tx_id: args.word("transaction id")?,
            },
            "rollback" => Command::Rollback {
                tx_id: args.word("transaction id")?,
            },
            other => return Err(invalid(format!("unknown tx subcommand: {}", other))),
        })
    }
}

fn invalid(message: impl Into<String>) -> DatabaseError {
    DatabaseError::InvalidCommand(message.into())
}

/// Whitespace tokenizer that hands the remainder to the JSON parser.
struct Args<'a> {
    rest: &'a str,
}

impl<'a> Args<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: line.trim() }
    }

    fn optional_word(&mut self) -> Option<String> {
        if self.rest.is_empty() {
            return None;
        }
        let end = self.rest.find(char::is_whitespace).unwrap_or(self.rest.len());
        let (word, rest) = self.rest.split_at(end);
        self.rest = rest.trim_start();
        Some(word.to_string())
    }

    fn word(&mut self, what: &str) -> DatabaseResult<String> {
        self.optional_word()
            .ok_or_else(|| invalid(format!("missing {}", what)))
    }

    fn optional_number<T: std::str::FromStr>(&mut self, what: &str) -> DatabaseResult<Option<T>> {
        match self.optional_word() {
            None => Ok(None),
            Some(word) => word
                .parse()
                .map(Some)
                .map_err(|_| invalid(format!("{} must be a number, got '{}'", what, word))),
        }
    }

    fn at_json(&self) -> bool {
        self.rest.starts_with('{') || self.rest.starts_with('[')
    }

    fn json(&mut self) -> DatabaseResult<Option<Value>> {
        if self.rest.is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(self.rest)
            .map_err(|e| invalid(format!("invalid JSON: {}", e)))?;
        self.rest = "";
        Ok(Some(value))
    }

    fn finish(&self) -> DatabaseResult<()> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(invalid(format!("unexpected trailing input: {}", self.rest)))
        }
    }
}

/// What a command produced.
#[derive(Debug)]
pub enum CommandOutput {
    Record(Record),
    Records(Vec<Record>),
    Collections(Vec<CollectionName>),
    Stats(DatabaseStats),
    History(Vec<SnapshotInfo>),
    Transaction(Transaction),
    Transactions(Vec<Transaction>),
    Outcomes(Vec<TransactionOutcome>),
    TransactionStats(TransactionStatistics),
    Message(String),
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Record(record) => write_json(f, record),
            CommandOutput::Records(records) => write_records(f, records),
            CommandOutput::Collections(names) => {
                if names.is_empty() {
                    return writeln!(f, "No collections found.");
                }
                for name in names {
                    writeln!(f, "{}", name)?;
                }
                Ok(())
            }
            CommandOutput::Stats(stats) => write!(f, "{}", stats),
            CommandOutput::History(snapshots) => {
                for snapshot in snapshots {
                    writeln!(
                        f,
                        "{}  {}  {}",
                        snapshot.id.short(),
                        snapshot.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        snapshot.description
                    )?;
                }
                Ok(())
            }
            CommandOutput::Transaction(tx) => write_json(f, tx),
            CommandOutput::Transactions(txs) => {
                if txs.is_empty() {
                    return writeln!(f, "No active transactions.");
                }
                for tx in txs {
                    writeln!(
                        f,
                        "{}  {}  started {}  {} operation(s)",
                        tx.id,
                        tx.status,
                        tx.started_at.format("%Y-%m-%d %H:%M:%S"),
                        tx.operations.len()
                    )?;
                }
                Ok(())
            }
            CommandOutput::Outcomes(outcomes) => {
                if outcomes.is_empty() {
                    return writeln!(f, "No transactions rolled back.");
                }
                for outcome in outcomes {
                    writeln!(f, "{}", outcome)?;
                }
                Ok(())
            }
            CommandOutput::TransactionStats(stats) => write!(f, "{}", stats),
            CommandOutput::Message(message) => writeln!(f, "{}", message),
        }
    }
}

fn write_json<T: serde::Serialize>(f: &mut fmt::Formatter<'_>, value: &T) -> fmt::Result {
    let text = serde_json::to_string_pretty(value).map_err(|_| fmt::Error)?;
    writeln!(f, "{}", text)
}

fn write_records(f: &mut fmt::Formatter<'_>, records: &[Record]) -> fmt::Result {
    if records.is_empty() {
        return writeln!(f, "(0 records)");
    }

    let fields: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();
    let mut columns = vec!["id"];
    columns.extend(fields);

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|col| match *col {
                    "id" => r.id.to_string(),
                    field => r.get(field).map(format_value).unwrap_or_default(),
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    writeln!(f, "{}", header.join(" | "))?;

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    writeln!(f, "{}", sep.join("-+-"))?;

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:width$}", cell, width = widths[i]))
            .collect();
        writeln!(f, "{}", cells.join(" | "))?;
    }
    writeln!(f, "({} records)", records.len())
}

pub(crate) fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_crud() {
        assert_eq!(
            Command::parse("list users").unwrap(),
            Command::List {
                collection: "users".to_string()
            }
        );
        assert_eq!(
            Command::parse("create users {\"name\": \"A B\"}").unwrap(),
            Command::Create {
                collection: "users".to_string(),
                payload: json!({"name": "A B"}),
            }
        );
        assert_eq!(
            Command::parse("update users u1 {\"age\": 31}").unwrap(),
            Command::Update {
                collection: "users".to_string(),
                id: "u1".to_string(),
                payload: json!({"age": 31}),
            }
        );
        assert!(Command::parse("update users u1").is_err());
        assert!(Command::parse("get users").is_err());
    }

    #[test]
    fn test_parse_transactions() {
        assert_eq!(Command::parse("begin").unwrap(), Command::Begin { tx_id: None });
        assert_eq!(
            Command::parse("tx exec t1 create users {\"n\": 1}").unwrap(),
            Command::Execute {
                tx_id: "t1".to_string(),
                kind: "create".to_string(),
                collection: "users".to_string(),
                record_id: None,
                payload: Some(json!({"n": 1})),
            }
        );
        assert_eq!(
            Command::parse("tx exec t1 delete users u1").unwrap(),
            Command::Execute {
                tx_id: "t1".to_string(),
                kind: "delete".to_string(),
                collection: "users".to_string(),
                record_id: Some("u1".to_string()),
                payload: None,
            }
        );
        assert_eq!(
            Command::parse("tx cleanup 45").unwrap(),
            Command::TxCleanup { minutes: Some(45) }
        );
        assert_eq!(Command::parse("TX ABORT-ALL").unwrap(), Command::TxAbortAll);
        assert!(Command::parse("tx cleanup soon").is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Command::parse("select * from users"),
            Err(DatabaseError::InvalidCommand(_))
        ));
        assert!(Command::parse("").is_err());
        assert!(Command::parse("create users {broken").is_err());
        assert!(Command::parse("collections extra").is_err());
        assert_eq!(
            Command::parse("history 5").unwrap(),
            Command::History { limit: Some(5) }
        );
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::Null), "NULL");
        assert_eq!(format_value(&json!(true)), "true");
        assert_eq!(format_value(&json!(42)), "42");
        assert_eq!(format_value(&json!("hello")), "hello");
        assert_eq!(format_value(&json!([1, 2])), "[1,2]");
    }
}
