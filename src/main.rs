//! SnapStore - a checkpointed collection store
//!
//! This is the main entry point for the SnapStore command-line interface.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use snapstore::db::{Database, DatabaseConfig, Repl, SnapshotBackend};

#[derive(Debug, Parser)]
#[command(name = "snapstore", version, about = "A checkpointed collection store")]
struct Cli {
    /// Path to the data directory
    #[arg(default_value = ".snapstore", env = "SNAPSTORE_DIR")]
    data_dir: PathBuf,

    /// Execute one command and exit
    #[arg(short, long, value_name = "COMMAND")]
    execute: Option<String>,

    /// Snapshot log implementation
    #[arg(long, value_enum, default_value_t = Backend::Git, env = "SNAPSTORE_BACKEND")]
    backend: Backend,

    /// Minutes after which `tx cleanup` rolls a transaction back
    #[arg(long, value_name = "MINUTES")]
    stale_after: Option<i64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Git,
    Memory,
}

impl From<Backend> for SnapshotBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Git => SnapshotBackend::Git,
            Backend::Memory => SnapshotBackend::Memory,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = DatabaseConfig::new(&cli.data_dir)
        .create_if_missing(true)
        .backend(cli.backend.into());
    if let Some(minutes) = cli.stale_after {
        config = match config.stale_after_minutes(minutes) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: --stale-after: {}", e);
                return ExitCode::FAILURE;
            }
        };
    }

    let db = match Database::open_with_config(config) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error opening database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Execute single command or run REPL.
    if let Some(command) = cli.execute {
        match db.execute(&command) {
            Ok(output) => {
                print!("{}", output);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error ({}): {}", e.kind(), e);
                ExitCode::FAILURE
            }
        }
    } else {
        match Repl::new(db).run() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        }
    }
}

/// Logs go to stderr so `-e` output stays pipeable.
fn init_logging(verbose: bool) {
    let default = if verbose { "snapstore=debug" } else { "snapstore=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("SNAPSTORE_LOG").unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
