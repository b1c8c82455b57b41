//! Interactive REPL (Read-Eval-Print Loop) for SnapStore.

use std::io::{self, BufRead, Write};

use super::api::{Database, DatabaseResult};

/// REPL configuration.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Prompt string.
    pub prompt: String,
    /// Show timing information.
    pub timing: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "snapstore> ".into(),
            timing: true,
        }
    }
}

/// The interactive REPL.
pub struct Repl {
    db: Database,
    config: ReplConfig,
    history: Vec<String>,
}

/// What the REPL does after a dot command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

impl Repl {
    /// Create a new REPL with the given database.
    pub fn new(db: Database) -> Self {
        Self::with_config(db, ReplConfig::default())
    }

    /// Create a REPL with custom configuration.
    pub fn with_config(db: Database, config: ReplConfig) -> Self {
        Self {
            db,
            config,
            history: Vec::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run the REPL interactively.
    pub fn run(&mut self) -> DatabaseResult<()> {
        self.print_banner();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("{}", self.config.prompt);
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                println!("\nGoodbye!");
                break;
            }

            let cmd = line.trim();
            if cmd.is_empty() {
                continue;
            }
            self.history.push(cmd.to_string());

            if is_dot_command(cmd) {
                if self.handle_command(cmd) == Flow::Exit {
                    break;
                }
                continue;
            }

            let start = std::time::Instant::now();
            match self.db.execute(cmd) {
                Ok(output) => {
                    print!("{}", output);
                    if self.config.timing {
                        println!("Time: {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
                    }
                }
                Err(e) => eprintln!("Error ({}): {}", e.kind(), e),
            }
        }

        let outcomes = self.db.abort_all();
        if !outcomes.is_empty() {
            println!("Rolled back {} open transaction(s).", outcomes.len());
        }
        Ok(())
    }

    fn print_banner(&self) {
        println!("╔═══════════════════════════════════════════════════╗");
        println!("║                  SnapStore v0.1.0                 ║");
        println!("║     A Checkpointed Collection Store ({:<6})      ║", self.db.config().backend.as_str());
        println!("╠═══════════════════════════════════════════════════╣");
        println!("║    Type .help for commands, or enter a command    ║");
        println!("╚═══════════════════════════════════════════════════╝");
        println!();
    }

    fn handle_command(&mut self, cmd: &str) -> Flow {
        let cmd = cmd.trim_start_matches(&['.', '\\'][..]);
        let command = cmd.split_whitespace().next().map(str::to_lowercase);

        match command.as_deref() {
            Some("help") | Some("h") | Some("?") => print_help(),
            Some("quit") | Some("exit") | Some("q") => return Flow::Exit,
            Some("history") => self.print_history(),
            Some("clear") => {
                // ANSI clear screen
                print!("\x1B[2J\x1B[H");
            }
            Some("timing") => {
                self.config.timing = !self.config.timing;
                println!("Timing: {}", if self.config.timing { "on" } else { "off" });
            }
            Some(cmd) => {
                eprintln!("Unknown command: .{}", cmd);
                eprintln!("Type .help for available commands");
            }
            None => {}
        }

        Flow::Continue
    }

    fn print_history(&self) {
        println!("Command History:");
        for (i, cmd) in self.history.iter().enumerate() {
            println!("  {}: {}", i + 1, cmd);
        }
    }
}

fn is_dot_command(input: &str) -> bool {
    input.starts_with('.') || input.starts_with('\\')
}

fn print_help() {
    println!("REPL commands:");
    println!("  .help, .h, .?           Show this help message");
    println!("  .quit, .exit, .q        Exit the REPL");
    println!("  .history                Show command history");
    println!("  .timing                 Toggle timing display");
    println!("  .clear                  Clear the screen");
    println!();
    println!("Records:");
    println!("  list <collection>");
    println!("  get <collection> <id>");
    println!("  create <collection> <json>");
    println!("  update <collection> <id> <json>");
    println!("  delete <collection> <id>");
    println!("  collections | stats | history [n] | revert <snapshot>");
    println!();
    println!("Transactions:");
    println!("  begin [id]");
    println!("  tx exec <id> <create|update|delete> <collection> [record] [json]");
    println!("  commit <id> | rollback <id>");
    println!("  tx list | tx show <id> | tx stats");
    println!("  tx cleanup [minutes] | tx abort-all");
    println!();
}
