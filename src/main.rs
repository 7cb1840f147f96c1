//! Sprig - micro-task focus companion
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sprig::cli::focus::format_status_line;
use sprig::cli::{
    CommandOutcome, DispatchCommand, DoctorCommand, FocusCommand, MicroCommand, OutputOptions,
    RewardsCommand, TaskCommand, ThoughtCommand,
};
use sprig::config::{crash_log_path, Config};
use sprig::core::{Clock, RewardEngine, RngSource, Store, SystemClock};
use sprig::error::{exit_codes, Result, SprigError};
use sprig::storage::{
    BackgroundGateway, BlobGateway, BlobStore, FileBlobStore, StateGateway, APP_STATE_KEY,
};

// =============================================================================
// CLI Definition
// =============================================================================

/// Sprig - break work into micro-tasks and focus on one at a time
#[derive(Parser)]
#[command(name = "sprig")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, short, global = true)]
    json: bool,

    /// Suppress output
    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Manage a task's micro-tasks
    Micro {
        #[command(subcommand)]
        action: MicroAction,
    },

    /// Run a focus session
    Focus {
        #[command(subcommand)]
        action: FocusAction,
    },

    /// Capture and triage thoughts
    Thought {
        #[command(subcommand)]
        action: ThoughtAction,
    },

    /// Show completion and reward statistics
    Rewards,

    /// Check the saved state without changing it
    Doctor,

    /// Apply a raw JSON action ({"type": ..., "payload": ...})
    Dispatch {
        /// The action document
        action: String,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Add a task
    Add {
        title: String,
        #[arg(long, short)]
        description: Option<String>,
        /// Due date (YYYY-MM-DD, "YYYY-MM-DD HH:MM", RFC 3339 or free text)
        #[arg(long)]
        due: Option<String>,
    },
    /// List tasks
    List {
        /// Show archived tasks instead of active ones
        #[arg(long)]
        archived: bool,
    },
    /// Mark a task completed
    Done { id: String },
    /// Delete a task
    Delete { id: String },
    /// Archive every unfinished task
    ArchiveOverdue,
}

#[derive(Subcommand)]
enum MicroAction {
    /// Add a micro-task to a task
    Add {
        task_id: String,
        title: String,
        /// Estimated minutes (1-15)
        #[arg(long, short)]
        minutes: Option<i64>,
    },
    /// Complete a micro-task
    Complete { task_id: String, micro_id: String },
}

#[derive(Subcommand)]
enum FocusAction {
    /// Start focusing on a task or one of its micro-tasks
    Start {
        task_id: String,
        micro_id: Option<String>,
        #[arg(long, short)]
        minutes: Option<u32>,
    },
    /// Pause the running session
    Pause,
    /// Resume a paused session
    Resume,
    /// End the session
    End,
    /// Show the session countdown
    Status,
    /// Count down until the session ends
    Wait,
}

#[derive(Subcommand)]
enum ThoughtAction {
    /// Capture a thought
    Add {
        content: String,
        /// Mark as dictated
        #[arg(long)]
        voice: bool,
        /// Link to a task
        #[arg(long)]
        link: Option<String>,
    },
    /// List the inbox
    List {
        /// Include processed thoughts
        #[arg(long)]
        all: bool,
    },
    /// Mark a thought processed
    Process { id: String },
    /// Delete a thought
    Delete { id: String },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();
    setup_logging();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("sprig error: {}", e);
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

/// Log to stderr, filtered by `SPRIG_LOG` (default `warn`).
fn setup_logging() {
    let filter = EnvFilter::try_from_env("SPRIG_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Set up the global panic handler.
///
/// On panic, logs to ~/.sprig/crash.log and exits with code 3.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("sprig panic: {}", info);

        if let Some(crash_log) = crash_log_path() {
            if let Some(parent) = crash_log.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

type CliStore = Store<Box<dyn StateGateway>, SystemClock>;
type CliEngine = RewardEngine<RngSource<rand::rngs::StdRng>, SystemClock, Arc<FileBlobStore>>;

/// Everything a command needs, opened once per invocation.
struct Context {
    config: Config,
    blobs: Arc<FileBlobStore>,
    options: OutputOptions,
}

impl Context {
    fn new(options: OutputOptions) -> Result<Self> {
        let config = Config::load();
        let dir = config
            .state_dir()
            .ok_or_else(|| SprigError::config("cannot determine state directory"))?;
        let blobs = Arc::new(FileBlobStore::with_dir(dir)?);
        Ok(Self {
            config,
            blobs,
            options,
        })
    }

    fn open_store(&self) -> CliStore {
        let gateway: Box<dyn StateGateway> = if self.config.storage.background_writes {
            let blobs: Arc<dyn BlobStore> = self.blobs.clone();
            Box::new(BackgroundGateway::new(blobs, APP_STATE_KEY))
        } else {
            Box::new(BlobGateway::new(Arc::clone(&self.blobs), APP_STATE_KEY))
        };
        Store::open(gateway, SystemClock)
    }

    fn open_engine(&self) -> CliEngine {
        RewardEngine::new(
            RngSource::from_entropy(),
            SystemClock,
            Arc::clone(&self.blobs),
            self.config.rewards.settings(),
        )
    }
}

/// Print formatted output and map the outcome to an exit code.
fn finish<T: CommandOutcome>(output: &T, text: String) -> ExitCode {
    print!("{}", text);
    outcome_to_exit_code(output.succeeded())
}

/// Convert a command outcome to an exit code.
fn outcome_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::OK as u8)
    } else {
        ExitCode::from(exit_codes::USAGE as u8)
    }
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let options = OutputOptions {
        json: cli.json,
        quiet: cli.quiet,
    };
    let ctx = Context::new(options)?;

    let code = match cli.command {
        Commands::Task { action } => run_task(&ctx, action),
        Commands::Micro { action } => run_micro(&ctx, action),
        Commands::Focus { action } => run_focus(&ctx, action),
        Commands::Thought { action } => run_thought(&ctx, action),
        Commands::Rewards => run_rewards(&ctx),
        Commands::Doctor => run_doctor(&ctx),
        Commands::Dispatch { action } => run_dispatch(&ctx, &action),
    };
    Ok(code)
}

// =============================================================================
// Command Implementations
// =============================================================================

fn run_task(ctx: &Context, action: TaskAction) -> ExitCode {
    let mut store = ctx.open_store();
    let mut cmd = TaskCommand::new(&mut store);

    let output = match action {
        TaskAction::Add {
            title,
            description,
            due,
        } => cmd.add(&title, description.as_deref(), due.as_deref()),
        TaskAction::List { archived } => cmd.list(archived),
        TaskAction::Done { id } => cmd.done(&id),
        TaskAction::Delete { id } => cmd.delete(&id),
        TaskAction::ArchiveOverdue => cmd.archive_overdue(),
    };
    let code = finish(&output, cmd.format_output(&output, &ctx.options));
    store.flush();
    code
}

fn run_micro(ctx: &Context, action: MicroAction) -> ExitCode {
    let mut store = ctx.open_store();
    let mut cmd = MicroCommand::new(&mut store, &ctx.config);

    let output = match action {
        MicroAction::Add {
            task_id,
            title,
            minutes,
        } => cmd.add(&task_id, &title, minutes),
        MicroAction::Complete { task_id, micro_id } => {
            let mut engine = ctx.open_engine();
            cmd.complete(&task_id, &micro_id, &mut engine)
        }
    };
    let code = finish(&output, cmd.format_output(&output, &ctx.options));
    store.flush();
    code
}

fn run_focus(ctx: &Context, action: FocusAction) -> ExitCode {
    let mut store = ctx.open_store();
    let mut cmd = FocusCommand::new(&mut store, &ctx.config);

    let output = match action {
        FocusAction::Start {
            task_id,
            micro_id,
            minutes,
        } => cmd.start(&task_id, micro_id.as_deref(), minutes),
        FocusAction::Pause => cmd.pause(),
        FocusAction::Resume => cmd.resume(),
        FocusAction::End => cmd.end(),
        FocusAction::Status => cmd.status(),
        FocusAction::Wait => {
            let mut engine = ctx.open_engine();
            let show_progress = !ctx.options.json && !ctx.options.quiet;
            let output = cmd.wait(&mut engine, std::thread::sleep, |status| {
                if show_progress {
                    eprint!("\r{}  ", format_status_line(status));
                    let _ = std::io::stderr().flush();
                }
            });
            if show_progress {
                eprintln!();
            }
            output
        }
    };
    let code = finish(&output, cmd.format_output(&output, &ctx.options));
    store.flush();
    code
}

fn run_thought(ctx: &Context, action: ThoughtAction) -> ExitCode {
    let mut store = ctx.open_store();
    let mut cmd = ThoughtCommand::new(&mut store);

    let output = match action {
        ThoughtAction::Add {
            content,
            voice,
            link,
        } => cmd.add(&content, voice, link.as_deref()),
        ThoughtAction::List { all } => cmd.list(all),
        ThoughtAction::Process { id } => cmd.process(&id),
        ThoughtAction::Delete { id } => cmd.delete(&id),
    };
    let code = finish(&output, cmd.format_output(&output, &ctx.options));
    store.flush();
    code
}

fn run_rewards(ctx: &Context) -> ExitCode {
    let mut engine = ctx.open_engine();
    let mut cmd = RewardsCommand::new(&mut engine);
    let output = cmd.run(SystemClock.now_ms());
    finish(&output, cmd.format_output(&output, &ctx.options))
}

fn run_doctor(ctx: &Context) -> ExitCode {
    let gateway = BlobGateway::new(Arc::clone(&ctx.blobs), APP_STATE_KEY);
    let cmd = DoctorCommand::new(&gateway);
    let output = cmd.run();
    finish(&output, cmd.format_output(&output, &ctx.options))
}

fn run_dispatch(ctx: &Context, action: &str) -> ExitCode {
    let mut store = ctx.open_store();
    let mut cmd = DispatchCommand::new(&mut store);
    let output = cmd.run(action);
    let code = finish(&output, cmd.format_output(&output, &ctx.options));
    store.flush();
    code
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_codes::OK, 0);
        assert_eq!(exit_codes::ERROR, 1);
        assert_eq!(exit_codes::USAGE, 2);
        assert_eq!(exit_codes::CRASH, 3);
    }

    #[test]
    fn test_outcome_to_exit_code() {
        assert_eq!(
            outcome_to_exit_code(true),
            ExitCode::from(exit_codes::OK as u8)
        );
        assert_eq!(
            outcome_to_exit_code(false),
            ExitCode::from(exit_codes::USAGE as u8)
        );
    }

    #[test]
    fn test_cli_parse_task_add() {
        let cli = Cli::parse_from([
            "sprig",
            "task",
            "add",
            "Write report",
            "--due",
            "2026-11-01",
            "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Task {
                action: TaskAction::Add { title, due, .. },
            } => {
                assert_eq!(title, "Write report");
                assert_eq!(due.as_deref(), Some("2026-11-01"));
            }
            _ => panic!("Expected task add"),
        }
    }

    #[test]
    fn test_cli_parse_archive_overdue() {
        let cli = Cli::parse_from(["sprig", "task", "archive-overdue", "-q"]);
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Task {
                action: TaskAction::ArchiveOverdue
            }
        ));
    }

    #[test]
    fn test_cli_parse_micro_add() {
        let cli = Cli::parse_from(["sprig", "micro", "add", "t1", "Outline", "--minutes", "7"]);
        match cli.command {
            Commands::Micro {
                action:
                    MicroAction::Add {
                        task_id,
                        title,
                        minutes,
                    },
            } => {
                assert_eq!(task_id, "t1");
                assert_eq!(title, "Outline");
                assert_eq!(minutes, Some(7));
            }
            _ => panic!("Expected micro add"),
        }
    }

    #[test]
    fn test_cli_parse_focus_start() {
        let cli = Cli::parse_from(["sprig", "focus", "start", "t1", "m1", "-m", "20"]);
        match cli.command {
            Commands::Focus {
                action:
                    FocusAction::Start {
                        task_id,
                        micro_id,
                        minutes,
                    },
            } => {
                assert_eq!(task_id, "t1");
                assert_eq!(micro_id.as_deref(), Some("m1"));
                assert_eq!(minutes, Some(20));
            }
            _ => panic!("Expected focus start"),
        }
    }

    #[test]
    fn test_cli_parse_thought_add() {
        let cli = Cli::parse_from(["sprig", "thought", "add", "buy milk", "--voice", "--link", "t1"]);
        match cli.command {
            Commands::Thought {
                action:
                    ThoughtAction::Add {
                        content,
                        voice,
                        link,
                    },
            } => {
                assert_eq!(content, "buy milk");
                assert!(voice);
                assert_eq!(link.as_deref(), Some("t1"));
            }
            _ => panic!("Expected thought add"),
        }
    }

    #[test]
    fn test_cli_parse_dispatch() {
        let cli = Cli::parse_from(["sprig", "dispatch", r#"{"type":"END_FOCUS"}"#]);
        match cli.command {
            Commands::Dispatch { action } => assert_eq!(action, r#"{"type":"END_FOCUS"}"#),
            _ => panic!("Expected dispatch"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["sprig", "grow"]).is_err());
    }
}
