//! TaskPulse - local-first task tracking with git-based completion
//! detection.
//!
//! # Commands
//!
//! - `taskpulse init`: create the data directory and a seed backlog
//! - `taskpulse sync`: push a session todo list into the backlog
//! - `taskpulse detect`: run one completion-detection cycle
//! - `taskpulse list`: list tracked todos
//! - `taskpulse complete <id>`: mark a todo completed
//! - `taskpulse promote <id>`: promote a staged todo into the backlog
//! - `taskpulse progress`: print the progress report
//! - `taskpulse analytics`: print the analytics snapshot
//! - `taskpulse suggest`: suggest the next todos to pick up
//! - `taskpulse start`: run the background scheduler and status API
//!
//! # Environment Variables
//!
//! See the engine and daemon [`config`](taskpulse_daemon::config) modules
//! for available configuration options.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use taskpulse_daemon::config::DaemonConfig;
use taskpulse_daemon::routes::{create_router, AppState};
use taskpulse_daemon::scheduler::Scheduler;
use taskpulse_engine::{EngineConfig, GitCli, Orchestrator, Partition, Todo, TodoStatus};

/// TaskPulse - local-first task tracking with git-based completion
/// detection.
///
/// Maintains a durable backlog of work items, reconciles per-session todo
/// lists against it, and infers completions from repository activity.
#[derive(Parser, Debug)]
#[command(name = "taskpulse")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    TASKPULSE_REPO_DIR                 Repository to inspect (default: .)
    TASKPULSE_DATA_DIR                 Store directory (default: ~/.taskpulse)
    TASKPULSE_BACKLOG_PATH             Backlog document (default: <repo>/BACKLOG.md)
    TASKPULSE_BACKUPS                  Timestamped store backups (default: false)
    TASKPULSE_GIT_TIMEOUT_SECS         Git query timeout (default: 5)
    PORT                               Status server port (default: 8600)
    TASKPULSE_DETECTION_INTERVAL_SECS  Detection cycle period (default: 120)
    TASKPULSE_SYNC_INTERVAL_SECS       Sync cycle period (default: 600)
    TASKPULSE_WATCH                    Filesystem watcher toggle (default: true)

EXAMPLES:
    # Import the backlog and run one detection pass
    taskpulse init
    taskpulse detect

    # Push a session todo list
    taskpulse sync --file session-todos.json

    # Run the background service
    taskpulse start
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Create the data directory, store file, and a seed backlog document.
    Init,

    /// Merge a session todo list (JSON array) into the backlog.
    Sync {
        /// File holding the session todo list; stdin when omitted.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the sync result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run one completion-detection cycle and print the results.
    Detect {
        /// Print detections as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List tracked todos.
    List {
        /// Restrict to one partition: session, project, future, archived.
        #[arg(short, long)]
        partition: Option<String>,

        /// Print todos as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Mark a todo completed.
    Complete {
        /// Todo identifier.
        id: String,

        /// Reason recorded in the audit tag.
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Promote a staged or future todo into the project backlog.
    Promote {
        /// Todo identifier.
        id: String,

        /// Category assigned on promotion.
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Print the progress report.
    Progress {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the analytics snapshot.
    Analytics {
        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Suggest the next todos to pick up.
    Suggest {
        /// Paths you are currently working in, for relevance ranking.
        #[arg(short, long)]
        context: Vec<String>,

        /// Print suggestions as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the background scheduler and status API until interrupted.
    Start,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(matches!(cli.command, Command::Start));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run_command(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Dispatches one CLI command.
async fn run_command(command: Command) -> Result<()> {
    match command {
        Command::Init => run_init().await,
        Command::Sync { file, json } => run_sync(file, json).await,
        Command::Detect { json } => run_detect(json).await,
        Command::List { partition, json } => run_list(partition, json).await,
        Command::Complete { id, reason } => run_complete(&id, reason).await,
        Command::Promote { id, category } => run_promote(&id, category).await,
        Command::Progress { json } => run_progress(json).await,
        Command::Analytics { json } => run_analytics(json).await,
        Command::Suggest { context, json } => run_suggest(context, json).await,
        Command::Start => run_start().await,
    }
}

/// Builds the orchestrator over the subprocess git reader.
fn build_orchestrator() -> Result<(Arc<Orchestrator>, EngineConfig)> {
    let config = EngineConfig::from_env().context("failed to load configuration")?;
    let vcs = GitCli::new(
        config.repo_dir.clone(),
        Duration::from_secs(config.git_timeout_secs),
    );
    let orchestrator = Arc::new(Orchestrator::new(config.clone(), Arc::new(vcs)));
    Ok((orchestrator, config))
}

/// Builds and initializes the orchestrator for interactive commands.
async fn initialized_orchestrator() -> Result<(Arc<Orchestrator>, EngineConfig)> {
    let (orchestrator, config) = build_orchestrator()?;
    orchestrator.initialize().await?;
    Ok((orchestrator, config))
}

async fn run_init() -> Result<()> {
    let (orchestrator, config) = build_orchestrator()?;

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("failed to create data directory {}", config.data_dir.display())
    })?;

    orchestrator.initialize().await?;
    orchestrator.shutdown().await?;

    if !config.backlog_path.exists() {
        taskpulse_engine::backlog::write_document(&config.backlog_path, &[], &[])
            .context("failed to write seed backlog document")?;
        println!("created backlog document at {}", config.backlog_path.display());
    }

    println!("store initialized at {}", config.store_path().display());
    Ok(())
}

async fn run_sync(file: Option<PathBuf>, json: bool) -> Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read session todos from stdin")?;
            buf
        }
    };

    let todos: Vec<Todo> =
        serde_json::from_str(&text).context("session todo list is not a valid JSON array")?;

    let (orchestrator, _) = initialized_orchestrator().await?;
    let result = orchestrator.sync_session_todos(todos).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "synced: {} added, {} merged, {} completed, {} conflicts",
            result.added.len(),
            result.merged.len(),
            result.completed.len(),
            result.conflicts.len()
        );
        for conflict in &result.conflicts {
            println!(
                "  conflict on {} ({}): stored \"{}\" vs incoming \"{}\" - {}",
                conflict.todo_id,
                conflict.field,
                conflict.existing,
                conflict.incoming,
                conflict.recommendation
            );
        }
    }
    Ok(())
}

async fn run_detect(json: bool) -> Result<()> {
    let (orchestrator, _) = initialized_orchestrator().await?;
    let results = orchestrator.run_completion_detection().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("no completions detected");
    } else {
        for result in &results {
            println!(
                "{} [{:?} {:.2}] {:?}: {}",
                result.todo_id,
                result.detection_type,
                result.confidence,
                result.suggested_action,
                result.evidence
            );
        }
    }
    Ok(())
}

async fn run_list(partition: Option<String>, json: bool) -> Result<()> {
    let partition = partition.map(|name| parse_partition(&name)).transpose()?;
    let (orchestrator, _) = initialized_orchestrator().await?;
    let todos = orchestrator.list_todos(partition).await;

    if json {
        let entries: Vec<serde_json::Value> = todos
            .iter()
            .map(|(partition, todo)| {
                serde_json::json!({ "partition": partition, "todo": todo })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if todos.is_empty() {
        println!("no todos tracked");
    } else {
        for (partition, todo) in &todos {
            println!(
                "{:<9} {:<22} {:<12} {:<8} {}",
                format!("{partition:?}").to_lowercase(),
                todo.id,
                status_label(todo.status),
                format!("{:?}", todo.priority).to_lowercase(),
                todo.content
            );
        }
    }
    Ok(())
}

async fn run_complete(id: &str, reason: Option<String>) -> Result<()> {
    let (orchestrator, _) = initialized_orchestrator().await?;
    let todo = orchestrator.mark_todo_completed(id, reason).await?;
    println!("completed {} \"{}\"", todo.id, todo.content);
    Ok(())
}

async fn run_promote(id: &str, category: Option<String>) -> Result<()> {
    let (orchestrator, _) = initialized_orchestrator().await?;
    let todo = orchestrator.promote_todo(id, category).await?;
    println!(
        "promoted {} into the project backlog (category: {})",
        todo.id,
        todo.category.as_deref().unwrap_or("none")
    );
    Ok(())
}

async fn run_progress(json: bool) -> Result<()> {
    let (orchestrator, _) = initialized_orchestrator().await?;
    let report = orchestrator.generate_progress_report().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}/{} completed ({:.0}%), velocity {} per week",
            report.completed,
            report.total,
            report.completion_rate * 100.0,
            report.velocity
        );
        if let Some(hours) = report.average_completion_hours {
            println!("average completion effort: {hours:.1}h");
        }
        if let Some(projected) = report.projected_completion {
            println!("projected completion: {}", projected.format("%Y-%m-%d"));
        }
        if !report.top_pending.is_empty() {
            println!("next up:");
            for todo in &report.top_pending {
                println!(
                    "  {:<8} {} {}",
                    format!("{:?}", todo.priority).to_lowercase(),
                    todo.id,
                    todo.content
                );
            }
        }
    }
    Ok(())
}

async fn run_analytics(json: bool) -> Result<()> {
    let (orchestrator, _) = initialized_orchestrator().await?;
    let snapshot = orchestrator.analytics_snapshot().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("velocity: {} completions in the trailing 7 days", snapshot.velocity);
        if let Some(hours) = snapshot.average_completion_hours {
            println!("average completion effort: {hours:.1}h");
        }
        if snapshot.bottlenecks.is_empty() {
            println!("no bottlenecks");
        } else {
            println!("bottlenecks:");
            for bottleneck in &snapshot.bottlenecks {
                println!("  {} {} - {}", bottleneck.todo_id, bottleneck.content, bottleneck.reason);
            }
        }
        for category in &snapshot.categories {
            println!(
                "  {}: {}/{} completed",
                category.category, category.completed, category.total
            );
        }
    }
    Ok(())
}

async fn run_suggest(context: Vec<String>, json: bool) -> Result<()> {
    let (orchestrator, _) = initialized_orchestrator().await?;
    let suggestions = orchestrator.get_smart_suggestions(&context).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
    } else if suggestions.is_empty() {
        println!("nothing unblocked to suggest");
    } else {
        for suggestion in &suggestions {
            println!(
                "{} {} ({})",
                suggestion.todo.id, suggestion.todo.content, suggestion.reason
            );
        }
    }
    Ok(())
}

/// Runs the background scheduler and status API until interrupted.
async fn run_start() -> Result<()> {
    let daemon_config = DaemonConfig::from_env().context("failed to load daemon configuration")?;
    let (orchestrator, engine_config) = build_orchestrator()?;

    let scheduler = Scheduler::new(
        Arc::clone(&orchestrator),
        engine_config,
        daemon_config.clone(),
    );
    scheduler.start().await?;

    let state = AppState::new(Arc::clone(&orchestrator), scheduler.status());
    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{}", daemon_config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(address = %bind_addr, "status server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown());
    if let Err(e) = server.await {
        error!(error = %e, "status server error");
    }

    scheduler.stop().await?;
    info!("shutdown complete");
    Ok(())
}

/// Initializes the logging subsystem.
///
/// The long-running service logs JSON for machine consumption; interactive
/// commands keep the compact human format.
fn init_logging(service: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if service {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}

/// Parses a partition name.
fn parse_partition(name: &str) -> Result<Partition> {
    match name.to_ascii_lowercase().as_str() {
        "session" => Ok(Partition::Session),
        "project" => Ok(Partition::Project),
        "future" => Ok(Partition::Future),
        "archived" => Ok(Partition::Archived),
        other => anyhow::bail!(
            "unknown partition '{other}' (expected session, project, future, or archived)"
        ),
    }
}

/// Lowercase status label for the list output.
fn status_label(status: TodoStatus) -> &'static str {
    match status {
        TodoStatus::Pending => "pending",
        TodoStatus::InProgress => "in_progress",
        TodoStatus::Completed => "completed",
        TodoStatus::Blocked => "blocked",
        TodoStatus::Cancelled => "cancelled",
    }
}
