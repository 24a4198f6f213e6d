//! `rusty-flow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    start the API server with an in-process worker.
//! - `worker`   start a worker for scheduled runs.
//! - `run`      execute a run request file locally.
//! - `validate` print the execution order of a run request file.
//! - `migrate`  run pending database migrations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use api::AppState;
use db::DbPool;
use engine::{
    LogStore, MemoryLogStore, RunLog, RunLogConfig, RunRequest, SqliteLogStore, WorkflowEngine,
};
use nodes::builtin::register_builtins;
use nodes::HandlerRegistry;
use queue::{DeferredScheduler, Worker, WorkerConfig};

mod offline;

use offline::{EchoCompletion, FixtureMailbox, LoggingPages};

const DEFAULT_DATABASE_URL: &str = "sqlite://rusty-flow.db?mode=rwc";

#[derive(Parser)]
#[command(
    name = "rusty-flow",
    about = "Step-graph workflow engine",
    version
)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct Config {
    #[arg(long, global = true, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    /// How often the worker looks for due runs.
    #[arg(long, global = true, env = "RUSTY_FLOW_WORKER_POLL_MS", default_value_t = 1000)]
    worker_poll_ms: u64,

    /// How long a claimed run may go without a heartbeat before it is re-queued.
    #[arg(long, global = true, env = "RUSTY_FLOW_WORKER_LEASE_MS", default_value_t = 30_000)]
    worker_lease_ms: u64,

    /// Upper bound on how long a log follower waits before re-reading.
    #[arg(long, global = true, env = "RUSTY_FLOW_LOG_POLL_MS", default_value_t = 1000)]
    log_poll_ms: u64,

    /// JSON array of messages served by the offline mailbox.
    #[arg(long, global = true, env = "RUSTY_FLOW_MAILBOX_FIXTURE")]
    mailbox_fixture: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server and an in-process worker.
    Serve {
        #[arg(long, env = "RUSTY_FLOW_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Start a background worker that fires scheduled runs.
    Worker,
    /// Execute a run request JSON file and print the report.
    Run {
        path: PathBuf,
        /// Service credential, as `service=token`. Repeatable.
        #[arg(long = "token", value_parser = parse_token)]
        tokens: Vec<(String, String)>,
    },
    /// Validate a run request JSON file.
    Validate {
        /// Path to the run request JSON file.
        path: PathBuf,
    },
    /// Run pending database migrations.
    Migrate,
}

fn parse_token(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((service, token)) if !service.is_empty() && !token.is_empty() => {
            Ok((service.to_owned(), token.to_owned()))
        }
        _ => Err(format!("expected service=token, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    match cli.command {
        Command::Serve { bind } => serve(&config, &bind).await,
        Command::Worker => worker(&config).await,
        Command::Run { path, tokens } => run(&config, &path, tokens).await,
        Command::Validate { path } => validate(&path),
        Command::Migrate => {
            info!("Running migrations against {}", config.database_url);
            open_pool(&config).await?;
            info!("Migrations applied successfully");
            Ok(())
        }
    }
}

async fn serve(config: &Config, bind: &str) -> Result<()> {
    let pool = open_pool(config).await?;
    let engine = build_engine(config, Arc::new(SqliteLogStore::new(pool.clone())));
    let shutdown = shutdown_on_ctrl_c();

    let worker = Worker::new(pool.clone(), engine.clone(), worker_config(config));
    let worker_task = tokio::spawn(worker.run(shutdown.clone()));

    let state = AppState::new(engine, DeferredScheduler::new(pool));
    let stop = shutdown.clone();
    api::serve(bind, state, async move { stop.cancelled().await })
        .await
        .context("API server failed")?;

    shutdown.cancel();
    worker_task.await??;
    Ok(())
}

async fn worker(config: &Config) -> Result<()> {
    info!("Starting background worker");
    let pool = open_pool(config).await?;
    let engine = build_engine(config, Arc::new(SqliteLogStore::new(pool.clone())));
    let worker = Worker::new(pool, engine, worker_config(config));
    worker.run(shutdown_on_ctrl_c()).await?;
    Ok(())
}

async fn run(config: &Config, path: &Path, tokens: Vec<(String, String)>) -> Result<()> {
    let mut request = read_request(path)?;
    for (service, token) in tokens {
        request.credentials.insert(service, token);
    }

    let engine = build_engine(config, Arc::new(MemoryLogStore::new()));
    let outcome = engine.submit(request).await;
    let (run_id, printed) = match &outcome {
        Ok(report) => (report.run_id.clone(), serde_json::to_string_pretty(report)?),
        Err(failure) => (
            failure.report.run_id.clone(),
            serde_json::to_string_pretty(&failure.report)?,
        ),
    };

    for entry in engine.run_log().tail(&run_id, 0).await? {
        eprintln!("[{}] {}", entry.seq, entry.text);
    }
    println!("{printed}");

    match outcome {
        Ok(_) => Ok(()),
        Err(failure) => Err(failure.into()),
    }
}

fn validate(path: &Path) -> Result<()> {
    let request = read_request(path)?;
    match engine::execution_order(&request.steps, &request.edges) {
        Ok(order) => {
            println!("Workflow is valid. Execution order: {}", order.join(" -> "));
            Ok(())
        }
        Err(e) => bail!("validation failed: {e}"),
    }
}

fn read_request(path: &Path) -> Result<RunRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid run request in {}", path.display()))
}

async fn open_pool(config: &Config) -> Result<DbPool> {
    let pool = db::pool::create_pool(&config.database_url, 10)
        .await
        .context("failed to connect to database")?;
    db::pool::run_migrations(&pool)
        .await
        .context("migration failed")?;
    Ok(pool)
}

/// Engine with the built-in handlers. `serve` and `worker` share their
/// run log through the database; `run` keeps it in memory.
fn build_engine(config: &Config, log_store: Arc<dyn LogStore>) -> WorkflowEngine {
    let mut registry = HandlerRegistry::new();
    register_builtins(
        &mut registry,
        FixtureMailbox::new(config.mailbox_fixture.clone()),
        LoggingPages,
        EchoCompletion,
    );
    let run_log = RunLog::new(
        log_store,
        RunLogConfig {
            poll_interval: Duration::from_millis(config.log_poll_ms),
        },
    );
    WorkflowEngine::new(Arc::new(registry), Arc::new(run_log))
}

fn worker_config(config: &Config) -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(config.worker_poll_ms),
        lease: Duration::from_millis(config.worker_lease_ms),
    }
}

/// A token cancelled on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {}", e);
            return;
        }
        info!("shutting down");
        trigger.cancel();
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_flags_split_on_first_equals() {
        assert_eq!(
            parse_token("gmail=a=b").unwrap(),
            ("gmail".to_string(), "a=b".to_string())
        );
        assert!(parse_token("gmail").is_err());
        assert!(parse_token("=x").is_err());
        assert!(parse_token("gmail=").is_err());
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["rusty-flow", "validate", "wf.json"]).unwrap();
        assert_eq!(cli.config.worker_poll_ms, 1000);
        assert_eq!(cli.config.worker_lease_ms, 30_000);
        assert!(matches!(cli.command, Command::Validate { .. }));
    }
}
