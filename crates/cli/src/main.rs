//! `rusty-automation-tool` CLI entry-point.
//!
//! Available sub-commands:
//! - `run-job`  — load the manifest, run a job to completion, print its
//!   correlation id and final status.
//! - `validate` — load and validate a manifest, printing every accumulated
//!   offense on failure.
//! - `query`    — reconstruct and print one execution tree by id.
//! - `list`     — list recorded executions with filtering/sorting.
//!
//! The CLI is a thin invocation surface; it exists only to give the engine
//! crates a way to be invoked from outside a test harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use engine::job::{JobDriver, RunJobArgs};
use manifest::Registry;
use query::{ExecutionType, ListFilter, SortField};
use runtime::RuntimeRegistry;
use store::Store;
use tasks::TaskRunner;

mod config;

use config::Config;

#[derive(Parser)]
#[command(
    name = "rusty-automation-tool",
    about = "Manifest-driven automation orchestrator",
    version
)]
struct Cli {
    /// Path to the top-level manifest.json.
    #[arg(long, global = true, default_value = "manifest.json")]
    manifest: PathBuf,

    /// Path to the engine config JSON (database/logging/service/...).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the runtime registry JSON (`{runtime: {env: path}}`).
    #[arg(long, global = true)]
    runtimes: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a job to completion.
    RunJob {
        /// The job's manifest name.
        name: String,
        /// Repeatable `key=value` input parameters.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Validate a manifest, printing every accumulated offense.
    Validate,
    /// Reconstruct and print one execution tree.
    Query {
        /// The root job's correlation id.
        execution_id: Uuid,
    },
    /// List recorded executions.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "type")]
        execution_type: Option<String>,
        #[arg(long)]
        top: Option<usize>,
    },
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    // A bare scalar is carried as a JSON string unless it already parses as
    // JSON (numbers, booleans, objects) — this lets `--param count=3` bind
    // a number while `--param name=extract` still binds a plain string.
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Validate => {
            match Registry::load(&cli.manifest) {
                Ok(registry) => {
                    for warning in &registry.warnings {
                        eprintln!("warning: {warning}");
                    }
                    println!(
                        "manifest is valid: {} task(s), {} workflow(s), {} job(s)",
                        registry.list_tasks().len(),
                        registry.list_workflows().len(),
                        registry.list_jobs().len(),
                    );
                    Ok(())
                }
                Err(err) => Err(anyhow::anyhow!(err)),
            }
        }
        Command::RunJob { name, params } => {
            let registry = Registry::load(&cli.manifest)?;
            let runtime_registry = load_runtime_registry(cli.runtimes.as_deref())?;
            let store = open_store(cli.config.as_deref()).await?;

            let base_dir = cli
                .manifest
                .parent()
                .map(std::path::Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let task_runner = TaskRunner::new(runtime_registry, base_dir, std::env::temp_dir());
            let driver = JobDriver::new(&registry, store.as_ref(), &task_runner);

            let mut input_params = Map::new();
            for (k, v) in params {
                input_params.insert(k, v);
            }

            info!(job = %name, "running job");
            let outcome = driver
                .run_job(RunJobArgs {
                    name,
                    input_params,
                    trigger_type: "Manual".to_string(),
                    execution_id: None,
                    is_child: false,
                })
                .await;

            match outcome {
                Ok(outcome) => {
                    println!("execution_id: {}", outcome.execution_id);
                    println!("status: Completed");
                    Ok(())
                }
                Err(err) => Err(anyhow::anyhow!(err)),
            }
        }
        Command::Query { execution_id } => {
            let store = open_store(cli.config.as_deref()).await?;
            let tree = query::get_execution(store.as_ref(), execution_id).await?;
            if tree.is_empty() {
                println!("no records found for execution id {execution_id}");
            }
            for record in tree {
                println!(
                    "{:<10} {:<24} {:<10} started={:?} ended={:?}",
                    format!("{:?}", record.execution_type()),
                    record.name(),
                    record.status(),
                    record.started_at(),
                    record.ended_at(),
                );
            }
            Ok(())
        }
        Command::List { status, execution_type, top } => {
            let store = open_store(cli.config.as_deref()).await?;
            let filter = ListFilter {
                status,
                execution_type: execution_type.as_deref().map(parse_execution_type).transpose()?,
                top,
                sort_by: Some(SortField::StartedAt),
                descending: true,
                ..Default::default()
            };
            let rows = query::list_executions(store.as_ref(), &filter).await?;
            for record in rows {
                println!(
                    "{:<10} {:<24} {:<10} runtime_ms={:?}",
                    format!("{:?}", record.execution_type()),
                    record.name(),
                    record.status(),
                    record.runtime_ms(),
                );
            }
            Ok(())
        }
    }
}

fn parse_execution_type(raw: &str) -> anyhow::Result<ExecutionType> {
    match raw {
        "job" => Ok(ExecutionType::Job),
        "workflow" => Ok(ExecutionType::Workflow),
        "task" => Ok(ExecutionType::Task),
        other => Err(anyhow::anyhow!("unknown --type '{other}' (expected job|workflow|task)")),
    }
}

fn load_runtime_registry(path: Option<&std::path::Path>) -> anyhow::Result<RuntimeRegistry> {
    match path {
        Some(path) => Ok(RuntimeRegistry::load(path)?),
        None => Ok(RuntimeRegistry::new()),
    }
}

/// Picks the store backend: Postgres when the engine config names one,
/// the file-backed store otherwise.
async fn open_store(config_path: Option<&std::path::Path>) -> anyhow::Result<Box<dyn Store>> {
    let config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match config.database {
        Some(db) if db.provider == "postgres" => {
            let url = db
                .connection_string
                .ok_or_else(|| anyhow::anyhow!("database.provider is 'postgres' but connectionString is missing"))?;
            info!("connecting to Postgres store");
            let store = store::PostgresStore::connect(&url, 10).await?;
            store.migrate().await?;
            Ok(Box::new(store))
        }
        _ => {
            info!("no database configured, using file-backed store");
            Ok(Box::new(store::FileStore::new(".rusty-automation-store.json")))
        }
    }
}
