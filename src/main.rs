use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use braid_config::{BackendConfig, WorkflowDef};
use braid_pipeline::Worker;
use braid_provenance::{JobDb, prov_key};
use braid_scheduler::{
  ExecutionNotifier, LogNotifier, Scheduler, run_parallel, run_parallel_with_display, run_single,
  run_single_with_display,
};
use braid_store::{MemoryStore, SqliteStore};
use braid_worker::{JobMessage, JobResult, LocalWorker, serve};
use braid_workflow::{Job, Workflow};

/// Braid - a workflow engine that remembers what it already computed
#[derive(Parser)]
#[command(name = "braid")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.braid)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Backend configuration file (default: <data-dir>/config.json if present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow and print the result of its root node
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Number of parallel workers
    #[arg(long)]
    workers: Option<usize>,

    /// SQLite file for provenance records, relative to the data directory
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log every job as it starts and finishes
    #[arg(long)]
    display: bool,
  },

  /// Serve jobs over stdin/stdout with the builtin functions
  Worker,

  /// Print the provenance key of every node whose arguments are all literal
  Key {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".braid"),
  };

  let rt = tokio::runtime::Runtime::new()?;

  match cli.command {
    Some(Commands::Run {
      workflow_file,
      workers,
      db,
      display,
    }) => {
      let mut backend = load_backend(cli.config.as_deref(), &data_dir)?;
      if let Some(workers) = workers {
        backend.workers = workers;
      }
      if db.is_some() {
        backend.db_path = db;
      }
      backend.display |= display;
      backend.db_path = backend.db_path.map(|path| data_dir.join(path));

      rt.block_on(run_workflow(workflow_file, backend))?;
    }
    Some(Commands::Worker) => {
      rt.block_on(serve_stdio())?;
    }
    Some(Commands::Key { workflow_file }) => {
      rt.block_on(print_keys(workflow_file))?;
    }
    None => {
      println!("braid - use --help to see available commands");
    }
  }

  Ok(())
}

/// Backend settings from `--config`, else from the data directory, else the
/// defaults.
fn load_backend(config: Option<&Path>, data_dir: &Path) -> Result<BackendConfig> {
  if let Some(path) = config {
    return BackendConfig::load(path)
      .with_context(|| format!("failed to load config: {}", path.display()));
  }

  let path = data_dir.join("config.json");
  if path.is_file() {
    info!(path = %path.display(), "config_loaded");
    return BackendConfig::load(&path)
      .with_context(|| format!("failed to load config: {}", path.display()));
  }

  Ok(BackendConfig::default())
}

async fn load_workflow(workflow_file: &Path) -> Result<Workflow> {
  let content = tokio::fs::read_to_string(workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  let def: WorkflowDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

  Workflow::from_def(def)
    .with_context(|| format!("invalid workflow: {}", workflow_file.display()))
}

async fn open_provenance(backend: &BackendConfig) -> Result<JobDb> {
  let Some(path) = &backend.db_path else {
    return Ok(JobDb::open(MemoryStore::new()));
  };

  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create directory: {}", parent.display()))?;
  }
  let store = SqliteStore::open(path)
    .await
    .with_context(|| format!("failed to open job database: {}", path.display()))?;
  info!(path = %path.display(), "job_database_opened");
  Ok(JobDb::open(store))
}

async fn run_workflow(workflow_file: PathBuf, backend: BackendConfig) -> Result<()> {
  let workflow = load_workflow(&workflow_file).await?;
  info!(
    workflow = %workflow.name,
    nodes = workflow.nodes.len(),
    workers = backend.workers,
    "workflow_loaded"
  );

  let db = open_provenance(&backend).await?;
  let scheduler = Scheduler::new()
    .with_provenance(Arc::new(db))
    .with_max_in_flight(backend.queue_capacity.max(1));
  let worker: Arc<dyn Worker<JobMessage, JobResult>> = Arc::new(LocalWorker::builtin());
  let workers = backend.workers.max(1);

  let run = async {
    if backend.display {
      let display: Arc<dyn ExecutionNotifier> = Arc::new(LogNotifier);
      if workers > 1 {
        run_parallel_with_display(scheduler, worker, &workflow, workers, display).await
      } else {
        run_single_with_display(scheduler, worker, &workflow, display).await
      }
    } else if workers > 1 {
      run_parallel(&scheduler, worker, &workflow, workers).await
    } else {
      run_single(&scheduler, worker, &workflow).await
    }
  };

  let cancel = CancellationToken::new();
  let interrupt = {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        cancel.cancel();
      }
    })
  };

  let outcome = tokio::select! {
    result = run => result.context("workflow execution failed"),
    _ = cancel.cancelled() => Err(anyhow::anyhow!("interrupted")),
  };
  interrupt.abort();

  let value = outcome?;
  println!("{}", serde_json::to_string_pretty(&value)?);
  Ok(())
}

async fn serve_stdio() -> Result<()> {
  let worker = LocalWorker::builtin();
  let served = serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), &worker)
    .await
    .context("worker protocol failed")?;
  info!(served, "worker_exiting");
  Ok(())
}

async fn print_keys(workflow_file: PathBuf) -> Result<()> {
  let workflow = load_workflow(&workflow_file).await?;

  let mut nodes: Vec<_> = workflow.nodes.values().collect();
  nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));

  for node in nodes {
    let job = Job::from_node(node);
    if !job.is_concrete() {
      warn!(node_id = %node.node_id, "node has references, skipping");
      continue;
    }
    let key = prov_key(&job).with_context(|| format!("failed to hash node '{}'", node.node_id))?;
    println!("{}\t{}", node.node_id, key);
  }

  Ok(())
}
