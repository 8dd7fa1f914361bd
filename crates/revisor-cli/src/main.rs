//! CLI binary for running and inspecting Revisor runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use revisor_engine::{Backend, CancelToken, FileStore, RunConfig, RunDriver, RunStore};
use revisor_llm::LlmClient;
use revisor_types::{duration_serde::parse_duration, InputPacket, RunId};

#[derive(Parser)]
#[command(name = "revisor", version, about = "Iterative draft, evaluate and revise runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON run configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding run documents (overrides the config file)
    #[arg(long, global = true)]
    runs_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an input packet to a terminal state
    Run {
        /// Path to the input packet JSON
        packet: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Continue an unfinalized run from its stored history
    Resume {
        run_id: String,

        /// Path to the input packet JSON the run was started with
        packet: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the finalized result of a run
    Show { run_id: String },

    /// Print the iteration history of a run
    History { run_id: String },

    /// List stored runs
    List,
}

#[derive(Args, Default)]
struct Overrides {
    /// Maximum number of draft iterations, counting the first
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Pass threshold used when the packet does not set one
    #[arg(long)]
    pass_threshold: Option<u32>,

    /// Per-call timeout for producer and evaluator (e.g. "30s", "500ms")
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<std::time::Duration>,

    /// auto, model or deterministic
    #[arg(long)]
    backend: Option<Backend>,

    /// Model name for the model backend
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            ref packet,
            ref overrides,
        } => {
            let config = build_config(cli.config.as_deref(), cli.runs_dir.as_deref(), overrides)?;
            cmd_run(config, packet, None).await?;
        }
        Commands::Resume {
            ref run_id,
            ref packet,
            ref overrides,
        } => {
            let config = build_config(cli.config.as_deref(), cli.runs_dir.as_deref(), overrides)?;
            cmd_run(config, packet, Some(RunId::from(run_id.as_str()))).await?;
        }
        Commands::Show { ref run_id } => {
            let store = open_store(&cli)?;
            let result = store.read_final(&RunId::from(run_id.as_str())).await?;
            print_json(&result)?;
        }
        Commands::History { ref run_id } => {
            let store = open_store(&cli)?;
            let history = store.read_history(&RunId::from(run_id.as_str())).await?;
            print_json(&history)?;
        }
        Commands::List => {
            let store = open_store(&cli)?;
            let runs = store.list_runs().await?;
            print_json(&runs)?;
        }
    }

    Ok(())
}

/// Config file (or defaults), then the global runs dir, then per-run flags.
fn build_config(
    path: Option<&Path>,
    runs_dir: Option<&Path>,
    overrides: &Overrides,
) -> anyhow::Result<RunConfig> {
    let mut config = match path {
        Some(p) => RunConfig::load(p)?,
        None => RunConfig::default(),
    };
    if let Some(dir) = runs_dir {
        config.runs_dir = dir.to_path_buf();
    }
    if let Some(n) = overrides.max_iterations {
        config.max_iterations = n;
    }
    if let Some(t) = overrides.pass_threshold {
        config.pass_threshold = t;
    }
    if let Some(timeout) = overrides.timeout {
        config.timeout_per_call = timeout;
    }
    if let Some(backend) = overrides.backend {
        config.backend = backend;
    }
    if let Some(ref model) = overrides.model {
        config.model = model.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_store(cli: &Cli) -> anyhow::Result<FileStore> {
    let config = build_config(cli.config.as_deref(), cli.runs_dir.as_deref(), &Overrides::default())?;
    Ok(FileStore::new(config.runs_dir))
}

fn load_packet(path: &Path) -> anyhow::Result<InputPacket> {
    let raw = std::fs::read_to_string(path)?;
    let packet: InputPacket = serde_json::from_str(&raw)?;
    Ok(packet)
}

/// LLM client from the environment, unless the deterministic backend is forced.
fn llm_client(backend: Backend) -> anyhow::Result<Option<Arc<LlmClient>>> {
    if backend == Backend::Deterministic {
        return Ok(None);
    }
    match LlmClient::from_env() {
        Ok(client) => Ok(Some(Arc::new(client))),
        Err(e) if backend == Backend::Auto => {
            tracing::info!(reason = %e, "No model credentials; using deterministic collaborators");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_run(config: RunConfig, packet_path: &Path, resume: Option<RunId>) -> anyhow::Result<()> {
    let packet = load_packet(packet_path)?;
    let store = Arc::new(FileStore::new(config.runs_dir.clone()));
    let mut driver = RunDriver::new(config.clone(), store);
    if let Some(client) = llm_client(config.backend)? {
        driver = driver.with_llm_client(client);
    }

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; the run stops after the current iteration");
            on_interrupt.cancel();
        }
    });

    let orchestrator = driver.orchestrator()?;
    let result = match resume {
        Some(run_id) => orchestrator.resume(run_id, packet, &cancel).await?,
        None => orchestrator.run_cancellable(packet, &cancel).await?,
    };

    eprintln!(
        "Run {} finished: {} after {} iteration(s)",
        result.run_id,
        result.status,
        result.history.len()
    );
    print_json(&result)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
