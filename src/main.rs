use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lunar_engine::{Engine, EngineConfig, RunTarget, compose_output};

/// Lunar - a workflow engine for Python components
///
/// Prints exactly one framed result line on stdout. Logs go to stderr.
#[derive(Parser)]
#[command(name = "lunar")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the workflow JSON (or component JSON with --component)
  path: PathBuf,

  /// Virtual environment to run in
  #[arg(long)]
  venv: Option<PathBuf>,

  /// The document is a single component
  #[arg(long)]
  component: bool,

  /// Launch the run in a child engine inside the virtual environment,
  /// installing its requirements first
  #[arg(long)]
  isolate: bool,

  /// Path to the data directory (default: ~/.lunar)
  #[arg(long)]
  data_dir: Option<PathBuf>,

  /// Extra environment for isolated runs, in dotenv format
  #[arg(long)]
  env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let _ = dotenvy::dotenv();

  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let config = engine_config(&cli)?;
  let target = if cli.component {
    RunTarget::Component
  } else {
    RunTarget::Workflow
  };

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt_received");
      on_interrupt.cancel();
    }
  });

  let engine = Engine::new(config).context("failed to start the engine")?;
  let run = if cli.isolate {
    let executor = engine.isolated(cli.venv.clone());
    engine
      .run_file(&cli.path, target, &executor, cancel)
      .await
  } else {
    let engine = match &cli.venv {
      Some(venv) => engine
        .inside_venv(venv)
        .with_context(|| format!("failed to open virtual environment {}", venv.display()))?,
      None => engine,
    };
    engine
      .run_file(&cli.path, target, &engine.in_process(), cancel)
      .await
  };
  let results = run.with_context(|| format!("failed to run {}", cli.path.display()))?;

  info!(components = results.len(), "run_finished");
  println!("{}", compose_output(target, &results)?);
  Ok(())
}

/// `LUNAR_*` settings with the command line applied on top.
fn engine_config(cli: &Cli) -> Result<EngineConfig> {
  let data_dir = cli.data_dir.clone();
  let mut config = EngineConfig::from_lookup(|name| match (name, &data_dir) {
    ("LUNAR_DATA_DIR", Some(dir)) => Some(dir.display().to_string()),
    _ => std::env::var(name).ok(),
  })
  .context("failed to read engine settings")?;

  if let Some(env_file) = &cli.env_file {
    config.env_file = Some(env_file.clone());
  }
  if std::env::var_os("LUNAR_ENGINE").is_none() {
    config.engine = std::env::current_exe().context("could not locate the lunar executable")?;
  }
  Ok(config)
}
