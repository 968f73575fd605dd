//! sponsor-recon operator binary.
//!
//! Reads `sponsor-recon.toml` (or the path given with `--config`) plus
//! `SPONSOR_`-prefixed environment variables, opens both SQLite stores and
//! runs one command. Reports are printed to stdout as JSON.
//!
//! Nested keys use a double underscore, e.g.
//! `SPONSOR_RECON__SIMILARITY_THRESHOLD=0.9`.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sponsor_recon::{AppConfig, CancelFlag, Reconciler, RunMode};
use sponsor_store_sqlite::{SqliteSponsorStore, SqliteTargetStore};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Reconcile employer records against the sponsor directory")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "sponsor-recon.toml")]
  config: PathBuf,

  /// Override the target (employers) database path.
  #[arg(long)]
  target_db: Option<PathBuf>,

  /// Override the sponsor directory database path.
  #[arg(long)]
  sponsor_db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Match targets against the sponsor directory and update their flags.
  Run {
    /// Evaluate every target instead of only stale ones.
    #[arg(long)]
    full: bool,

    /// Clear every loaded target's flag before matching.
    #[arg(long)]
    reset_flags: bool,

    /// Also write the report into this directory.
    #[arg(long)]
    report_dir: Option<PathBuf>,
  },
  /// Clear flags that point at missing or inactive sponsors.
  Cleanup,
  /// Report whether a run is due and which kind.
  Assess,
  /// Assess, then run in the recommended mode if a run is due.
  Auto,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(
      config::Environment::with_prefix("SPONSOR")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let mut app: AppConfig = settings
    .try_deserialize()
    .context("failed to deserialise AppConfig")?;

  if let Some(path) = cli.target_db {
    app.target_db = path;
  }
  if let Some(path) = cli.sponsor_db {
    app.sponsor_db = path;
  }
  if let Command::Run { reset_flags, report_dir, .. } = &cli.command {
    app.recon.reset_flags |= *reset_flags;
    if report_dir.is_some() {
      app.recon.report_dir = report_dir.clone();
    }
  }

  // Open both stores.
  let targets = SqliteTargetStore::open(&app.target_db)
    .await
    .with_context(|| format!("failed to open target store at {:?}", app.target_db))?;
  let sponsors = SqliteSponsorStore::open(&app.sponsor_db)
    .await
    .with_context(|| format!("failed to open sponsor store at {:?}", app.sponsor_db))?;

  let reconciler =
    Reconciler::new(sponsors, targets, app.recon).context("invalid configuration")?;

  let cancel = CancelFlag::new();
  {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupt received, stopping after the current target");
        cancel.cancel();
      }
    });
  }

  match cli.command {
    Command::Run { full, .. } => {
      let mode = if full { RunMode::Full } else { RunMode::Incremental };
      let report = reconciler
        .run(mode, &cancel)
        .await
        .context("reconciliation run failed")?;
      print_json(&report)?;
    }
    Command::Cleanup => {
      let report = reconciler
        .cleanup_orphans(&cancel)
        .await
        .context("orphan cleanup failed")?;
      print_json(&report)?;
    }
    Command::Assess => {
      let decision = reconciler.assess().await.context("assessment failed")?;
      print_json(&decision)?;
    }
    Command::Auto => match reconciler
      .run_if_due(&cancel)
      .await
      .context("scheduled run failed")?
    {
      Some(report) => print_json(&report)?,
      None => tracing::info!("no maintenance due"),
    },
  }

  Ok(())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
