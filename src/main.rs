//! oracle-indexer - replay oracle events offline and export the resulting state
//!
//! Usage: oracle-indexer replay <scenario> [--export <dir>]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use oracle_indexer::config::AppConfig;
use oracle_indexer::oracle::sources::TrackerLog;
use oracle_indexer::oracle::OracleIndexer;
use oracle_indexer::persistence::{CsvSnapshot, MemoryStore};
use oracle_indexer::scenario::Scenario;
use oracle_indexer::types::asset_key;

/// Oracle price-source indexer
#[derive(Parser, Debug)]
#[command(name = "oracle-indexer")]
#[command(version)]
struct Cli {
    /// Extra config file layered over config/default and config/local
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Feed a scenario file through the indexer
    Replay {
        /// Scenario file (.json, .yaml or .yml)
        scenario: PathBuf,

        /// Write CSV snapshots here instead of persistence.data_dir
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_with(cli.config.as_deref())?;
    config.logging.init();
    info!(config = %config, "Configuration loaded");

    match cli.command {
        Commands::Replay { scenario, export } => replay(&config, &scenario, export),
    }
}

fn replay(config: &AppConfig, path: &Path, export: Option<PathBuf>) -> Result<()> {
    let scenario = Scenario::load(path)
        .with_context(|| format!("Failed to load scenario {}", path.display()))?;
    info!(
        scenario = scenario.display_name(),
        events = scenario.events.len(),
        "Replaying scenario"
    );

    let settings = config.resolver_settings()?;
    let mut indexer = OracleIndexer::new(
        scenario.chain(),
        MemoryStore::new(),
        TrackerLog::new(),
        settings,
    );
    let stats = indexer.replay(&scenario.events)?.clone();

    info!(
        events = stats.events,
        applied = stats.applied,
        skipped = stats.skipped,
        diagnostics = stats.diagnostics,
        trackers = indexer.trackers().registrations().len(),
        "Replay finished"
    );
    if stats.diagnostics > 0 {
        warn!(count = stats.diagnostics, "Replay produced diagnostics");
    }

    let store = indexer.store();
    if let Some(oracle) = store.committed_oracle() {
        info!(
            version = oracle.version,
            proxy = %asset_key(&oracle.proxy_provider),
            fallback = %asset_key(&oracle.fallback_oracle),
            tokens_with_fallback = oracle.tokens_with_fallback.len(),
            usd_reference_price = %oracle.usd_reference_price,
            "Price oracle state"
        );
    }

    let out_dir = match export {
        Some(dir) => Some(dir),
        None if config.persistence.csv_enabled => Some(PathBuf::from(&config.persistence.data_dir)),
        None => None,
    };
    if let Some(dir) = out_dir {
        CsvSnapshot::new(dir).write(store)?;
    }

    Ok(())
}
