//! Configuration management for the oracle indexer
//!
//! Loads from YAML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::oracle::ResolverSettings;
use crate::types::{parse_address, MOCK_USD_ADDRESS};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub indexer: IndexerConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    /// Asset id treated as USD
    pub usd_marker: String,
    /// Asset ids with more `0`-separated segments are skipped as malformed
    pub max_zero_segments: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Directory CSV snapshots are written to
    pub data_dir: String,
    /// Write a snapshot after replay
    pub csv_enabled: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Same as [`AppConfig::load`], with an extra file layered over `config/local`
    pub fn load_with(extra: Option<&Path>) -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let mut builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));
        if let Some(path) = extra {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Override with environment variables (ORACLE_INDEXER__*)
            .add_source(Environment::with_prefix("ORACLE_INDEXER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            // Indexer defaults
            .set_default("indexer.usd_marker", MOCK_USD_ADDRESS)?
            .set_default("indexer.max_zero_segments", 38)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;
        Ok(builder)
    }

    /// Reject settings the indexer cannot run with
    pub fn validate(&self) -> Result<()> {
        if parse_address(&self.indexer.usd_marker).is_none() {
            bail!(
                "indexer.usd_marker is not a 20-byte hex address: {}",
                self.indexer.usd_marker
            );
        }
        if self.indexer.max_zero_segments == 0 || self.indexer.max_zero_segments > 41 {
            bail!(
                "indexer.max_zero_segments must be between 1 and 41, got {}",
                self.indexer.max_zero_segments
            );
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            bail!("logging.format must be 'pretty' or 'json'");
        }
        Ok(())
    }

    /// Resolution rules for the indexer
    pub fn resolver_settings(&self) -> Result<ResolverSettings> {
        let usd_marker = parse_address(&self.indexer.usd_marker)
            .with_context(|| format!("Invalid usd_marker {}", self.indexer.usd_marker))?;
        Ok(ResolverSettings {
            usd_marker,
            max_zero_segments: self.indexer.max_zero_segments,
        })
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "usd_marker={} max_zero_segments={} data_dir={} csv={} log={}/{}",
            self.indexer.usd_marker.to_lowercase(),
            self.indexer.max_zero_segments,
            self.persistence.data_dir,
            self.persistence.csv_enabled,
            self.logging.level,
            self.logging.format
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
