//! CSV snapshot export of the indexed state

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::oracle::graph::{dependents_of, is_usd_dependent};
use crate::oracle::normalize::{to_decimal, PRICE_DECIMALS};
use crate::persistence::MemoryStore;
use crate::types::{asset_key, Address};

/// Asset row in `assets.csv`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset: String,
    pub price_source: String,
    pub kind: String,
    pub state: String,
    pub is_fallback_required: bool,
    pub in_tokens_with_fallback: bool,
    pub from_chainlink_registry: bool,
    pub usd_dependent: bool,
    /// Dependent asset ids joined with `;`
    pub dependent_assets: String,
    pub last_price: String,
    pub last_price_decimal: Option<Decimal>,
    pub last_update_block: u64,
    pub last_update_time: Option<String>,
}

/// Row in `aggregators.csv`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorRecord {
    pub aggregator: String,
    pub oracle_asset: String,
}

/// Row in `price_history.csv`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub block_number: u64,
    pub timestamp: u64,
    pub asset: String,
    pub price: String,
}

/// Row in `usd_price_history.csv`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsdPriceRecord {
    pub block_number: u64,
    pub timestamp: u64,
    pub price: String,
    pub price_decimal: Option<Decimal>,
}

/// What an export wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub assets: usize,
    pub aggregators: usize,
    pub prices: usize,
    pub usd_prices: usize,
}

/// Writes a point-in-time snapshot of a [`MemoryStore`] into a directory
pub struct CsvSnapshot {
    out_dir: PathBuf,
}

impl CsvSnapshot {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Export every table, truncating previous snapshot files
    pub fn write(&self, store: &MemoryStore) -> Result<SnapshotSummary> {
        fs::create_dir_all(&self.out_dir).context("Failed to create snapshot directory")?;

        let oracle = store.committed_oracle().cloned().unwrap_or_default();

        let assets: Vec<AssetRecord> = store
            .assets()
            .map(|asset| AssetRecord {
                asset: asset_key(&asset.id),
                price_source: asset_key(&asset.price_source),
                kind: asset.kind.to_string(),
                state: asset.state().to_string(),
                is_fallback_required: asset.is_fallback_required,
                in_tokens_with_fallback: oracle.tokens_with_fallback.contains(&asset.id),
                from_chainlink_registry: asset.from_chainlink_registry,
                usd_dependent: is_usd_dependent(&oracle, &asset.id),
                dependent_assets: join_addresses(dependents_of(asset)),
                last_price: asset.last_price.to_string(),
                last_price_decimal: to_decimal(asset.last_price, PRICE_DECIMALS),
                last_update_block: asset.last_update_block,
                last_update_time: format_timestamp(asset.last_update_timestamp),
            })
            .collect();

        let aggregators: Vec<AggregatorRecord> = store
            .aggregators()
            .map(|agg| AggregatorRecord {
                aggregator: asset_key(&agg.id),
                oracle_asset: asset_key(&agg.oracle_asset),
            })
            .collect();

        let prices: Vec<PriceRecord> = store
            .price_history()
            .iter()
            .map(|item| PriceRecord {
                block_number: item.block_number,
                timestamp: item.timestamp,
                asset: asset_key(&item.asset),
                price: item.price.to_string(),
            })
            .collect();

        let usd_prices: Vec<UsdPriceRecord> = store
            .usd_price_history()
            .iter()
            .map(|item| UsdPriceRecord {
                block_number: item.block_number,
                timestamp: item.timestamp,
                price: item.price.to_string(),
                price_decimal: to_decimal(item.price, PRICE_DECIMALS),
            })
            .collect();

        self.write_table("assets.csv", &assets)?;
        self.write_table("aggregators.csv", &aggregators)?;
        self.write_table("price_history.csv", &prices)?;
        self.write_table("usd_price_history.csv", &usd_prices)?;

        let summary = SnapshotSummary {
            assets: assets.len(),
            aggregators: aggregators.len(),
            prices: prices.len(),
            usd_prices: usd_prices.len(),
        };

        info!(
            out_dir = %self.out_dir.display(),
            assets = summary.assets,
            aggregators = summary.aggregators,
            prices = summary.prices,
            usd_prices = summary.usd_prices,
            "Snapshot exported"
        );

        Ok(summary)
    }

    fn write_table<T: Serialize>(&self, filename: &str, rows: &[T]) -> Result<()> {
        let path = self.out_dir.join(filename);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
        for row in rows {
            writer
                .serialize(row)
                .with_context(|| format!("Failed to write row to {}", filename))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", filename))?;
        Ok(())
    }
}

fn join_addresses<'a>(addresses: impl Iterator<Item = &'a Address>) -> String {
    addresses.map(asset_key).collect::<Vec<_>>().join(";")
}

fn format_timestamp(ts: u64) -> Option<String> {
    if ts == 0 {
        return None;
    }
    let secs = i64::try_from(ts).ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339())
}
