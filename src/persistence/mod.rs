//! Persistence boundary
//!
//! [`OracleStore`] is what the indexer needs from a store: load-or-create and save
//! for the singletons, the per-asset records and the aggregator index, plus the
//! append-only price history. [`MemoryStore`] keeps everything in process.

mod csv_export;

pub use csv_export::{
    AggregatorRecord, AssetRecord, CsvSnapshot, PriceRecord, SnapshotSummary, UsdPriceRecord,
};

use std::collections::BTreeMap;

use crate::error::{OracleError, Result};
use crate::oracle::state::{
    ChainlinkAggregator, PriceHistoryItem, PriceOracle, PriceOracleAsset, UsdPriceHistoryItem,
    WethReserve,
};
use crate::types::Address;

/// Storage operations the indexer performs while handling one event
pub trait OracleStore {
    /// Load the price oracle singleton, or a fresh one if none was committed yet
    fn price_oracle(&self) -> Result<PriceOracle>;

    /// Commit the singleton. Fails if `oracle` is not the latest committed version;
    /// on success its version is bumped.
    fn save_price_oracle(&mut self, oracle: &mut PriceOracle) -> Result<()>;

    fn asset(&self, id: &Address) -> Result<Option<PriceOracleAsset>>;

    fn save_asset(&mut self, asset: &PriceOracleAsset) -> Result<()>;

    fn aggregator(&self, id: &Address) -> Result<Option<ChainlinkAggregator>>;

    fn save_aggregator(&mut self, aggregator: &ChainlinkAggregator) -> Result<()>;

    fn weth(&self) -> Result<Option<WethReserve>>;

    fn save_weth(&mut self, weth: &WethReserve) -> Result<()>;

    fn append_price(&mut self, item: PriceHistoryItem) -> Result<()>;

    fn append_usd_price(&mut self, item: UsdPriceHistoryItem) -> Result<()>;

    /// Load an asset record, or a default unresolved one
    fn asset_or_init(&self, id: Address) -> Result<PriceOracleAsset> {
        Ok(self
            .asset(&id)?
            .unwrap_or_else(|| PriceOracleAsset::new(id)))
    }
}

/// In-process store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    oracle: Option<PriceOracle>,
    assets: BTreeMap<Address, PriceOracleAsset>,
    aggregators: BTreeMap<Address, ChainlinkAggregator>,
    weth: Option<WethReserve>,
    price_history: Vec<PriceHistoryItem>,
    usd_price_history: Vec<UsdPriceHistoryItem>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last committed singleton, if any
    pub fn committed_oracle(&self) -> Option<&PriceOracle> {
        self.oracle.as_ref()
    }

    pub fn assets(&self) -> impl Iterator<Item = &PriceOracleAsset> {
        self.assets.values()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn aggregators(&self) -> impl Iterator<Item = &ChainlinkAggregator> {
        self.aggregators.values()
    }

    pub fn weth_reserve(&self) -> Option<&WethReserve> {
        self.weth.as_ref()
    }

    pub fn price_history(&self) -> &[PriceHistoryItem] {
        &self.price_history
    }

    pub fn usd_price_history(&self) -> &[UsdPriceHistoryItem] {
        &self.usd_price_history
    }
}

impl OracleStore for MemoryStore {
    fn price_oracle(&self) -> Result<PriceOracle> {
        Ok(self.oracle.clone().unwrap_or_default())
    }

    fn save_price_oracle(&mut self, oracle: &mut PriceOracle) -> Result<()> {
        let committed = self.oracle.as_ref().map(|o| o.version).unwrap_or(0);
        if oracle.version != committed {
            return Err(OracleError::StaleSingleton {
                expected: oracle.version,
                found: committed,
            });
        }
        oracle.version += 1;
        self.oracle = Some(oracle.clone());
        Ok(())
    }

    fn asset(&self, id: &Address) -> Result<Option<PriceOracleAsset>> {
        Ok(self.assets.get(id).cloned())
    }

    fn save_asset(&mut self, asset: &PriceOracleAsset) -> Result<()> {
        self.assets.insert(asset.id, asset.clone());
        Ok(())
    }

    fn aggregator(&self, id: &Address) -> Result<Option<ChainlinkAggregator>> {
        Ok(self.aggregators.get(id).cloned())
    }

    fn save_aggregator(&mut self, aggregator: &ChainlinkAggregator) -> Result<()> {
        self.aggregators.insert(aggregator.id, aggregator.clone());
        Ok(())
    }

    fn weth(&self) -> Result<Option<WethReserve>> {
        Ok(self.weth.clone())
    }

    fn save_weth(&mut self, weth: &WethReserve) -> Result<()> {
        self.weth = Some(weth.clone());
        Ok(())
    }

    fn append_price(&mut self, item: PriceHistoryItem) -> Result<()> {
        self.price_history.push(item);
        Ok(())
    }

    fn append_usd_price(&mut self, item: UsdPriceHistoryItem) -> Result<()> {
        self.usd_price_history.push(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_oracle_created_lazily() {
        let store = MemoryStore::new();
        let oracle = store.price_oracle().unwrap();
        assert_eq!(oracle.version, 0);
        assert!(store.committed_oracle().is_none());
    }

    #[test]
    fn test_save_bumps_version() {
        let mut store = MemoryStore::new();
        let mut oracle = store.price_oracle().unwrap();
        store.save_price_oracle(&mut oracle).unwrap();
        assert_eq!(oracle.version, 1);
        store.save_price_oracle(&mut oracle).unwrap();
        assert_eq!(store.committed_oracle().unwrap().version, 2);
    }

    #[test]
    fn test_stale_singleton_rejected() {
        let mut store = MemoryStore::new();
        let mut first = store.price_oracle().unwrap();
        let mut second = store.price_oracle().unwrap();
        store.save_price_oracle(&mut first).unwrap();

        let err = store.save_price_oracle(&mut second).unwrap_err();
        assert!(matches!(
            err,
            OracleError::StaleSingleton {
                expected: 0,
                found: 1
            }
        ));
    }

    #[test]
    fn test_asset_or_init_does_not_persist() {
        let store = MemoryStore::new();
        let asset = store.asset_or_init(addr(1)).unwrap();
        assert!(asset.is_fallback_required);
        assert_eq!(store.asset_count(), 0);
    }

    #[test]
    fn test_aggregator_index_last_writer_wins() {
        let mut store = MemoryStore::new();
        store
            .save_aggregator(&ChainlinkAggregator {
                id: addr(10),
                oracle_asset: addr(1),
            })
            .unwrap();
        store
            .save_aggregator(&ChainlinkAggregator {
                id: addr(10),
                oracle_asset: addr(2),
            })
            .unwrap();
        assert_eq!(
            store.aggregator(&addr(10)).unwrap().unwrap().oracle_asset,
            addr(2)
        );
        assert_eq!(store.aggregators().count(), 1);
    }
}
