//! Indexed oracle state - the records the resolver reads and writes

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::types::{dec_u256, Address, AssetKind, U256};

/// Process-wide price oracle record.
///
/// There is exactly one, loaded from the store at the start of every event and
/// handed explicitly to whichever handler runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOracle {
    /// Bumped by the store on every commit
    pub version: u64,
    pub proxy_provider: Address,
    pub fallback_oracle: Address,
    /// Assets whose price currently comes through a fallback path
    pub tokens_with_fallback: BTreeSet<Address>,
    /// Composite assets with the USD marker among their sub-tokens
    pub usd_dependent_assets: BTreeSet<Address>,
    /// ETH price of one USD, 8 decimals
    #[serde(with = "dec_u256")]
    pub usd_reference_price: U256,
    pub usd_reference_source: Address,
    pub usd_reference_requires_fallback: bool,
    pub last_update_timestamp: u64,
}

impl PriceOracle {
    /// Set the proxy provider unless one is already known. Returns whether it changed.
    pub fn seed_proxy_provider(&mut self, provider: Address) -> bool {
        if self.proxy_provider.is_zero() && !provider.is_zero() {
            self.proxy_provider = provider;
            return true;
        }
        false
    }

    /// Bring `tokens_with_fallback` membership of `asset` in line with its record
    pub fn sync_fallback_membership(&mut self, asset: &PriceOracleAsset) {
        if asset.needs_fallback() {
            self.tokens_with_fallback.insert(asset.id);
        } else {
            self.tokens_with_fallback.remove(&asset.id);
        }
    }

    pub fn uses_fallback(&self, asset: &Address) -> bool {
        self.tokens_with_fallback.contains(asset)
    }
}

/// Per-asset oracle record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOracleAsset {
    pub id: Address,
    /// Authoritative aggregator; zero while unresolved
    pub price_source: Address,
    pub kind: AssetKind,
    pub is_fallback_required: bool,
    /// Composite assets priced off this one
    pub dependent_assets: BTreeSet<Address>,
    /// Set once the Chainlink sources registry has spoken for this asset
    pub from_chainlink_registry: bool,
    #[serde(with = "dec_u256")]
    pub last_price: U256,
    pub last_update_block: u64,
    pub last_update_timestamp: u64,
}

impl PriceOracleAsset {
    pub fn new(id: Address) -> Self {
        Self {
            id,
            price_source: Address::zero(),
            kind: AssetKind::Simple,
            is_fallback_required: true,
            dependent_assets: BTreeSet::new(),
            from_chainlink_registry: false,
            last_price: U256::zero(),
            last_update_block: 0,
            last_update_timestamp: 0,
        }
    }

    /// Membership rule for the oracle's `tokens_with_fallback`
    pub fn needs_fallback(&self) -> bool {
        self.price_source.is_zero() || self.is_fallback_required
    }

    pub fn state(&self) -> AssetState {
        if self.price_source.is_zero() {
            AssetState::Unresolved
        } else if self.kind == AssetKind::Composite {
            AssetState::Composite
        } else if self.is_fallback_required {
            AssetState::SimpleDegraded
        } else {
            AssetState::SimpleStable
        }
    }
}

/// Where an asset sits in its source lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetState {
    Unresolved,
    SimpleStable,
    SimpleDegraded,
    Composite,
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetState::Unresolved => write!(f, "UNRESOLVED"),
            AssetState::SimpleStable => write!(f, "SIMPLE_STABLE"),
            AssetState::SimpleDegraded => write!(f, "SIMPLE_DEGRADED"),
            AssetState::Composite => write!(f, "COMPOSITE"),
        }
    }
}

/// Reverse index entry: aggregator address -> asset it prices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainlinkAggregator {
    pub id: Address,
    pub oracle_asset: Address,
}

/// Wrapped native asset metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WethReserve {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub updated_block_number: u64,
    pub updated_timestamp: u64,
}

impl WethReserve {
    pub fn new(address: Address, block_number: u64, timestamp: u64) -> Self {
        Self {
            address,
            name: "WEthereum".to_string(),
            symbol: "WETH".to_string(),
            decimals: 18,
            updated_block_number: block_number,
            updated_timestamp: timestamp,
        }
    }
}

/// One published asset price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistoryItem {
    pub asset: Address,
    #[serde(with = "dec_u256")]
    pub price: U256,
    pub block_number: u64,
    pub timestamp: u64,
}

/// One published USD reference price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsdPriceHistoryItem {
    #[serde(with = "dec_u256")]
    pub price: U256,
    pub block_number: u64,
    pub timestamp: u64,
}
