//! External price-source capabilities (proxy provider, aggregators, fallback oracle)
//!
//! The indexer never talks to a chain directly. Everything it needs to know about
//! contracts goes through [`ChainReader`], and every continuous feed it wants
//! followed is announced through [`FeedTrackers`].

mod scripted;

pub use scripted::{ChainScript, ScriptedChain, SourceScript};

use crate::error::CallResult;
use crate::types::{Address, TrackerKind, U256};

/// Read-only contract calls the indexer depends on
#[cfg_attr(test, mockall::automock)]
pub trait ChainReader {
    /// `getAssetPrice(asset)` on a proxy provider or fallback oracle
    fn asset_price(&self, provider: Address, asset: Address) -> CallResult<U256>;

    /// `getEthUsdPrice()` on a fallback oracle (dev networks only)
    fn eth_usd_price(&self, oracle: Address) -> CallResult<U256>;

    /// `getTokenType()` on an extended price aggregator
    fn token_type(&self, source: Address) -> CallResult<u8>;

    /// `latestAnswer()` on a Chainlink aggregator
    fn latest_answer(&self, source: Address) -> CallResult<U256>;

    /// `getSubTokens()` on a composite aggregator
    fn sub_tokens(&self, source: Address) -> CallResult<Vec<Address>>;

    /// `getPlatformId()` on a composite aggregator
    fn platform_id(&self, source: Address) -> CallResult<u8>;
}

/// Sink for "start following this contract" requests
pub trait FeedTrackers {
    fn register(&mut self, kind: TrackerKind, address: Address);
}

/// Registered tracker, as recorded by [`TrackerLog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackerRegistration {
    pub kind: TrackerKind,
    pub address: Address,
}

/// In-process [`FeedTrackers`] that keeps every registration in order
#[derive(Debug, Default, Clone)]
pub struct TrackerLog {
    registrations: Vec<TrackerRegistration>,
}

impl TrackerLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registrations(&self) -> &[TrackerRegistration] {
        &self.registrations
    }

    /// Whether a tracker of `kind` was ever started for `address`
    pub fn contains(&self, kind: TrackerKind, address: Address) -> bool {
        self.registrations
            .iter()
            .any(|r| r.kind == kind && r.address == address)
    }

    pub fn count(&self, kind: TrackerKind) -> usize {
        self.registrations.iter().filter(|r| r.kind == kind).count()
    }
}

impl FeedTrackers for TrackerLog {
    fn register(&mut self, kind: TrackerKind, address: Address) {
        tracing::debug!(kind = %kind, address = ?address, "Feed tracker registered");
        self.registrations.push(TrackerRegistration { kind, address });
    }
}
