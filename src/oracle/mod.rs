//! Oracle module - price-source resolution and fallback decisions
//!
//! Consumes proxy-provider, sources-registry and feed events one at a time and keeps
//! per-asset price sources, prices and fallback flags consistent.

pub mod fallback;
pub mod feeds;
pub mod graph;
mod indexer;
pub mod normalize;
pub mod prices;
pub mod resolver;
pub mod sources;
pub mod state;

pub use indexer::{IndexerStats, OracleIndexer};
pub use sources::{ChainReader, FeedTrackers};

use std::fmt;

use crate::persistence::OracleStore;
use crate::types::{asset_key, mock_usd_address, Address, DEFAULT_MAX_ZERO_SEGMENTS};

/// Knobs of the resolution rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Asset id standing for USD
    pub usd_marker: Address,
    /// Asset ids splitting into more `0`-separated segments than this are rejected
    pub max_zero_segments: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            usd_marker: mock_usd_address(),
            max_zero_segments: DEFAULT_MAX_ZERO_SEGMENTS,
        }
    }
}

impl ResolverSettings {
    /// Known-bad legacy registrations: ids made almost entirely of zero padding
    pub fn is_malformed_asset(&self, asset: &Address) -> bool {
        asset_key(asset).split('0').count() > self.max_zero_segments
    }
}

/// Collaborators a handler works against for the duration of one event
pub struct HandlerContext<'a> {
    pub chain: &'a dyn ChainReader,
    pub store: &'a mut dyn OracleStore,
    pub trackers: &'a mut dyn FeedTrackers,
    pub settings: &'a ResolverSettings,
}

/// Non-fatal conditions reported while handling an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    MalformedAsset {
        asset: Address,
    },
    SubTokensQueryFailed {
        asset: Address,
        source: Address,
    },
    PlatformQueryFailed {
        asset: Address,
        source: Address,
    },
    UnsupportedPlatform {
        asset: Address,
        source: Address,
        platform_id: u8,
    },
    FallbackRequoteFailed {
        asset: Address,
        proxy: Address,
        fallback: Address,
    },
    UsdReferenceUnavailable {
        fallback: Address,
    },
}

impl Diagnostic {
    /// Log this diagnostic at the level its category warrants
    pub fn emit(&self) {
        match self {
            Diagnostic::MalformedAsset { .. } => tracing::warn!("{}", self),
            _ => tracing::error!("{}", self),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedAsset { asset } => {
                write!(f, "skipping wrong asset registration {}", asset_key(asset))
            }
            Diagnostic::SubTokensQueryFailed { asset, source } => write!(
                f,
                "sub tokens call reverted for asset: {} | source: {}",
                asset_key(asset),
                asset_key(source)
            ),
            Diagnostic::PlatformQueryFailed { asset, source } => write!(
                f,
                "platform id call reverted for asset: {} | source: {}",
                asset_key(asset),
                asset_key(source)
            ),
            Diagnostic::UnsupportedPlatform {
                asset,
                source,
                platform_id,
            } => write!(
                f,
                "platform not supported: {} | asset: {} | source: {}",
                platform_id,
                asset_key(asset),
                asset_key(source)
            ),
            Diagnostic::FallbackRequoteFailed {
                asset,
                proxy,
                fallback,
            } => write!(
                f,
                "OracleAssetId: {} | ProxyPriceProvider: {} | FallbackOracle: {}",
                asset_key(asset),
                asset_key(proxy),
                asset_key(fallback)
            ),
            Diagnostic::UsdReferenceUnavailable { fallback } => write!(
                f,
                "no USD reference price available from fallback oracle {}",
                asset_key(fallback)
            ),
        }
    }
}

/// Why an event left the state untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MalformedAsset,
    /// Legacy update for an asset the sources registry already owns
    RegistryPrecedence,
    UnknownAggregator,
    /// Aggregator no longer the asset's price source
    StaleAggregator,
    /// Fallback price pushed by something other than the current fallback oracle
    NotCurrentFallback,
    /// Fallback price for an asset served by its own source
    AuthoritativeSource,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MalformedAsset => write!(f, "malformed_asset"),
            SkipReason::RegistryPrecedence => write!(f, "registry_precedence"),
            SkipReason::UnknownAggregator => write!(f, "unknown_aggregator"),
            SkipReason::StaleAggregator => write!(f, "stale_aggregator"),
            SkipReason::NotCurrentFallback => write!(f, "not_current_fallback"),
            SkipReason::AuthoritativeSource => write!(f, "authoritative_source"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Applied,
    Skipped(SkipReason),
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventOutcome {
    pub status: EventStatus,
    pub diagnostics: Vec<Diagnostic>,
}

impl EventOutcome {
    pub fn applied() -> Self {
        Self {
            status: EventStatus::Applied,
            diagnostics: Vec::new(),
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            status: EventStatus::Skipped(reason),
            diagnostics: Vec::new(),
        }
    }

    /// Record and log a diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        diagnostic.emit();
        self.diagnostics.push(diagnostic);
    }

    pub fn is_applied(&self) -> bool {
        self.status == EventStatus::Applied
    }
}
