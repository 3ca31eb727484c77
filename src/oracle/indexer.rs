//! Event loop over the oracle handlers
//!
//! Each event runs against a freshly loaded singleton; the singleton is committed
//! once, after the handler returns, and only if the handler changed it.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::oracle::{
    fallback, feeds, resolver, ChainReader, EventOutcome, EventStatus, FeedTrackers,
    HandlerContext, ResolverSettings, SkipReason,
};
use crate::persistence::OracleStore;
use crate::types::{EventEnvelope, OracleEvent, SourceOrigin};

/// Running totals over handled events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexerStats {
    pub events: usize,
    pub applied: usize,
    pub skipped: usize,
    pub diagnostics: usize,
    pub skipped_by_reason: HashMap<SkipReason, usize>,
}

impl IndexerStats {
    fn record(&mut self, outcome: &EventOutcome) {
        self.events += 1;
        self.diagnostics += outcome.diagnostics.len();
        match outcome.status {
            EventStatus::Applied => self.applied += 1,
            EventStatus::Skipped(reason) => {
                self.skipped += 1;
                *self.skipped_by_reason.entry(reason).or_insert(0) += 1;
            }
        }
    }
}

pub struct OracleIndexer<C, S, T> {
    chain: C,
    store: S,
    trackers: T,
    settings: ResolverSettings,
    stats: IndexerStats,
}

impl<C, S, T> OracleIndexer<C, S, T>
where
    C: ChainReader,
    S: OracleStore,
    T: FeedTrackers,
{
    pub fn new(chain: C, store: S, trackers: T, settings: ResolverSettings) -> Self {
        Self {
            chain,
            store,
            trackers,
            settings,
            stats: IndexerStats::default(),
        }
    }

    /// Handle one event. Only store failures come back as `Err`.
    pub fn handle(&mut self, envelope: &EventEnvelope) -> Result<EventOutcome> {
        let provenance = &envelope.provenance;
        debug!(
            event = envelope.event.name(),
            block = provenance.block_number,
            emitter = ?provenance.address,
            "Handling event"
        );

        let mut oracle = self.store.price_oracle()?;
        let before = oracle.clone();

        let mut ctx = HandlerContext {
            chain: &self.chain,
            store: &mut self.store,
            trackers: &mut self.trackers,
            settings: &self.settings,
        };

        let outcome = match &envelope.event {
            OracleEvent::WethSet { weth } => feeds::apply_weth_set(&mut ctx, *weth, provenance)?,
            OracleEvent::FallbackOracleUpdated { fallback_oracle } => {
                fallback::apply_fallback_oracle_update(
                    &mut ctx,
                    &mut oracle,
                    *fallback_oracle,
                    provenance,
                )?
            }
            OracleEvent::AssetSourceUpdated { asset, source } => {
                resolver::apply_asset_source_update(
                    &mut ctx,
                    &mut oracle,
                    *asset,
                    *source,
                    SourceOrigin::Legacy,
                    provenance,
                )?
            }
            OracleEvent::AggregatorUpdated { token, aggregator } => {
                resolver::apply_asset_source_update(
                    &mut ctx,
                    &mut oracle,
                    *token,
                    *aggregator,
                    SourceOrigin::Registry,
                    provenance,
                )?
            }
            OracleEvent::AnswerUpdated { current } => {
                feeds::apply_answer_updated(&mut ctx, &mut oracle, *current, provenance)?
            }
            OracleEvent::FallbackAssetPriceUpdated { asset, price } => {
                feeds::apply_fallback_price_updated(
                    &mut ctx,
                    &mut oracle,
                    *asset,
                    *price,
                    provenance,
                )?
            }
        };

        if oracle != before {
            self.store.save_price_oracle(&mut oracle)?;
        }

        if let EventStatus::Skipped(reason) = outcome.status {
            debug!(event = envelope.event.name(), reason = %reason, "Event skipped");
        }
        self.stats.record(&outcome);
        Ok(outcome)
    }

    /// Handle events in order, stopping at the first store failure
    pub fn replay<'a, I>(&mut self, events: I) -> Result<&IndexerStats>
    where
        I: IntoIterator<Item = &'a EventEnvelope>,
    {
        for envelope in events {
            self.handle(envelope)?;
        }
        Ok(&self.stats)
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// Scripted chains are edited between events in tests
    pub fn chain_mut(&mut self) -> &mut C {
        &mut self.chain
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn trackers(&self) -> &T {
        &self.trackers
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn stats(&self) -> &IndexerStats {
        &self.stats
    }

    pub fn into_parts(self) -> (C, S, T) {
        (self.chain, self.store, self.trackers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::sources::{ScriptedChain, SourceScript, TrackerLog};
    use crate::persistence::MemoryStore;
    use crate::types::{Address, Provenance, U256};

    fn addr(tag: u8) -> Address {
        Address::repeat_byte(tag)
    }

    fn indexer(chain: ScriptedChain) -> OracleIndexer<ScriptedChain, MemoryStore, TrackerLog> {
        OracleIndexer::new(
            chain,
            MemoryStore::new(),
            TrackerLog::new(),
            ResolverSettings::default(),
        )
    }

    fn envelope(block: u64, emitter: Address, event: OracleEvent) -> EventEnvelope {
        EventEnvelope::new(Provenance::new(block, block * 12, emitter), event)
    }

    #[test]
    fn test_singleton_committed_only_on_change() {
        let mut idx = indexer(ScriptedChain::new());

        idx.handle(&envelope(
            1,
            addr(0x77),
            OracleEvent::WethSet { weth: addr(0x11) },
        ))
        .unwrap();
        assert!(idx.store().committed_oracle().is_none());

        idx.handle(&envelope(
            2,
            addr(0x77),
            OracleEvent::AssetSourceUpdated {
                asset: addr(0xaa),
                source: Address::zero(),
            },
        ))
        .unwrap();
        let committed = idx.store().committed_oracle().unwrap();
        assert_eq!(committed.version, 1);
        assert!(committed.uses_fallback(&addr(0xaa)));
    }

    #[test]
    fn test_stats_count_outcomes() {
        let chain = ScriptedChain::new()
            .with_source(SourceScript::simple(addr(0xa1), U256::from(1u64)));
        let mut idx = indexer(chain);
        let events = vec![
            envelope(
                1,
                addr(0x55),
                OracleEvent::AggregatorUpdated {
                    token: addr(0xaa),
                    aggregator: addr(0xa1),
                },
            ),
            envelope(
                2,
                addr(0x77),
                OracleEvent::AssetSourceUpdated {
                    asset: addr(0xaa),
                    source: addr(0xa2),
                },
            ),
            envelope(
                3,
                addr(0xa9),
                OracleEvent::AnswerUpdated {
                    current: U256::from(4u64),
                },
            ),
        ];

        let stats = idx.replay(&events).unwrap().clone();

        assert_eq!(stats.events, 3);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.skipped_by_reason[&SkipReason::RegistryPrecedence], 1);
        assert_eq!(stats.skipped_by_reason[&SkipReason::UnknownAggregator], 1);
    }

    #[test]
    fn test_answer_updates_price_after_resolution() {
        let chain = ScriptedChain::new()
            .with_source(SourceScript::simple(addr(0xa1), U256::from(1u64)));
        let mut idx = indexer(chain);

        idx.handle(&envelope(
            1,
            addr(0x77),
            OracleEvent::AssetSourceUpdated {
                asset: addr(0xaa),
                source: addr(0xa1),
            },
        ))
        .unwrap();
        let outcome = idx
            .handle(&envelope(
                2,
                addr(0xa1),
                OracleEvent::AnswerUpdated {
                    current: U256::from(250u64),
                },
            ))
            .unwrap();

        assert!(outcome.is_applied());
        let asset = idx.store().asset(&addr(0xaa)).unwrap().unwrap();
        assert_eq!(asset.last_price, U256::from(250u64));
        assert_eq!(asset.last_update_block, 2);
    }
}
