//! Continuous feed events: aggregator answers, fallback oracle prices, WETH

use tracing::{debug, info};

use crate::error::Result;
use crate::oracle::normalize::format_usd_eth_chainlink_price;
use crate::oracle::prices::{generic_price_update, usd_eth_price_update};
use crate::oracle::state::{PriceOracle, WethReserve};
use crate::oracle::{EventOutcome, HandlerContext, SkipReason};
use crate::types::{Address, Provenance, U256};

/// `AnswerUpdated` from a tracked aggregator (the event's emitter)
pub fn apply_answer_updated(
    ctx: &mut HandlerContext<'_>,
    oracle: &mut PriceOracle,
    current: U256,
    provenance: &Provenance,
) -> Result<EventOutcome> {
    let aggregator = provenance.address;
    let Some(entry) = ctx.store.aggregator(&aggregator)? else {
        debug!(aggregator = ?aggregator, "Answer from unknown aggregator");
        return Ok(EventOutcome::skipped(SkipReason::UnknownAggregator));
    };
    let asset_id = entry.oracle_asset;

    if asset_id == ctx.settings.usd_marker {
        if oracle.usd_reference_source != aggregator {
            return Ok(EventOutcome::skipped(SkipReason::StaleAggregator));
        }
        usd_eth_price_update(
            &mut *ctx.store,
            oracle,
            format_usd_eth_chainlink_price(current),
            provenance,
        )?;
        return Ok(EventOutcome::applied());
    }

    let mut asset = match ctx.store.asset(&asset_id)? {
        Some(asset) if asset.price_source == aggregator => asset,
        _ => {
            debug!(aggregator = ?aggregator, asset = ?asset_id, "Answer from replaced aggregator");
            return Ok(EventOutcome::skipped(SkipReason::StaleAggregator));
        }
    };
    generic_price_update(&mut *ctx.store, &mut asset, current, provenance)?;
    Ok(EventOutcome::applied())
}

/// `AssetPriceUpdated` pushed by a fallback oracle (the event's emitter)
pub fn apply_fallback_price_updated(
    ctx: &mut HandlerContext<'_>,
    oracle: &mut PriceOracle,
    asset_id: Address,
    price: U256,
    provenance: &Provenance,
) -> Result<EventOutcome> {
    if oracle.fallback_oracle.is_zero() || provenance.address != oracle.fallback_oracle {
        return Ok(EventOutcome::skipped(SkipReason::NotCurrentFallback));
    }

    if asset_id == ctx.settings.usd_marker {
        if !oracle.usd_reference_requires_fallback {
            return Ok(EventOutcome::skipped(SkipReason::AuthoritativeSource));
        }
        usd_eth_price_update(
            &mut *ctx.store,
            oracle,
            format_usd_eth_chainlink_price(price),
            provenance,
        )?;
        return Ok(EventOutcome::applied());
    }

    if !oracle.uses_fallback(&asset_id) {
        return Ok(EventOutcome::skipped(SkipReason::AuthoritativeSource));
    }
    let mut asset = ctx.store.asset_or_init(asset_id)?;
    generic_price_update(&mut *ctx.store, &mut asset, price, provenance)?;
    Ok(EventOutcome::applied())
}

/// `WethSet`: replaces the reserve record wholesale
pub fn apply_weth_set(
    ctx: &mut HandlerContext<'_>,
    weth: Address,
    provenance: &Provenance,
) -> Result<EventOutcome> {
    let reserve = WethReserve::new(weth, provenance.block_number, provenance.timestamp);
    ctx.store.save_weth(&reserve)?;
    info!(weth = ?weth, block = provenance.block_number, "WETH reserve set");
    Ok(EventOutcome::applied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::sources::{ScriptedChain, TrackerLog};
    use crate::oracle::state::{ChainlinkAggregator, PriceOracleAsset};
    use crate::oracle::{EventStatus, ResolverSettings};
    use crate::persistence::{MemoryStore, OracleStore};

    fn addr(tag: u8) -> Address {
        Address::repeat_byte(tag)
    }

    struct Fixture {
        chain: ScriptedChain,
        store: MemoryStore,
        trackers: TrackerLog,
        settings: ResolverSettings,
        oracle: PriceOracle,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                chain: ScriptedChain::new(),
                store: MemoryStore::new(),
                trackers: TrackerLog::new(),
                settings: ResolverSettings::default(),
                oracle: PriceOracle::default(),
            }
        }

        fn ctx(&mut self) -> (HandlerContext<'_>, &mut PriceOracle) {
            (
                HandlerContext {
                    chain: &self.chain,
                    store: &mut self.store,
                    trackers: &mut self.trackers,
                    settings: &self.settings,
                },
                &mut self.oracle,
            )
        }

        fn resolved(&mut self, asset: Address, aggregator: Address) {
            let mut record = PriceOracleAsset::new(asset);
            record.price_source = aggregator;
            record.is_fallback_required = false;
            self.store.save_asset(&record).unwrap();
            self.store
                .save_aggregator(&ChainlinkAggregator {
                    id: aggregator,
                    oracle_asset: asset,
                })
                .unwrap();
        }

        fn answer(&mut self, aggregator: Address, current: u64) -> EventOutcome {
            let prov = Provenance::new(10, 1_000, aggregator);
            let (mut ctx, oracle) = self.ctx();
            apply_answer_updated(&mut ctx, oracle, U256::from(current), &prov).unwrap()
        }

        fn fallback_price(&mut self, emitter: Address, asset: Address, price: u64) -> EventOutcome {
            let prov = Provenance::new(11, 2_000, emitter);
            let (mut ctx, oracle) = self.ctx();
            apply_fallback_price_updated(&mut ctx, oracle, asset, U256::from(price), &prov)
                .unwrap()
        }
    }

    #[test]
    fn test_answer_publishes_on_current_source() {
        let mut f = Fixture::new();
        f.resolved(addr(0xaa), addr(0xa1));

        let outcome = f.answer(addr(0xa1), 777);

        assert!(outcome.is_applied());
        let asset = f.store.asset(&addr(0xaa)).unwrap().unwrap();
        assert_eq!(asset.last_price, U256::from(777u64));
        assert_eq!(asset.last_update_block, 10);
    }

    #[test]
    fn test_answer_from_unknown_aggregator_skipped() {
        let mut f = Fixture::new();
        let outcome = f.answer(addr(0xa9), 1);
        assert_eq!(
            outcome.status,
            EventStatus::Skipped(SkipReason::UnknownAggregator)
        );
    }

    #[test]
    fn test_answer_from_replaced_aggregator_skipped() {
        let mut f = Fixture::new();
        f.resolved(addr(0xaa), addr(0xa1));
        // asset moved on to a new source; old index entry stays behind
        f.resolved(addr(0xaa), addr(0xa2));

        let outcome = f.answer(addr(0xa1), 5);

        assert_eq!(outcome.status, EventStatus::Skipped(SkipReason::StaleAggregator));
        assert!(f.store.price_history().is_empty());
    }

    #[test]
    fn test_usd_marker_answer_is_normalized() {
        let mut f = Fixture::new();
        let usd = f.settings.usd_marker;
        f.store
            .save_aggregator(&ChainlinkAggregator {
                id: addr(0xd1),
                oracle_asset: usd,
            })
            .unwrap();
        f.oracle.usd_reference_source = addr(0xd1);

        let outcome = f.answer(addr(0xd1), 3_000_000_000_000_000);

        assert!(outcome.is_applied());
        assert_eq!(f.oracle.usd_reference_price, U256::from(300_000u64));
        assert!(f.store.price_history().is_empty());
    }

    #[test]
    fn test_fallback_price_requires_current_fallback() {
        let mut f = Fixture::new();
        f.oracle.fallback_oracle = addr(0xfb);
        f.oracle.tokens_with_fallback.insert(addr(0xaa));

        let outcome = f.fallback_price(addr(0xfc), addr(0xaa), 9);
        assert_eq!(
            outcome.status,
            EventStatus::Skipped(SkipReason::NotCurrentFallback)
        );

        let outcome = f.fallback_price(addr(0xfb), addr(0xaa), 9);
        assert!(outcome.is_applied());
        assert_eq!(
            f.store.asset(&addr(0xaa)).unwrap().unwrap().last_price,
            U256::from(9u64)
        );
    }

    #[test]
    fn test_fallback_price_ignored_for_healthy_asset() {
        let mut f = Fixture::new();
        f.oracle.fallback_oracle = addr(0xfb);
        f.resolved(addr(0xaa), addr(0xa1));

        let outcome = f.fallback_price(addr(0xfb), addr(0xaa), 9);

        assert_eq!(
            outcome.status,
            EventStatus::Skipped(SkipReason::AuthoritativeSource)
        );
    }

    #[test]
    fn test_fallback_usd_price_when_reference_degraded() {
        let mut f = Fixture::new();
        let usd = f.settings.usd_marker;
        f.oracle.fallback_oracle = addr(0xfb);
        f.oracle.usd_reference_source = addr(0xd1);
        f.oracle.usd_reference_requires_fallback = true;

        let outcome = f.fallback_price(addr(0xfb), usd, 2_000_000_000_000_000);

        assert!(outcome.is_applied());
        assert_eq!(f.oracle.usd_reference_price, U256::from(200_000u64));
    }

    #[test]
    fn test_weth_set_replaces_record() {
        let mut f = Fixture::new();
        for (block, weth) in [(1u64, addr(0x11)), (2, addr(0x22))] {
            let prov = Provenance::new(block, block * 10, addr(0x77));
            let (mut ctx, _) = f.ctx();
            apply_weth_set(&mut ctx, weth, &prov).unwrap();
        }
        let reserve = f.store.weth_reserve().unwrap();
        assert_eq!(reserve.address, addr(0x22));
        assert_eq!(reserve.updated_block_number, 2);
        assert_eq!(reserve.symbol, "WETH");
    }
}
