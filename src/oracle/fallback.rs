//! Fallback oracle switch-over
//!
//! When the proxy provider points at a new fallback oracle, every asset currently
//! priced through the fallback path is re-quoted, then the USD reference is refreshed
//! from the new oracle if the primary USD source cannot be trusted.

use tracing::{debug, info};

use crate::error::Result;
use crate::oracle::normalize::format_usd_eth_chainlink_price;
use crate::oracle::prices::{generic_price_update, usd_eth_price_update};
use crate::oracle::state::PriceOracle;
use crate::oracle::{Diagnostic, EventOutcome, HandlerContext};
use crate::types::{Address, Provenance, TrackerKind, U256};

pub fn apply_fallback_oracle_update(
    ctx: &mut HandlerContext<'_>,
    oracle: &mut PriceOracle,
    fallback: Address,
    provenance: &Provenance,
) -> Result<EventOutcome> {
    let mut outcome = EventOutcome::applied();
    oracle.fallback_oracle = fallback;

    if fallback.is_zero() {
        info!("Fallback oracle cleared");
        return Ok(outcome);
    }

    ctx.trackers.register(TrackerKind::FallbackOracle, fallback);

    // the proxy provider is the emitter of this event
    let proxy = provenance.address;
    let members: Vec<Address> = oracle.tokens_with_fallback.iter().copied().collect();
    let mut requoted = 0usize;

    for asset_id in members {
        // the USD marker is priced on the singleton, refreshed below
        if asset_id == ctx.settings.usd_marker {
            continue;
        }
        let mut asset = ctx.store.asset_or_init(asset_id)?;
        if !asset.needs_fallback() {
            continue;
        }
        match ctx.chain.asset_price(proxy, asset_id) {
            Ok(price) => {
                generic_price_update(&mut *ctx.store, &mut asset, price, provenance)?;
                requoted += 1;
            }
            Err(_) => outcome.push(Diagnostic::FallbackRequoteFailed {
                asset: asset_id,
                proxy,
                fallback,
            }),
        }
    }

    match usd_reference_from(ctx, fallback) {
        Some(price) => {
            if oracle.usd_reference_requires_fallback || oracle.usd_reference_source.is_zero() {
                usd_eth_price_update(&mut *ctx.store, oracle, price, provenance)?;
            } else {
                debug!(source = ?oracle.usd_reference_source, "USD reference served by its own source");
            }
        }
        None => outcome.push(Diagnostic::UsdReferenceUnavailable { fallback }),
    }

    info!(
        fallback = ?fallback,
        proxy = ?proxy,
        requoted,
        failures = outcome.diagnostics.len(),
        "Fallback oracle updated"
    );

    Ok(outcome)
}

/// `eth_usd_price` on dev deployments, the USD marker quote elsewhere
fn usd_reference_from(ctx: &HandlerContext<'_>, fallback: Address) -> Option<U256> {
    match ctx.chain.eth_usd_price(fallback) {
        Ok(price) => Some(price),
        Err(e) => {
            debug!(fallback = ?fallback, error = %e, "eth_usd_price unavailable, quoting USD marker");
            ctx.chain
                .asset_price(fallback, ctx.settings.usd_marker)
                .ok()
                .map(format_usd_eth_chainlink_price)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::sources::{ScriptedChain, TrackerLog};
    use crate::oracle::state::PriceOracleAsset;
    use crate::oracle::ResolverSettings;
    use crate::persistence::{MemoryStore, OracleStore};

    fn addr(tag: u8) -> Address {
        Address::repeat_byte(tag)
    }

    fn run(
        chain: &ScriptedChain,
        store: &mut MemoryStore,
        trackers: &mut TrackerLog,
        oracle: &mut PriceOracle,
        fallback: Address,
    ) -> EventOutcome {
        let settings = ResolverSettings::default();
        let mut ctx = HandlerContext {
            chain,
            store,
            trackers,
            settings: &settings,
        };
        let provenance = Provenance::new(50, 1_700_000_000, addr(0x77));
        apply_fallback_oracle_update(&mut ctx, oracle, fallback, &provenance).unwrap()
    }

    fn seed_degraded(store: &mut MemoryStore, oracle: &mut PriceOracle, id: Address) {
        let asset = PriceOracleAsset::new(id);
        store.save_asset(&asset).unwrap();
        oracle.sync_fallback_membership(&asset);
    }

    #[test]
    fn test_requotes_fallback_assets() {
        let chain = ScriptedChain::new()
            .with_asset_price(addr(0x77), addr(0xaa), U256::from(123u64))
            .with_eth_usd_price(addr(0xfb), U256::from(400_000u64));
        let mut store = MemoryStore::new();
        let mut trackers = TrackerLog::new();
        let mut oracle = PriceOracle::default();
        seed_degraded(&mut store, &mut oracle, addr(0xaa));

        let outcome = run(&chain, &mut store, &mut trackers, &mut oracle, addr(0xfb));

        assert!(outcome.diagnostics.is_empty());
        assert_eq!(oracle.fallback_oracle, addr(0xfb));
        assert!(trackers.contains(TrackerKind::FallbackOracle, addr(0xfb)));
        let asset = store.asset(&addr(0xaa)).unwrap().unwrap();
        assert_eq!(asset.last_price, U256::from(123u64));
        // price-only publish
        assert!(asset.is_fallback_required);
        assert_eq!(oracle.usd_reference_price, U256::from(400_000u64));
    }

    #[test]
    fn test_requote_failure_continues_and_refreshes_usd() {
        let usd = ResolverSettings::default().usd_marker;
        let chain = ScriptedChain::new()
            .with_asset_price(addr(0x77), addr(0xbb), U256::from(9u64))
            .with_asset_price(addr(0xfb), usd, U256::from(2_500_000_000_000_000u64));
        let mut store = MemoryStore::new();
        let mut trackers = TrackerLog::new();
        let mut oracle = PriceOracle::default();
        seed_degraded(&mut store, &mut oracle, addr(0xaa));
        seed_degraded(&mut store, &mut oracle, addr(0xbb));

        let outcome = run(&chain, &mut store, &mut trackers, &mut oracle, addr(0xfb));

        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::FallbackRequoteFailed {
                asset: addr(0xaa),
                proxy: addr(0x77),
                fallback: addr(0xfb),
            }]
        );
        assert_eq!(
            store.asset(&addr(0xbb)).unwrap().unwrap().last_price,
            U256::from(9u64)
        );
        assert_eq!(oracle.usd_reference_price, U256::from(250_000u64));
        assert_eq!(oracle.last_update_timestamp, 1_700_000_000);
    }

    #[test]
    fn test_trusted_usd_source_is_kept() {
        let chain = ScriptedChain::new().with_eth_usd_price(addr(0xfb), U256::from(1u64));
        let mut store = MemoryStore::new();
        let mut trackers = TrackerLog::new();
        let mut oracle = PriceOracle {
            usd_reference_source: addr(0xd1),
            usd_reference_price: U256::from(350_000u64),
            ..PriceOracle::default()
        };

        run(&chain, &mut store, &mut trackers, &mut oracle, addr(0xfb));

        assert_eq!(oracle.usd_reference_price, U256::from(350_000u64));
        assert!(store.usd_price_history().is_empty());
    }

    #[test]
    fn test_missing_usd_reference_is_diagnosed() {
        let chain = ScriptedChain::new();
        let mut store = MemoryStore::new();
        let mut trackers = TrackerLog::new();
        let mut oracle = PriceOracle::default();

        let outcome = run(&chain, &mut store, &mut trackers, &mut oracle, addr(0xfb));

        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::UsdReferenceUnavailable {
                fallback: addr(0xfb)
            }]
        );
        assert_eq!(oracle.usd_reference_price, U256::zero());
    }

    #[test]
    fn test_null_fallback_only_clears() {
        let chain = ScriptedChain::new();
        let mut store = MemoryStore::new();
        let mut trackers = TrackerLog::new();
        let mut oracle = PriceOracle {
            fallback_oracle: addr(0xfb),
            ..PriceOracle::default()
        };
        seed_degraded(&mut store, &mut oracle, addr(0xaa));

        let outcome = run(&chain, &mut store, &mut trackers, &mut oracle, Address::zero());

        assert!(outcome.diagnostics.is_empty());
        assert!(oracle.fallback_oracle.is_zero());
        assert!(trackers.registrations().is_empty());
        assert!(store.price_history().is_empty());
    }
}
