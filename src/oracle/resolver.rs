//! Price source resolution
//!
//! Handles `AssetSourceUpdated` (legacy, emitted by the proxy price provider) and
//! `AggregatorUpdated` (emitted by the Chainlink sources registry). Both land in
//! [`apply_asset_source_update`]; once the registry has set a source for an asset,
//! legacy updates for that asset are ignored.

use tracing::{debug, info};

use crate::error::Result;
use crate::oracle::graph;
use crate::oracle::normalize::format_usd_eth_chainlink_price;
use crate::oracle::prices::{generic_price_update, usd_eth_price_update};
use crate::oracle::state::{ChainlinkAggregator, PriceOracle, PriceOracleAsset};
use crate::oracle::{Diagnostic, EventOutcome, HandlerContext, SkipReason};
use crate::types::{Address, AssetKind, Platform, Provenance, SourceOrigin, TrackerKind, U256};

/// Make `source` the price source of `asset_id` and re-derive everything that hangs
/// off it: kind, fallback flag, dependency edges, trackers and the current price.
pub fn apply_asset_source_update(
    ctx: &mut HandlerContext<'_>,
    oracle: &mut PriceOracle,
    asset_id: Address,
    source: Address,
    origin: SourceOrigin,
    provenance: &Provenance,
) -> Result<EventOutcome> {
    if ctx.settings.is_malformed_asset(&asset_id) {
        let mut outcome = EventOutcome::skipped(SkipReason::MalformedAsset);
        outcome.push(Diagnostic::MalformedAsset { asset: asset_id });
        return Ok(outcome);
    }

    let existing = ctx.store.asset(&asset_id)?;
    let registry_owned = existing
        .as_ref()
        .map(|a| a.from_chainlink_registry)
        .unwrap_or(false);
    if origin == SourceOrigin::Legacy && registry_owned {
        debug!(asset = ?asset_id, source = ?source, "Legacy source update ignored, registry owns asset");
        return Ok(EventOutcome::skipped(SkipReason::RegistryPrecedence));
    }

    let mut outcome = EventOutcome::applied();
    let mut asset = existing.unwrap_or_else(|| PriceOracleAsset::new(asset_id));

    match origin {
        SourceOrigin::Registry => asset.from_chainlink_registry = true,
        // legacy events are emitted by the proxy provider itself
        SourceOrigin::Legacy => {
            if oracle.seed_proxy_provider(provenance.address) {
                info!(proxy = ?oracle.proxy_provider, "Proxy price provider set");
            }
        }
    }

    let price_from_proxy = ctx
        .chain
        .asset_price(oracle.proxy_provider, asset_id)
        .unwrap_or_else(|e| {
            debug!(asset = ?asset_id, error = %e, "Proxy price unavailable, using zero");
            U256::zero()
        });

    asset.is_fallback_required = true;

    if !source.is_zero() {
        asset.kind = ctx
            .chain
            .token_type(source)
            .map(AssetKind::from_code)
            .unwrap_or_default();

        match asset.kind {
            AssetKind::Simple => {
                ctx.trackers.register(TrackerKind::ChainlinkAggregator, source);
                asset.is_fallback_required = match ctx.chain.latest_answer(source) {
                    Ok(answer) => answer.is_zero(),
                    Err(e) => {
                        debug!(asset = ?asset_id, source = ?source, error = %e, "Aggregator has no answer");
                        true
                    }
                };
            }
            AssetKind::Composite => {
                asset.is_fallback_required = false;
                link_dependencies(ctx, oracle, &mut asset, source, &mut outcome)?;
                register_platform_tracker(ctx, &asset, source, &mut outcome);
            }
        }

        ctx.store.save_aggregator(&ChainlinkAggregator {
            id: source,
            oracle_asset: asset_id,
        })?;
    }

    asset.price_source = source;
    oracle.sync_fallback_membership(&asset);

    if asset_id == ctx.settings.usd_marker {
        oracle.usd_reference_requires_fallback = asset.is_fallback_required;
        oracle.usd_reference_source = source;
        ctx.store.save_asset(&asset)?;
        usd_eth_price_update(
            &mut *ctx.store,
            oracle,
            format_usd_eth_chainlink_price(price_from_proxy),
            provenance,
        )?;
    } else {
        generic_price_update(&mut *ctx.store, &mut asset, price_from_proxy, provenance)?;
    }

    info!(
        asset = ?asset_id,
        source = ?source,
        origin = %origin,
        kind = %asset.kind,
        state = %asset.state(),
        fallback_required = asset.is_fallback_required,
        "Price source updated"
    );

    Ok(outcome)
}

/// Record the composite `asset` as a dependent of each of the source's sub-tokens
fn link_dependencies(
    ctx: &mut HandlerContext<'_>,
    oracle: &mut PriceOracle,
    asset: &mut PriceOracleAsset,
    source: Address,
    outcome: &mut EventOutcome,
) -> Result<()> {
    let sub_tokens = match ctx.chain.sub_tokens(source) {
        Ok(tokens) => tokens,
        Err(_) => {
            outcome.push(Diagnostic::SubTokensQueryFailed {
                asset: asset.id,
                source,
            });
            Vec::new()
        }
    };

    for dependency_id in sub_tokens {
        if dependency_id == ctx.settings.usd_marker {
            graph::add_usd_dependent(oracle, asset.id);
        } else if dependency_id == asset.id {
            graph::add_dependent_edge(asset, asset.id);
        } else {
            let mut dependency = ctx.store.asset_or_init(dependency_id)?;
            if graph::add_dependent_edge(&mut dependency, asset.id) {
                ctx.store.save_asset(&dependency)?;
            }
            oracle.sync_fallback_membership(&dependency);
        }
    }
    Ok(())
}

fn register_platform_tracker(
    ctx: &mut HandlerContext<'_>,
    asset: &PriceOracleAsset,
    source: Address,
    outcome: &mut EventOutcome,
) {
    match ctx.chain.platform_id(source) {
        Ok(code) => match Platform::from_code(code) {
            Some(platform) => ctx.trackers.register(platform.tracker(), asset.id),
            None => outcome.push(Diagnostic::UnsupportedPlatform {
                asset: asset.id,
                source,
                platform_id: code,
            }),
        },
        Err(_) => outcome.push(Diagnostic::PlatformQueryFailed {
            asset: asset.id,
            source,
        }),
    }
}
