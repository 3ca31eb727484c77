//! Price publication onto asset records and the USD reference

use crate::error::Result;
use crate::oracle::state::{PriceHistoryItem, PriceOracle, PriceOracleAsset, UsdPriceHistoryItem};
use crate::persistence::OracleStore;
use crate::types::{Provenance, U256};

/// Store `price` as the asset's current price and append it to the history.
/// Does not touch the price source or fallback flags.
pub fn generic_price_update<S: OracleStore + ?Sized>(
    store: &mut S,
    asset: &mut PriceOracleAsset,
    price: U256,
    provenance: &Provenance,
) -> Result<()> {
    asset.last_price = price;
    asset.last_update_block = provenance.block_number;
    asset.last_update_timestamp = provenance.timestamp;
    store.save_asset(asset)?;
    store.append_price(PriceHistoryItem {
        asset: asset.id,
        price,
        block_number: provenance.block_number,
        timestamp: provenance.timestamp,
    })?;
    tracing::debug!(asset = ?asset.id, price = %price, block = provenance.block_number, "Asset price updated");
    Ok(())
}

/// Store an already-normalized USD reference price on the singleton.
/// The singleton itself is committed by the caller.
pub fn usd_eth_price_update<S: OracleStore + ?Sized>(
    store: &mut S,
    oracle: &mut PriceOracle,
    price: U256,
    provenance: &Provenance,
) -> Result<()> {
    oracle.usd_reference_price = price;
    oracle.last_update_timestamp = provenance.timestamp;
    store.append_usd_price(UsdPriceHistoryItem {
        price,
        block_number: provenance.block_number,
        timestamp: provenance.timestamp,
    })?;
    tracing::debug!(price = %price, block = provenance.block_number, "USD reference price updated");
    Ok(())
}
