//! Dependency edges between composite assets and what they are priced from
//!
//! Edges are only recorded. Nothing here walks them: a dependency's price change
//! does not reprice its dependents.

use crate::oracle::state::{PriceOracle, PriceOracleAsset};
use crate::types::Address;

/// Record that `dependent` is priced off `dependency`. Returns whether the edge is new.
pub fn add_dependent_edge(dependency: &mut PriceOracleAsset, dependent: Address) -> bool {
    dependency.dependent_assets.insert(dependent)
}

/// Record that `dependent` is priced directly off the USD marker. Returns whether it is new.
pub fn add_usd_dependent(oracle: &mut PriceOracle, dependent: Address) -> bool {
    oracle.usd_dependent_assets.insert(dependent)
}

pub fn dependents_of(asset: &PriceOracleAsset) -> impl Iterator<Item = &Address> {
    asset.dependent_assets.iter()
}

pub fn is_usd_dependent(oracle: &PriceOracle, asset: &Address) -> bool {
    oracle.usd_dependent_assets.contains(asset)
}
