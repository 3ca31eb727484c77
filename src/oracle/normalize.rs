//! Price normalization
//!
//! Stored prices carry 8 fractional digits. Quotes in the 18-digit convention are
//! truncated down to it.

use rust_decimal::Decimal;

use crate::types::U256;

/// Fractional digits of every stored price
pub const PRICE_DECIMALS: u32 = 8;

/// Fractional digits of high-precision external quotes
pub const QUOTE_DECIMALS: u32 = 18;

/// Convert an 18-decimal quote into the 8-decimal convention: `floor(x / 10^10)`.
pub fn format_usd_eth_chainlink_price(price: U256) -> U256 {
    price / U256::exp10((QUOTE_DECIMALS - PRICE_DECIMALS) as usize)
}

/// Render a fixed-point integer with `scale` fractional digits, if it fits a `Decimal`.
pub fn to_decimal(price: U256, scale: u32) -> Option<Decimal> {
    if price > U256::from(u128::MAX) {
        return None;
    }
    let mantissa = i128::try_from(price.as_u128()).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale).ok()
}
