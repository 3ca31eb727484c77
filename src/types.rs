//! Core types used throughout the oracle indexer
//!
//! Defines addresses, event envelopes, asset classifications and feed tracker kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use ethers::types::{Address, U256};

/// Reserved asset id standing for "priced in USD".
pub const MOCK_USD_ADDRESS: &str = "0x10f7fc1f91ba351f9c629c5947ad69bd03c05b96";

/// Zero-segment limit used by the legacy bad-address guard.
pub const DEFAULT_MAX_ZERO_SEGMENTS: usize = 38;

/// Parse the default USD marker.
pub fn mock_usd_address() -> Address {
    parse_address(MOCK_USD_ADDRESS).unwrap_or_default()
}

/// Parse a `0x`-prefixed (or bare) 20-byte hex address.
pub fn parse_address(raw: &str) -> Option<Address> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(digits).ok()?;
    if bytes.len() != 20 {
        return None;
    }
    Some(Address::from_slice(&bytes))
}

/// Canonical textual id of an asset: `0x` followed by 40 lowercase hex digits.
pub fn asset_key(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// Where an asset source update came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceOrigin {
    /// `AssetSourceUpdated` emitted by the proxy price provider itself
    Legacy,
    /// `AggregatorUpdated` emitted by the Chainlink sources registry
    Registry,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOrigin::Legacy => write!(f, "legacy"),
            SourceOrigin::Registry => write!(f, "registry"),
        }
    }
}

/// Asset classification reported by an extended price aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Simple,
    Composite,
}

impl Default for AssetKind {
    fn default() -> Self {
        AssetKind::Simple
    }
}

impl AssetKind {
    /// Decode the aggregator's `getTokenType()` code
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => AssetKind::Composite,
            _ => AssetKind::Simple,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Simple => write!(f, "Simple"),
            AssetKind::Composite => write!(f, "Composite"),
        }
    }
}

/// Platform a composite asset is priced on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Uniswap,
    Balancer,
}

impl Platform {
    /// Decode the aggregator's `getPlatformId()` code; `None` for unsupported platforms
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Platform::Uniswap),
            2 => Some(Platform::Balancer),
            _ => None,
        }
    }

    /// Feed tracker that follows pools of this platform
    pub fn tracker(&self) -> TrackerKind {
        match self {
            Platform::Uniswap => TrackerKind::UniswapExchange,
            Platform::Balancer => TrackerKind::BalancerPool,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Uniswap => write!(f, "Uniswap"),
            Platform::Balancer => write!(f, "Balancer"),
        }
    }
}

/// Kinds of continuous feed trackers the host can start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackerKind {
    ChainlinkAggregator,
    FallbackOracle,
    UniswapExchange,
    BalancerPool,
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerKind::ChainlinkAggregator => write!(f, "ChainlinkAggregator"),
            TrackerKind::FallbackOracle => write!(f, "FallbackOracle"),
            TrackerKind::UniswapExchange => write!(f, "UniswapExchange"),
            TrackerKind::BalancerPool => write!(f, "BalancerPool"),
        }
    }
}

/// Block context every event carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub block_number: u64,
    /// Block timestamp in seconds
    pub timestamp: u64,
    /// Contract that emitted the event
    pub address: Address,
}

impl Provenance {
    pub fn new(block_number: u64, timestamp: u64, address: Address) -> Self {
        Self {
            block_number,
            timestamp,
            address,
        }
    }
}

/// Events the indexer consumes, in chain order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleEvent {
    WethSet {
        weth: Address,
    },
    FallbackOracleUpdated {
        fallback_oracle: Address,
    },
    AssetSourceUpdated {
        asset: Address,
        source: Address,
    },
    AggregatorUpdated {
        token: Address,
        aggregator: Address,
    },
    /// Answer pushed by a tracked Chainlink aggregator (the provenance address)
    AnswerUpdated {
        #[serde(with = "dec_u256")]
        current: U256,
    },
    /// Price pushed by the fallback oracle (the provenance address)
    FallbackAssetPriceUpdated {
        asset: Address,
        #[serde(with = "dec_u256")]
        price: U256,
    },
}

impl OracleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OracleEvent::WethSet { .. } => "WethSet",
            OracleEvent::FallbackOracleUpdated { .. } => "FallbackOracleUpdated",
            OracleEvent::AssetSourceUpdated { .. } => "AssetSourceUpdated",
            OracleEvent::AggregatorUpdated { .. } => "AggregatorUpdated",
            OracleEvent::AnswerUpdated { .. } => "AnswerUpdated",
            OracleEvent::FallbackAssetPriceUpdated { .. } => "FallbackAssetPriceUpdated",
        }
    }
}

/// An event together with the block it was emitted in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub provenance: Provenance,
    pub event: OracleEvent,
}

impl EventEnvelope {
    pub fn new(provenance: Provenance, event: OracleEvent) -> Self {
        Self { provenance, event }
    }
}

/// Serde helpers for uint256 values written as decimal (or `0x` hex) strings
pub mod dec_u256 {
    use super::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid uint256 '{}'", raw)))
    }

    pub fn parse(raw: &str) -> Option<U256> {
        let trimmed = raw.trim();
        match trimmed.strip_prefix("0x") {
            Some(digits) => U256::from_str_radix(digits, 16).ok(),
            None => U256::from_dec_str(trimmed).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_key_is_full_lowercase_hex() {
        let addr = mock_usd_address();
        assert_eq!(asset_key(&addr), MOCK_USD_ADDRESS);
        assert_eq!(asset_key(&Address::zero()).len(), 42);
    }

    #[test]
    fn test_parse_address_rejects_wrong_length() {
        assert!(parse_address("0x1234").is_none());
        assert!(parse_address("not-hex").is_none());
        assert_eq!(parse_address(MOCK_USD_ADDRESS), Some(mock_usd_address()));
    }

    #[test]
    fn test_kind_and_platform_codes() {
        assert_eq!(AssetKind::from_code(1), AssetKind::Simple);
        assert_eq!(AssetKind::from_code(2), AssetKind::Composite);
        assert_eq!(Platform::from_code(1), Some(Platform::Uniswap));
        assert_eq!(Platform::from_code(2), Some(Platform::Balancer));
        assert_eq!(Platform::from_code(7), None);
        assert_eq!(Platform::Balancer.tracker(), TrackerKind::BalancerPool);
    }

    #[test]
    fn test_dec_u256_accepts_decimal_and_hex() {
        assert_eq!(dec_u256::parse("1000"), Some(U256::from(1000u64)));
        assert_eq!(dec_u256::parse("0x10"), Some(U256::from(16u64)));
        assert_eq!(dec_u256::parse("abc"), None);
    }

    #[test]
    fn test_event_envelope_from_json() {
        let json = r#"{
            "block_number": 10,
            "timestamp": 1600000000,
            "address": "0x0000000000000000000000000000000000000abc",
            "event": {
                "type": "answer_updated",
                "current": "250000000000"
            }
        }"#;
        let envelope: EventEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.provenance.block_number, 10);
        assert_eq!(
            envelope.event,
            OracleEvent::AnswerUpdated {
                current: U256::from(250_000_000_000u64)
            }
        );
    }
}
