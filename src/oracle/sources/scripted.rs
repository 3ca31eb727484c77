//! Scripted chain - answers contract calls from a pre-recorded script
//!
//! Used to replay event files offline. Any call the script has no answer for
//! behaves like a revert.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CallError, CallResult};
use crate::oracle::sources::ChainReader;
use crate::types::{dec_u256, Address, U256};

/// One `getAssetPrice` answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub provider: Address,
    pub asset: Address,
    #[serde(with = "dec_u256")]
    pub price: U256,
}

/// One `getEthUsdPrice` answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthUsdQuote {
    pub oracle: Address,
    #[serde(with = "dec_u256")]
    pub price: U256,
}

/// Behaviour of one aggregator contract. `None` fields revert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceScript {
    pub address: Address,
    #[serde(default)]
    pub token_type: Option<u8>,
    #[serde(default, with = "opt_dec_u256")]
    pub latest_answer: Option<U256>,
    #[serde(default)]
    pub sub_tokens: Option<Vec<Address>>,
    #[serde(default)]
    pub platform_id: Option<u8>,
}

impl SourceScript {
    /// Plain Chainlink feed with the given latest answer
    pub fn simple(address: Address, latest_answer: U256) -> Self {
        Self {
            address,
            token_type: Some(1),
            latest_answer: Some(latest_answer),
            ..Default::default()
        }
    }

    /// Composite aggregator over `sub_tokens`
    pub fn composite(address: Address, sub_tokens: Vec<Address>, platform_id: Option<u8>) -> Self {
        Self {
            address,
            token_type: Some(2),
            sub_tokens: Some(sub_tokens),
            platform_id,
            ..Default::default()
        }
    }
}

/// Serializable form of a [`ScriptedChain`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainScript {
    #[serde(default)]
    pub asset_prices: Vec<PriceQuote>,
    #[serde(default)]
    pub eth_usd_prices: Vec<EthUsdQuote>,
    #[serde(default)]
    pub sources: Vec<SourceScript>,
}

/// [`ChainReader`] backed by in-memory answers
#[derive(Debug, Clone, Default)]
pub struct ScriptedChain {
    asset_prices: HashMap<(Address, Address), U256>,
    eth_usd_prices: HashMap<Address, U256>,
    sources: HashMap<Address, SourceScript>,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_script(script: ChainScript) -> Self {
        let mut chain = Self::new();
        for quote in script.asset_prices {
            chain.set_asset_price(quote.provider, quote.asset, quote.price);
        }
        for quote in script.eth_usd_prices {
            chain.eth_usd_prices.insert(quote.oracle, quote.price);
        }
        for source in script.sources {
            chain.set_source(source);
        }
        chain
    }

    pub fn with_asset_price(mut self, provider: Address, asset: Address, price: U256) -> Self {
        self.set_asset_price(provider, asset, price);
        self
    }

    pub fn with_eth_usd_price(mut self, oracle: Address, price: U256) -> Self {
        self.eth_usd_prices.insert(oracle, price);
        self
    }

    pub fn with_source(mut self, source: SourceScript) -> Self {
        self.set_source(source);
        self
    }

    pub fn set_asset_price(&mut self, provider: Address, asset: Address, price: U256) {
        self.asset_prices.insert((provider, asset), price);
    }

    /// Make `getAssetPrice(asset)` on `provider` revert from now on
    pub fn revert_asset_price(&mut self, provider: Address, asset: Address) {
        self.asset_prices.remove(&(provider, asset));
    }

    pub fn set_source(&mut self, source: SourceScript) {
        self.sources.insert(source.address, source);
    }

    fn source(&self, address: Address, method: &'static str) -> CallResult<&SourceScript> {
        self.sources.get(&address).ok_or(CallError::Reverted {
            contract: address,
            method,
        })
    }
}

fn reverted<T>(contract: Address, method: &'static str) -> impl FnOnce() -> CallResult<T> {
    move || Err(CallError::Reverted { contract, method })
}

impl ChainReader for ScriptedChain {
    fn asset_price(&self, provider: Address, asset: Address) -> CallResult<U256> {
        self.asset_prices
            .get(&(provider, asset))
            .copied()
            .map_or_else(reverted(provider, "getAssetPrice"), Ok)
    }

    fn eth_usd_price(&self, oracle: Address) -> CallResult<U256> {
        self.eth_usd_prices
            .get(&oracle)
            .copied()
            .map_or_else(reverted(oracle, "getEthUsdPrice"), Ok)
    }

    fn token_type(&self, source: Address) -> CallResult<u8> {
        self.source(source, "getTokenType")?
            .token_type
            .map_or_else(reverted(source, "getTokenType"), Ok)
    }

    fn latest_answer(&self, source: Address) -> CallResult<U256> {
        self.source(source, "latestAnswer")?
            .latest_answer
            .map_or_else(reverted(source, "latestAnswer"), Ok)
    }

    fn sub_tokens(&self, source: Address) -> CallResult<Vec<Address>> {
        self.source(source, "getSubTokens")?
            .sub_tokens
            .clone()
            .map_or_else(reverted(source, "getSubTokens"), Ok)
    }

    fn platform_id(&self, source: Address) -> CallResult<u8> {
        self.source(source, "getPlatformId")?
            .platform_id
            .map_or_else(reverted(source, "getPlatformId"), Ok)
    }
}

mod opt_dec_u256 {
    use crate::types::{dec_u256, U256};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => dec_u256::parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid uint256 '{}'", raw))),
            None => Ok(None),
        }
    }
}
