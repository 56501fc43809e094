//! Coingecko price source.

use crate::{PriceError, PriceSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use taker_types::{Address, ChainEngine, ChainId};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

pub struct CoingeckoPriceSource {
	client: reqwest::Client,
	base_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenPriceEntry {
	usd: f64,
}

impl CoingeckoPriceSource {
	pub fn new() -> Result<Self, PriceError> {
		Self::with_base_url(DEFAULT_BASE_URL.to_string())
	}

	pub fn with_base_url(base_url: String) -> Result<Self, PriceError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(10))
			.build()
			.map_err(|e| PriceError::Http(e.to_string()))?;
		Ok(Self { client, base_url })
	}

	fn platform(chain_id: ChainId) -> Result<&'static str, PriceError> {
		match chain_id {
			ChainId::ETHEREUM => Ok("ethereum"),
			ChainId::OPTIMISM => Ok("optimistic-ethereum"),
			ChainId::BNB => Ok("binance-smart-chain"),
			ChainId::POLYGON => Ok("polygon-pos"),
			ChainId::BASE => Ok("base"),
			ChainId::ARBITRUM => Ok("arbitrum-one"),
			ChainId::AVALANCHE => Ok("avalanche"),
			ChainId::SOLANA => Ok("solana"),
			other => Err(PriceError::UnsupportedChain(other)),
		}
	}

	fn native_coin(chain_id: ChainId) -> Result<&'static str, PriceError> {
		match chain_id {
			ChainId::ETHEREUM | ChainId::OPTIMISM | ChainId::BASE | ChainId::ARBITRUM => {
				Ok("ethereum")
			}
			ChainId::BNB => Ok("binancecoin"),
			ChainId::POLYGON => Ok("matic-network"),
			ChainId::AVALANCHE => Ok("avalanche-2"),
			ChainId::SOLANA => Ok("solana"),
			other => Err(PriceError::UnsupportedChain(other)),
		}
	}

	fn contract_key(chain_id: ChainId, token: &Address) -> String {
		match chain_id.engine() {
			// Coingecko keys EVM contracts lowercase
			ChainEngine::Evm => format!("0x{}", hex::encode(&token.0)),
			ChainEngine::Solana => bs58::encode(&token.0).into_string(),
		}
	}
}

#[async_trait]
impl PriceSource for CoingeckoPriceSource {
	async fn token_price_usd(&self, chain_id: ChainId, token: &Address) -> Result<f64, PriceError> {
		let platform = Self::platform(chain_id)?;
		let key = Self::contract_key(chain_id, token);
		let url = format!("{}/simple/token_price/{}", self.base_url, platform);
		debug!(chain = %chain_id, token = %token, "requesting token price");

		let response = self
			.client
			.get(&url)
			.query(&[
				("contract_addresses", key.as_str()),
				("vs_currencies", "usd"),
			])
			.send()
			.await
			.map_err(|e| PriceError::Http(e.to_string()))?;
		if !response.status().is_success() {
			return Err(PriceError::Http(format!(
				"coingecko returned status {}",
				response.status()
			)));
		}

		let body: HashMap<String, TokenPriceEntry> = response
			.json()
			.await
			.map_err(|e| PriceError::InvalidResponse(e.to_string()))?;
		body.get(&key)
			.map(|entry| entry.usd)
			.ok_or_else(|| PriceError::UnknownToken {
				chain_id,
				token: token.clone(),
			})
	}

	async fn native_price_usd(&self, chain_id: ChainId) -> Result<f64, PriceError> {
		let coin = Self::native_coin(chain_id)?;
		let url = format!("{}/simple/price", self.base_url);

		let response = self
			.client
			.get(&url)
			.query(&[("ids", coin), ("vs_currencies", "usd")])
			.send()
			.await
			.map_err(|e| PriceError::Http(e.to_string()))?;
		if !response.status().is_success() {
			return Err(PriceError::Http(format!(
				"coingecko returned status {}",
				response.status()
			)));
		}

		let body: HashMap<String, TokenPriceEntry> = response
			.json()
			.await
			.map_err(|e| PriceError::InvalidResponse(e.to_string()))?;
		body.get(coin)
			.map(|entry| entry.usd)
			.ok_or_else(|| PriceError::InvalidResponse(format!("missing coin {}", coin)))
	}
}
