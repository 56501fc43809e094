//! USD-worth estimation for order legs.

use crate::{u256_to_f64, PriceError, PriceSource};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use taker_chains::ChainClient;
use taker_types::{Address, ChainId, TokenAmount, U256};

/// Combines live prices with cached token decimals.
///
/// Decimals never change for a deployed token, so the cache is
/// fill-once.
pub struct UsdEstimator {
	prices: Arc<dyn PriceSource>,
	clients: HashMap<ChainId, Arc<dyn ChainClient>>,
	decimals: DashMap<(ChainId, Address), u8>,
}

impl UsdEstimator {
	pub fn new(
		prices: Arc<dyn PriceSource>,
		clients: HashMap<ChainId, Arc<dyn ChainClient>>,
	) -> Self {
		Self {
			prices,
			clients,
			decimals: DashMap::new(),
		}
	}

	pub async fn decimals(&self, chain_id: ChainId, token: &Address) -> Result<u8, PriceError> {
		let key = (chain_id, token.clone());
		if let Some(cached) = self.decimals.get(&key) {
			return Ok(*cached);
		}
		let client = self
			.clients
			.get(&chain_id)
			.ok_or(PriceError::UnsupportedChain(chain_id))?;
		let decimals = client
			.token_decimals(token)
			.await
			.map_err(|e| PriceError::Decimals(e.to_string()))?;
		self.decimals.insert(key, decimals);
		Ok(decimals)
	}

	/// USD worth of a token amount: price × amount / 10^decimals.
	pub async fn usd_worth(&self, leg: &TokenAmount) -> Result<f64, PriceError> {
		let price = self.prices.token_price_usd(leg.chain_id, &leg.token).await?;
		let decimals = self.decimals(leg.chain_id, &leg.token).await?;
		Ok(price * u256_to_f64(leg.amount) / 10f64.powi(decimals as i32))
	}

	/// Token units whose market value is `usd`, rounded up.
	pub async fn token_units_for_usd(
		&self,
		chain_id: ChainId,
		token: &Address,
		usd: f64,
	) -> Result<U256, PriceError> {
		let price = self.prices.token_price_usd(chain_id, token).await?;
		let decimals = self.decimals(chain_id, token).await?;
		let units = (usd / price * 10f64.powi(decimals as i32)).ceil();
		if !units.is_finite() || units < 0.0 {
			return Err(PriceError::InvalidResponse(format!(
				"non-finite unit conversion for {} usd",
				usd
			)));
		}
		Ok(U256::from(units as u128))
	}

	/// USD cost of `gas_units` at `gas_price` in the chain's native token.
	pub async fn gas_cost_usd(
		&self,
		chain_id: ChainId,
		gas_units: u64,
		gas_price: u128,
	) -> Result<f64, PriceError> {
		let native = self.prices.native_price_usd(chain_id).await?;
		let wei = gas_units as f64 * gas_price as f64;
		Ok(wei / 1e18 * native)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use taker_chains::{ChainError, GiveOrderState};
	use taker_types::{OrderId, Transaction, TransactionHash, TransactionReceipt};

	struct FixedPrices;

	#[async_trait]
	impl PriceSource for FixedPrices {
		async fn token_price_usd(&self, _: ChainId, _: &Address) -> Result<f64, PriceError> {
			Ok(2.0)
		}

		async fn native_price_usd(&self, _: ChainId) -> Result<f64, PriceError> {
			Ok(3_000.0)
		}
	}

	struct SixDecimalsClient;

	#[async_trait]
	impl ChainClient for SixDecimalsClient {
		fn chain_id(&self) -> ChainId {
			ChainId::ETHEREUM
		}

		async fn token_balance(&self, _: &Address, _: &Address) -> Result<U256, ChainError> {
			Ok(U256::ZERO)
		}

		async fn token_decimals(&self, _: &Address) -> Result<u8, ChainError> {
			Ok(6)
		}

		async fn estimate_gas(&self, _: &Transaction) -> Result<u64, ChainError> {
			Ok(0)
		}

		async fn gas_price(&self) -> Result<u128, ChainError> {
			Ok(0)
		}

		async fn send_transaction(&self, _: Transaction) -> Result<TransactionHash, ChainError> {
			Err(ChainError::Rpc("not implemented".to_string()))
		}

		async fn transaction_receipt(
			&self,
			_: &TransactionHash,
		) -> Result<Option<TransactionReceipt>, ChainError> {
			Ok(None)
		}

		async fn give_order_state(&self, _: &OrderId) -> Result<GiveOrderState, ChainError> {
			Ok(GiveOrderState::NotFound)
		}

		async fn is_order_fulfilled(&self, _: &OrderId) -> Result<bool, ChainError> {
			Ok(false)
		}
	}

	fn estimator() -> UsdEstimator {
		let mut clients: HashMap<ChainId, Arc<dyn ChainClient>> = HashMap::new();
		clients.insert(ChainId::ETHEREUM, Arc::new(SixDecimalsClient));
		UsdEstimator::new(Arc::new(FixedPrices), clients)
	}

	#[tokio::test]
	async fn test_usd_worth_scales_by_decimals() {
		let est = estimator();
		let leg = TokenAmount {
			chain_id: ChainId::ETHEREUM,
			token: Address::evm([1u8; 20]),
			amount: U256::from(5_000_000u64), // 5.0 tokens at 6 decimals
		};
		let worth = est.usd_worth(&leg).await.unwrap();
		assert_eq!(worth, 10.0); // 5.0 * $2
	}

	#[tokio::test]
	async fn test_token_units_round_trip() {
		let est = estimator();
		let units = est
			.token_units_for_usd(ChainId::ETHEREUM, &Address::evm([1u8; 20]), 10.0)
			.await
			.unwrap();
		assert_eq!(units, U256::from(5_000_000u64));
	}

	#[tokio::test]
	async fn test_gas_cost_usd() {
		let est = estimator();
		// 100k gas at 20 gwei with ETH at $3000 => 0.002 ETH => $6
		let cost = est
			.gas_cost_usd(ChainId::ETHEREUM, 100_000, 20_000_000_000)
			.await
			.unwrap();
		assert!((cost - 6.0).abs() < 1e-9);
	}
}
