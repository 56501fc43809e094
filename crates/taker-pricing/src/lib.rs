//! Token prices and USD-worth estimation.

use async_trait::async_trait;
use taker_types::{Address, ChainId};
use thiserror::Error;

mod cache;
mod coingecko;
mod estimator;

pub use cache::CachedPriceSource;
pub use coingecko::CoingeckoPriceSource;
pub use estimator::UsdEstimator;

#[derive(Debug, Error)]
pub enum PriceError {
	#[error("price request failed: {0}")]
	Http(String),
	#[error("price response malformed: {0}")]
	InvalidResponse(String),
	#[error("no price listing for token {token} on chain {chain_id}")]
	UnknownToken { chain_id: ChainId, token: Address },
	#[error("no price platform for chain {0}")]
	UnsupportedChain(ChainId),
	#[error("decimals lookup failed: {0}")]
	Decimals(String),
}

/// Live USD price quotes.
#[async_trait]
pub trait PriceSource: Send + Sync {
	async fn token_price_usd(&self, chain_id: ChainId, token: &Address) -> Result<f64, PriceError>;

	/// Price of the chain's native gas token.
	async fn native_price_usd(&self, chain_id: ChainId) -> Result<f64, PriceError>;
}

/// Lossy decimal conversion for USD arithmetic.
///
/// Magnitudes beyond f64 saturate; USD worths in that territory are far
/// past every configured threshold anyway.
pub fn u256_to_f64(value: taker_types::U256) -> f64 {
	value.to_string().parse::<f64>().unwrap_or(f64::INFINITY)
}
