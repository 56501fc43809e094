//! Swap quoting against live market routes.
//!
//! The evaluator asks a connector for a route from the operator's reserve
//! token to the order's take token; the resulting estimation is carried into
//! fulfillment so the broadcast transaction replays the exact route that was
//! judged profitable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taker_types::{Address, ChainEngine, ChainId, U256};
use thiserror::Error;

mod jupiter;
mod one_inch;
mod router;

pub use jupiter::JupiterConnector;
pub use one_inch::OneInchConnector;
pub use router::SwapRouter;

#[derive(Debug, Error)]
pub enum SwapError {
	#[error("swap quote request failed: {0}")]
	Http(String),
	#[error("swap quote response malformed: {0}")]
	InvalidResponse(String),
	#[error("chain {0} is disabled for swaps")]
	ChainDisabled(ChainId),
	#[error("no connector for chain {0}")]
	UnsupportedChain(ChainId),
}

/// A quote request with an explicit slippage budget.
///
/// Slippage is a per-request field; there is no process-wide override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
	pub chain_id: ChainId,
	pub token_in: Address,
	pub token_out: Address,
	pub amount_in: U256,
	pub slippage_bps: u32,
	pub recipient: Address,
}

/// A fetched route, reusable when building the fulfill transaction.
#[derive(Debug, Clone)]
pub struct SwapEstimation {
	pub request: SwapRequest,
	pub amount_out: U256,
	/// Connector-specific route description, replayed verbatim by the
	/// transaction builder.
	pub route: serde_json::Value,
	pub fetched_at: DateTime<Utc>,
}

/// A single-engine quote source.
#[async_trait]
pub trait SwapConnector: Send + Sync {
	fn engine(&self) -> ChainEngine;
	async fn quote(&self, request: SwapRequest) -> Result<SwapEstimation, SwapError>;
}

/// Render a token address the way the engine's APIs expect it.
pub(crate) fn format_token(chain_id: ChainId, token: &Address) -> String {
	match chain_id.engine() {
		ChainEngine::Evm => format!("0x{}", hex::encode(&token.0)),
		ChainEngine::Solana => bs58::encode(&token.0).into_string(),
	}
}

pub(crate) fn parse_amount(raw: &str) -> Result<U256, SwapError> {
	U256::from_str_radix(raw, 10)
		.map_err(|e| SwapError::InvalidResponse(format!("bad amount '{}': {}", raw, e)))
}
