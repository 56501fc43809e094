//! Processing errors and their retry dispositions.

use std::time::Duration;
use taker_chains::ChainError;
use taker_pricing::PriceError;
use taker_swap::SwapError;
use taker_types::{ChainId, U256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
	#[error("unsupported chain {0}")]
	UnsupportedChain(ChainId),

	/// The order cannot be taken and never will be: no bucket covers it,
	/// its give-side record is gone, or it is already fulfilled.
	#[error("order invalid: {0}")]
	OrderInvalid(String),

	#[error("transient rpc failure: {0}")]
	TransientRpc(String),

	/// The matched constraint range defers fulfillment; retry when the
	/// remaining delay elapses.
	#[error("fulfillment delayed, {0:?} remaining")]
	FulfillmentDelayed(Duration),

	#[error("{budget} budget exhausted")]
	BudgetExhausted { budget: &'static str },

	#[error("insufficient reserve balance: have {have}, need {need}")]
	InsufficientBalance { have: U256, need: U256 },

	#[error("not profitable: {0}")]
	Unprofitable(String),

	/// Final gas estimate exceeded the pre-estimated cap.
	#[error("gas estimate {estimated} exceeds cap {cap}")]
	GasBlowout { estimated: u64, cap: u64 },

	/// The swap/fulfill client failed during construction or
	/// pre-estimation.
	#[error("client error: {0}")]
	Client(String),

	#[error("broadcast failed: {0}")]
	Broadcast(String),

	#[error("fulfill not observed on-chain within {0:?}")]
	FulfillTimeout(Duration),

	/// A bug: components disagree on derived state. Never broadcast.
	#[error("internal invariant violated: {0}")]
	FatalInternal(String),
}

/// Where a failed order goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
	/// Terminal: clear the order everywhere.
	Drop,
	/// Park in the mempool scheduler with the standard backoff.
	Mempool,
	/// Park with the short fast-track delay, limited times.
	FastTrackMempool,
}

impl ProcessError {
	pub fn disposition(&self) -> Disposition {
		match self {
			ProcessError::UnsupportedChain(_)
			| ProcessError::OrderInvalid(_)
			| ProcessError::FatalInternal(_) => Disposition::Drop,
			ProcessError::GasBlowout { .. } => Disposition::FastTrackMempool,
			ProcessError::TransientRpc(_)
			| ProcessError::FulfillmentDelayed(_)
			| ProcessError::BudgetExhausted { .. }
			| ProcessError::InsufficientBalance { .. }
			| ProcessError::Unprofitable(_)
			| ProcessError::Client(_)
			| ProcessError::Broadcast(_)
			| ProcessError::FulfillTimeout(_) => Disposition::Mempool,
		}
	}
}

impl From<ProcessError> for taker_types::TakerError {
	fn from(err: ProcessError) -> Self {
		match err {
			ProcessError::UnsupportedChain(chain) => taker_types::TakerError::UnsupportedChain(chain),
			other => taker_types::TakerError::Internal(other.to_string()),
		}
	}
}

impl From<ChainError> for ProcessError {
	fn from(err: ChainError) -> Self {
		match err {
			ChainError::Client(msg) => ProcessError::Client(msg),
			other => ProcessError::TransientRpc(other.to_string()),
		}
	}
}

impl From<SwapError> for ProcessError {
	fn from(err: SwapError) -> Self {
		match err {
			SwapError::Http(msg) => ProcessError::TransientRpc(msg),
			SwapError::ChainDisabled(chain) => {
				ProcessError::OrderInvalid(format!("chain {} disabled for swaps", chain))
			}
			SwapError::UnsupportedChain(chain) => ProcessError::UnsupportedChain(chain),
			SwapError::InvalidResponse(msg) => ProcessError::Client(msg),
		}
	}
}

impl From<PriceError> for ProcessError {
	fn from(err: PriceError) -> Self {
		match err {
			PriceError::UnknownToken { chain_id, token } => ProcessError::OrderInvalid(format!(
				"no price listing for token {} on chain {}",
				token, chain_id
			)),
			PriceError::UnsupportedChain(chain) => ProcessError::UnsupportedChain(chain),
			other => ProcessError::TransientRpc(other.to_string()),
		}
	}
}
