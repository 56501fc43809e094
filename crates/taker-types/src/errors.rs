//! Top-level error type shared across the taker system.

use crate::chains::ChainId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TakerError>;

#[derive(Error, Debug)]
pub enum TakerError {
	#[error("unsupported chain: {0}")]
	UnsupportedChain(ChainId),

	#[error("configuration error: {0}")]
	Config(String),

	#[error("account error: {0}")]
	Account(String),

	#[error("chain client error: {0}")]
	Chain(String),

	#[error("price source error: {0}")]
	Price(String),

	#[error("swap connector error: {0}")]
	Swap(String),

	#[error("order feed error: {0}")]
	Feed(String),

	#[error("internal invariant violated: {0}")]
	Internal(String),
}
