//! Chain identifiers and engine classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
	pub const ETHEREUM: Self = Self(1);
	pub const OPTIMISM: Self = Self(10);
	pub const BNB: Self = Self(56);
	pub const POLYGON: Self = Self(137);
	pub const BASE: Self = Self(8453);
	pub const ARBITRUM: Self = Self(42161);
	pub const AVALANCHE: Self = Self(43114);
	pub const SOLANA: Self = Self(7565164);

	/// Execution engine running on this chain.
	pub fn engine(&self) -> ChainEngine {
		if *self == Self::SOLANA {
			ChainEngine::Solana
		} else {
			ChainEngine::Evm
		}
	}

	/// Upper bound on configurable block confirmations.
	///
	/// Beyond this count the chain is considered finalized, so requiring
	/// more confirmations than this is a configuration mistake. Returns
	/// `None` for chains the taker does not know.
	pub fn finality_hard_cap(&self) -> Option<u64> {
		match *self {
			Self::ETHEREUM => Some(12),
			Self::POLYGON => Some(256),
			Self::SOLANA => Some(32),
			Self::OPTIMISM | Self::BNB | Self::BASE | Self::ARBITRUM | Self::AVALANCHE => Some(15),
			_ => None,
		}
	}

	pub fn is_supported(&self) -> bool {
		self.finality_hard_cap().is_some()
	}
}

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ChainId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(ChainId(s.parse()?))
	}
}

/// Execution engine family, used to dispatch transaction construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainEngine {
	Evm,
	Solana,
}

impl fmt::Display for ChainEngine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChainEngine::Evm => write!(f, "evm"),
			ChainEngine::Solana => write!(f, "solana"),
		}
	}
}
