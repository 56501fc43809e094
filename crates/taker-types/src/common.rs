//! Addresses, identifiers and transaction types shared across chains.

use crate::chains::{ChainEngine, ChainId};
use alloy_primitives::PrimitiveSignature;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use alloy_primitives::U256;

/// Blockchain address representation.
///
/// Stores addresses as raw bytes to support both 20-byte EVM accounts and
/// 32-byte Solana public keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub Vec<u8>);

impl Address {
	pub fn evm(bytes: [u8; 20]) -> Self {
		Self(bytes.to_vec())
	}

	pub fn solana(bytes: [u8; 32]) -> Self {
		Self(bytes.to_vec())
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// 32-byte addresses are Solana public keys and read as base58
		if self.0.len() == 32 {
			write!(f, "{}", bs58::encode(&self.0).into_string())
		} else {
			write!(f, "0x{}", hex::encode(&self.0))
		}
	}
}

/// Opaque 32-byte order identifier assigned by the order feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub [u8; 32]);

impl OrderId {
	pub fn zero() -> Self {
		Self([0u8; 32])
	}
}

impl fmt::Display for OrderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl From<[u8; 32]> for OrderId {
	fn from(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}
}

/// One side of an order: an amount of a token on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
	pub chain_id: ChainId,
	pub token: Address,
	pub amount: U256,
}

/// Cryptographic signature as raw bytes.
///
/// EVM signatures are the standard 65-byte (r, s, v) layout; Solana
/// signatures are 64-byte ed25519.
#[derive(Debug, Clone)]
pub struct Signature(pub Vec<u8>);

impl From<PrimitiveSignature> for Signature {
	fn from(sig: PrimitiveSignature) -> Self {
		let mut bytes = Vec::with_capacity(65);
		bytes.extend_from_slice(&sig.r().to_be_bytes::<32>());
		bytes.extend_from_slice(&sig.s().to_be_bytes::<32>());
		bytes.push(if sig.v() { 28 } else { 27 });
		Signature(bytes)
	}
}

/// Transaction hash as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.0.len() == 64 {
			write!(f, "{}", bs58::encode(&self.0).into_string())
		} else {
			write!(f, "0x{}", hex::encode(&self.0))
		}
	}
}

/// A transaction ready for broadcast, tagged by engine.
#[derive(Debug, Clone)]
pub struct Transaction {
	pub chain_id: ChainId,
	pub kind: TransactionKind,
}

#[derive(Debug, Clone)]
pub enum TransactionKind {
	Evm {
		to: Address,
		value: U256,
		data: Vec<u8>,
		/// Gas limit cap attached before broadcast.
		gas_limit: Option<u64>,
		/// Gas price cap attached before broadcast.
		gas_price: Option<u128>,
	},
	Solana {
		/// Serialized instruction bundle.
		payload: Vec<u8>,
		payer: Address,
	},
}

impl Transaction {
	pub fn engine(&self) -> ChainEngine {
		match self.kind {
			TransactionKind::Evm { .. } => ChainEngine::Evm,
			TransactionKind::Solana { .. } => ChainEngine::Solana,
		}
	}
}

/// Transaction receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub hash: TransactionHash,
	pub block_number: u64,
	pub success: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_address_display_by_length() {
		let evm = Address::evm([0x11; 20]);
		assert!(evm.to_string().starts_with("0x"));
		assert_eq!(evm.to_string().len(), 42);

		let sol = Address::solana([0x22; 32]);
		assert!(!sol.to_string().starts_with("0x"));
	}

	#[test]
	fn test_order_id_display() {
		let id = OrderId([0xab; 32]);
		assert_eq!(id.to_string().len(), 66);
		assert!(id.to_string().starts_with("0xabab"));
	}

	#[test]
	fn test_transaction_engine_tag() {
		let tx = Transaction {
			chain_id: ChainId::ETHEREUM,
			kind: TransactionKind::Evm {
				to: Address::evm([1u8; 20]),
				value: U256::ZERO,
				data: vec![],
				gas_limit: None,
				gas_price: None,
			},
		};
		assert_eq!(tx.engine(), ChainEngine::Evm);
	}
}
