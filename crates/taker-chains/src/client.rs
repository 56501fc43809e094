//! RPC client capability consumed by the pipeline.

use async_trait::async_trait;
use std::time::Duration;
use taker_types::{
	Address, ChainId, OrderId, Transaction, TransactionHash, TransactionReceipt, U256,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
	#[error("rpc error: {0}")]
	Rpc(String),
	#[error("rpc timed out after {0:?}")]
	Timeout(Duration),
	/// Errors raised by the swap/fulfill client libraries during
	/// construction or pre-estimation, as opposed to transport failures.
	#[error("client error: {0}")]
	Client(String),
}

/// State of the give-side order record on the source chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveOrderState {
	NotFound,
	Created,
	Fulfilled,
	Cancelled,
}

/// Read/write access to one chain.
///
/// Implementations serialize transaction submission internally: nonce
/// allocation on EVM, sequential sign-and-submit on Solana.
#[async_trait]
pub trait ChainClient: Send + Sync {
	fn chain_id(&self) -> ChainId;

	/// ERC-20 / SPL balance of `owner` for `token`.
	async fn token_balance(&self, owner: &Address, token: &Address) -> Result<U256, ChainError>;

	async fn token_decimals(&self, token: &Address) -> Result<u8, ChainError>;

	async fn estimate_gas(&self, tx: &Transaction) -> Result<u64, ChainError>;

	async fn gas_price(&self) -> Result<u128, ChainError>;

	async fn send_transaction(&self, tx: Transaction) -> Result<TransactionHash, ChainError>;

	async fn transaction_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, ChainError>;

	/// Give-side order record state, read on the source chain.
	async fn give_order_state(&self, order_id: &OrderId) -> Result<GiveOrderState, ChainError>;

	/// Has this order already been fulfilled on the take chain?
	async fn is_order_fulfilled(&self, order_id: &OrderId) -> Result<bool, ChainError>;
}
