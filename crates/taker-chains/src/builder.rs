//! Fulfill and unlock transaction construction.

use crate::client::ChainError;
use async_trait::async_trait;
use taker_swap::SwapEstimation;
use taker_types::{Address, ChainId, ChangeRecipient, Order, OrderId, Transaction};

/// Everything a builder needs to format a preswap-and-fulfill call.
#[derive(Debug, Clone)]
pub struct FulfillRequest {
	pub order: Order,
	/// Reserve token the taker spends on the take chain.
	pub reserve_token: Address,
	pub slippage_bps: u32,
	/// Address of the fulfill signer.
	pub taker_address: Address,
	/// Identity allowed to unlock the give leg after fulfillment.
	pub unlock_authority: Address,
	pub change_recipient: ChangeRecipient,
	/// A route fetched during profitability evaluation, replayed here so
	/// the broadcast matches the quote that was judged profitable.
	pub prefer_estimation: Option<SwapEstimation>,
}

/// Wire-format owner for the order protocol's calls.
#[async_trait]
pub trait OrderTxBuilder: Send + Sync {
	/// Build the destination-chain fulfill transaction, optionally
	/// preceded by a reserve-to-take swap.
	async fn build_fulfill(&self, request: &FulfillRequest) -> Result<Transaction, ChainError>;

	/// Build one unlock call covering a batch of fulfilled orders.
	async fn build_batch_unlock(
		&self,
		give_chain: ChainId,
		give_token: &Address,
		order_ids: &[OrderId],
		beneficiary: &Address,
	) -> Result<Transaction, ChainError>;
}
