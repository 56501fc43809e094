//! Hook events emitted by the pipeline and the batch unlocker.
//!
//! Hooks are observational: dispatch is fire-and-forget and never feeds back
//! into processing decisions.

use crate::chains::ChainId;
use crate::common::{Address, OrderId, TransactionHash};

#[derive(Debug, Clone)]
pub enum HookEvent {
	/// A fulfill transaction was observed on the take chain.
	OrderFulfilled {
		order_id: OrderId,
		take_chain: ChainId,
		tx_hash: TransactionHash,
	},
	/// The order was placed into the local mempool for a later retry.
	OrderPostponed {
		order_id: OrderId,
		take_chain: ChainId,
		reason: String,
		attempts: u32,
	},
	/// The order was dropped without a retry.
	OrderRejected {
		order_id: OrderId,
		take_chain: ChainId,
		reason: String,
	},
	/// A batch unlock transaction was broadcast on the give chain.
	UnlockSent {
		give_chain: ChainId,
		give_token: Address,
		order_ids: Vec<OrderId>,
		tx_hash: TransactionHash,
	},
}

impl HookEvent {
	pub fn kind(&self) -> &'static str {
		match self {
			HookEvent::OrderFulfilled { .. } => "order_fulfilled",
			HookEvent::OrderPostponed { .. } => "order_postponed",
			HookEvent::OrderRejected { .. } => "order_rejected",
			HookEvent::UnlockSent { .. } => "unlock_sent",
		}
	}
}
