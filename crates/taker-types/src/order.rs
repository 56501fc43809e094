//! Order model as observed from the feed.

use crate::chains::ChainId;
use crate::common::{Address, OrderId, TokenAmount};
use serde::{Deserialize, Serialize};

/// A user-submitted swap order, immutable once observed.
///
/// The maker locks `give` on the source chain and asks for `take` to be
/// delivered to `receiver` on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	pub order_id: OrderId,
	pub give: TokenAmount,
	pub take: TokenAmount,
	pub receiver: Address,
	pub maker: Address,
}

impl Order {
	pub fn give_chain(&self) -> ChainId {
		self.give.chain_id
	}

	pub fn take_chain(&self) -> ChainId {
		self.take.chain_id
	}
}

/// Feed-supplied attestation level for a created order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Finalization {
	/// Reorged out on the source chain.
	Revoked,
	/// Announced with this many block confirmations, not yet final.
	Confirmed { confirmation_blocks_count: u64 },
	Finalized,
}

/// Order status as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
	Created { finalization: Finalization },
	ArchivalCreated,
	Fulfilled,
	ArchivalFulfilled,
	Cancelled,
	Other(String),
}

impl OrderStatus {
	/// Statuses that enter the admission pipeline.
	pub fn is_creation(&self) -> bool {
		matches!(self, OrderStatus::Created { .. } | OrderStatus::ArchivalCreated)
	}
}

/// One feed event: an order together with its announced status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingOrder {
	pub order: Order,
	pub status: OrderStatus,
}
