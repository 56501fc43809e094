//! Admission filter pipeline.
//!
//! Filters are pure predicates over an order; the pipeline composes the
//! global list, the take chain's destination list and the give chain's
//! source list. All filters run concurrently and admission is their
//! conjunction.

use crate::error::ProcessError;
use async_trait::async_trait;
use std::sync::Arc;
use taker_types::{Address, ChainId, Order};
use tracing::debug;

/// Per-evaluation context handed to every filter.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext {
	pub give_chain: ChainId,
	pub take_chain: ChainId,
}

#[async_trait]
pub trait OrderFilter: Send + Sync {
	fn name(&self) -> &'static str;

	async fn admits(&self, order: &Order, ctx: &FilterContext) -> Result<bool, ProcessError>;
}

/// Run all three filter lists concurrently; the order is admitted iff every
/// filter returns true.
pub async fn run_admission(
	global: &[Arc<dyn OrderFilter>],
	dst: &[Arc<dyn OrderFilter>],
	src: &[Arc<dyn OrderFilter>],
	order: &Order,
	ctx: &FilterContext,
) -> Result<bool, ProcessError> {
	let all = global.iter().chain(dst.iter()).chain(src.iter());
	let checks = all.map(|filter| async move {
		let admitted = filter.admits(order, ctx).await?;
		if !admitted {
			debug!(
				filter = filter.name(),
				order_id = %order.order_id,
				"order refused by filter"
			);
		}
		Ok::<bool, ProcessError>(admitted)
	});
	let results = futures::future::try_join_all(checks).await?;
	Ok(results.into_iter().all(|admitted| admitted))
}

/// Only admit orders giving one of the listed tokens.
pub struct GiveTokenAllowlist {
	tokens: Vec<Address>,
}

impl GiveTokenAllowlist {
	pub fn new(tokens: Vec<Address>) -> Self {
		Self { tokens }
	}
}

#[async_trait]
impl OrderFilter for GiveTokenAllowlist {
	fn name(&self) -> &'static str {
		"give_token_allowlist"
	}

	async fn admits(&self, order: &Order, _: &FilterContext) -> Result<bool, ProcessError> {
		Ok(self.tokens.contains(&order.give.token))
	}
}

/// Refuse orders taking one of the listed tokens.
pub struct TakeTokenDenylist {
	tokens: Vec<Address>,
}

impl TakeTokenDenylist {
	pub fn new(tokens: Vec<Address>) -> Self {
		Self { tokens }
	}
}

#[async_trait]
impl OrderFilter for TakeTokenDenylist {
	fn name(&self) -> &'static str {
		"take_token_denylist"
	}

	async fn admits(&self, order: &Order, _: &FilterContext) -> Result<bool, ProcessError> {
		Ok(!self.tokens.contains(&order.take.token))
	}
}

/// Refuse orders from the listed makers.
pub struct MakerDenylist {
	makers: Vec<Address>,
}

impl MakerDenylist {
	pub fn new(makers: Vec<Address>) -> Self {
		Self { makers }
	}
}

#[async_trait]
impl OrderFilter for MakerDenylist {
	fn name(&self) -> &'static str {
		"maker_denylist"
	}

	async fn admits(&self, order: &Order, _: &FilterContext) -> Result<bool, ProcessError> {
		Ok(!self.makers.contains(&order.maker))
	}
}

/// Blanket refusal installed as the destination filter of disabled chains.
pub struct DenyDestination;

#[async_trait]
impl OrderFilter for DenyDestination {
	fn name(&self) -> &'static str {
		"deny_destination"
	}

	async fn admits(&self, _: &Order, _: &FilterContext) -> Result<bool, ProcessError> {
		Ok(false)
	}
}
