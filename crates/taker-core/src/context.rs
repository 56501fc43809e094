//! Per-call processing context.
//!
//! The order processor holds no back-reference to the owning executor;
//! everything it needs travels in [`ProcessContext`].

use crate::evaluator::ProfitabilityEvaluator;
use crate::executor::FulfillmentExecutor;
use crate::filters::OrderFilter;
use crate::hooks::HookDispatcher;
use crate::registry::ChainRegistry;
use crate::unlocker::BatchUnlocker;
use std::sync::Arc;
use std::time::Instant;
use taker_pricing::UsdEstimator;
use taker_types::{IncomingOrder, TokensBucketSet};

/// Shared dependencies handed to each `process_order` call.
pub struct ProcessContext {
	pub registry: Arc<ChainRegistry>,
	pub buckets: Arc<TokensBucketSet>,
	pub estimator: Arc<UsdEstimator>,
	pub evaluator: Arc<ProfitabilityEvaluator>,
	pub executor: Arc<FulfillmentExecutor>,
	pub unlocker: Arc<BatchUnlocker>,
	pub hooks: Arc<HookDispatcher>,
	pub global_filters: Vec<Arc<dyn OrderFilter>>,
}

/// An order admitted into a pipeline, with its retry bookkeeping.
#[derive(Debug, Clone)]
pub struct QueuedOrder {
	pub incoming: IncomingOrder,
	/// Times this order has been re-delivered from the mempool.
	pub attempts: u32,
	pub first_seen_at: Instant,
}

impl QueuedOrder {
	pub fn new(incoming: IncomingOrder, attempts: u32) -> Self {
		Self {
			incoming,
			attempts,
			first_seen_at: Instant::now(),
		}
	}
}
