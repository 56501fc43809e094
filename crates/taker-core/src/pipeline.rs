//! Per-take-chain order pipeline.
//!
//! A single worker task owns the pipeline state: the incoming-order map,
//! the priority queue (Created), the secondary queue (ArchivalCreated) and
//! the one in-flight slot. While an order is being processed the worker
//! keeps accepting events, so terminal statuses clear queues immediately;
//! when the slot frees up the priority queue drains before the secondary
//! one. The recursion of the original design is expressed as this loop.

use crate::confirmation::{self, ConfirmationVerdict};
use crate::context::{ProcessContext, QueuedOrder};
use crate::error::{Disposition, ProcessError};
use crate::executor::{FAST_TRACK_DELAY, GAS_BLOWOUT_FAST_RETRIES};
use crate::filters::{self, FilterContext};
use crate::mempool::MempoolScheduler;
use crate::registry::ChainEntry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taker_chains::{FulfillRequest, GiveOrderState};
use taker_types::{
	ChainId, Finalization, HookEvent, IncomingOrder, OrderId, OrderStatus, TransactionHash,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, info_span, warn, Instrument};

/// Slippage used for the preliminary EVM gas estimation only.
const DUMMY_SLIPPAGE_BPS: u32 = 500;

/// One event entering the pipeline: fresh from the feed or re-delivered by
/// the mempool scheduler.
#[derive(Debug)]
pub enum PipelineEvent {
	Feed(IncomingOrder),
	Retry {
		incoming: IncomingOrder,
		attempts: u32,
		first_seen_at: Instant,
	},
}

/// Result of one `process_order` run.
#[derive(Debug)]
pub enum ProcessOutcome {
	Fulfilled { tx_hash: TransactionHash },
	Dropped { reason: String },
	Postponed {
		delay: Option<Duration>,
		reason: String,
	},
}

/// Cheap cloneable sender into a pipeline worker.
#[derive(Clone)]
pub struct PipelineHandle {
	chain_id: ChainId,
	tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl PipelineHandle {
	pub fn chain_id(&self) -> ChainId {
		self.chain_id
	}

	/// Entry point for feed events and mempool re-entries alike.
	pub fn process(&self, event: PipelineEvent) -> bool {
		self.tx.send(event).is_ok()
	}

	pub fn sender(&self) -> mpsc::UnboundedSender<PipelineEvent> {
		self.tx.clone()
	}
}

pub struct OrderPipeline {
	take_chain: Arc<ChainEntry>,
	ctx: Arc<ProcessContext>,
	mempool: Arc<MempoolScheduler>,
	rx: mpsc::UnboundedReceiver<PipelineEvent>,
	shutdown: broadcast::Receiver<()>,
	incoming: HashMap<OrderId, QueuedOrder>,
	priority: VecDeque<OrderId>,
	secondary: VecDeque<OrderId>,
}

impl OrderPipeline {
	pub fn new(
		take_chain: Arc<ChainEntry>,
		ctx: Arc<ProcessContext>,
		mempool: Arc<MempoolScheduler>,
		shutdown: broadcast::Receiver<()>,
	) -> (Self, PipelineHandle) {
		let (tx, rx) = mpsc::unbounded_channel();
		let handle = PipelineHandle {
			chain_id: take_chain.chain_id,
			tx,
		};
		let pipeline = Self {
			take_chain,
			ctx,
			mempool,
			rx,
			shutdown,
			incoming: HashMap::new(),
			priority: VecDeque::new(),
			secondary: VecDeque::new(),
		};
		(pipeline, handle)
	}

	/// Worker loop. Exactly one `process_order` runs at a time; events keep
	/// flowing into the queues across its suspension points.
	pub async fn run(mut self) {
		let chain = self.take_chain.chain_id;
		debug!(chain = %chain, "order pipeline started");
		let mut shutting_down = false;

		loop {
			if shutting_down {
				break;
			}

			if let Some(queued) = self.pop_next() {
				let order_id = queued.incoming.order.order_id;
				let attempts = queued.attempts;
				let mut fut = Box::pin(process_order(
					self.ctx.clone(),
					self.take_chain.clone(),
					queued,
				));

				let outcome = loop {
					tokio::select! {
						outcome = &mut fut => break outcome,
						event = self.rx.recv(), if !shutting_down => match event {
							Some(event) => self.handle_event(event, Some(order_id)),
							None => shutting_down = true,
						},
						_ = self.shutdown.recv(), if !shutting_down => shutting_down = true,
					}
				};
				self.finish(order_id, attempts, outcome);
				continue;
			}

			tokio::select! {
				event = self.rx.recv() => match event {
					Some(event) => self.handle_event(event, None),
					None => break,
				},
				_ = self.shutdown.recv() => break,
			}
		}
		debug!(chain = %chain, "order pipeline stopped");
	}

	/// The `process(event)` entry point of the state machine.
	fn handle_event(&mut self, event: PipelineEvent, in_flight: Option<OrderId>) {
		let (incoming, attempts, first_seen_at) = match event {
			PipelineEvent::Feed(incoming) => (incoming, 0, Instant::now()),
			PipelineEvent::Retry {
				incoming,
				attempts,
				first_seen_at,
			} => (incoming, attempts, first_seen_at),
		};
		let order_id = incoming.order.order_id;

		match incoming.status.clone() {
			OrderStatus::Fulfilled | OrderStatus::ArchivalFulfilled => {
				debug!(order_id = %order_id, "order fulfilled upstream; clearing");
				self.clear(&order_id);
				self.mempool.delete(&order_id);
				self.take_chain.tvl_budget.release(&order_id);
				self.take_chain.non_finalized_budget.release(&order_id);
				// our fulfillments come back through the feed too; the
				// give leg still needs reclaiming
				let unlocker = self.ctx.unlocker.clone();
				let order = incoming.order;
				tokio::spawn(async move {
					unlocker.register_fulfilled(&order).await;
				});
			}
			OrderStatus::Cancelled => {
				debug!(order_id = %order_id, "order cancelled; clearing");
				self.clear(&order_id);
				self.mempool.delete(&order_id);
				self.take_chain.tvl_budget.release(&order_id);
				self.take_chain.non_finalized_budget.release(&order_id);
			}
			OrderStatus::Created { finalization } => {
				if finalization == Finalization::Finalized {
					// graduation: speculative exposure ends here
					self.take_chain.non_finalized_budget.release(&order_id);
				}
				self.admit(order_id, incoming, attempts, first_seen_at, in_flight, true);
			}
			OrderStatus::ArchivalCreated => {
				self.admit(order_id, incoming, attempts, first_seen_at, in_flight, false);
			}
			OrderStatus::Other(status) => {
				debug!(order_id = %order_id, status = %status, "unsupported order status; dropping");
			}
		}
	}

	fn admit(
		&mut self,
		order_id: OrderId,
		incoming: IncomingOrder,
		attempts: u32,
		first_seen_at: Instant,
		in_flight: Option<OrderId>,
		is_priority: bool,
	) {
		// a fresh event supersedes any parked retry
		self.mempool.delete(&order_id);

		let already_queued =
			self.priority.contains(&order_id) || self.secondary.contains(&order_id);
		let first_seen_at = self
			.incoming
			.get(&order_id)
			.map(|existing| existing.first_seen_at.min(first_seen_at))
			.unwrap_or(first_seen_at);
		self.incoming.insert(
			order_id,
			QueuedOrder {
				incoming,
				attempts,
				first_seen_at,
			},
		);

		if in_flight == Some(order_id) || already_queued {
			// re-delivery of a tracked order updates its context only
			return;
		}
		if is_priority {
			self.priority.push_back(order_id);
		} else {
			self.secondary.push_back(order_id);
		}
	}

	/// Priority first, then secondary; stale ids left by `clear` are
	/// skipped.
	fn pop_next(&mut self) -> Option<QueuedOrder> {
		loop {
			let id = self
				.priority
				.pop_front()
				.or_else(|| self.secondary.pop_front())?;
			if let Some(queued) = self.incoming.get(&id) {
				return Some(queued.clone());
			}
		}
	}

	fn clear(&mut self, order_id: &OrderId) {
		self.incoming.remove(order_id);
		self.priority.retain(|id| id != order_id);
		self.secondary.retain(|id| id != order_id);
	}

	/// Release the slot and route the outcome.
	fn finish(&mut self, order_id: OrderId, attempts: u32, outcome: ProcessOutcome) {
		let chain = self.take_chain.chain_id;
		match outcome {
			ProcessOutcome::Fulfilled { tx_hash } => {
				info!(order_id = %order_id, tx = %tx_hash, "order fulfilled");
				let queued = self.incoming.remove(&order_id);
				// confirmed fulfill ends the TVL contribution; the
				// non-finalized exposure survives until graduation
				self.take_chain.tvl_budget.release(&order_id);
				self.ctx.hooks.dispatch(HookEvent::OrderFulfilled {
					order_id,
					take_chain: chain,
					tx_hash,
				});
				if let Some(queued) = queued {
					let unlocker = self.ctx.unlocker.clone();
					let order = queued.incoming.order;
					tokio::spawn(async move {
						unlocker.register_fulfilled(&order).await;
					});
				}
			}
			ProcessOutcome::Dropped { reason } => {
				warn!(order_id = %order_id, reason = %reason, "order dropped");
				self.incoming.remove(&order_id);
				self.take_chain.tvl_budget.release(&order_id);
				self.take_chain.non_finalized_budget.release(&order_id);
				self.ctx.hooks.dispatch(HookEvent::OrderRejected {
					order_id,
					take_chain: chain,
					reason,
				});
			}
			ProcessOutcome::Postponed { delay, reason } => {
				debug!(order_id = %order_id, reason = %reason, "order postponed");
				self.take_chain.tvl_budget.release(&order_id);
				self.take_chain.non_finalized_budget.release(&order_id);
				if let Some(queued) = self.incoming.remove(&order_id) {
					self.mempool
						.add_order(queued.incoming, attempts, queued.first_seen_at, delay);
				}
				self.ctx.hooks.dispatch(HookEvent::OrderPostponed {
					order_id,
					take_chain: chain,
					reason,
					attempts: attempts + 1,
				});
			}
		}
	}
}

/// One full `process_order` run for an order holding the in-flight slot.
pub(crate) async fn process_order(
	ctx: Arc<ProcessContext>,
	take_chain: Arc<ChainEntry>,
	queued: QueuedOrder,
) -> ProcessOutcome {
	let order_id = queued.incoming.order.order_id;
	let span = info_span!("process_order", order_id = %order_id, take_chain = %take_chain.chain_id);
	async move {
		let mut allow_mempool = true;
		let attempts = queued.attempts;
		match run_steps(&ctx, &take_chain, &queued, &mut allow_mempool).await {
			Ok(tx_hash) => ProcessOutcome::Fulfilled { tx_hash },
			Err(err) => outcome_for_error(err, allow_mempool, attempts),
		}
	}
	.instrument(span)
	.await
}

async fn run_steps(
	ctx: &Arc<ProcessContext>,
	take_chain: &Arc<ChainEntry>,
	queued: &QueuedOrder,
	allow_mempool: &mut bool,
) -> Result<TransactionHash, ProcessError> {
	let order = &queued.incoming.order;
	let order_id = order.order_id;

	let finalization = match &queued.incoming.status {
		OrderStatus::Created { finalization } => Some(*finalization),
		_ => None,
	};

	// a revoked announcement never reaches the RPC layer
	if finalization == Some(Finalization::Revoked) {
		return Err(ProcessError::OrderInvalid(
			"give-side transaction revoked by reorg".to_string(),
		));
	}

	let give_chain = ctx.registry.get(order.give_chain())?.clone();

	let filter_ctx = FilterContext {
		give_chain: order.give_chain(),
		take_chain: take_chain.chain_id,
	};
	let admitted = filters::run_admission(
		&ctx.global_filters,
		&take_chain.dst_filters,
		&give_chain.src_filters,
		order,
		&filter_ctx,
	)
	.await?;
	if !admitted {
		return Err(ProcessError::OrderInvalid(
			"refused by admission filters".to_string(),
		));
	}

	let bucket = ctx
		.buckets
		.find(order.give_chain(), &order.give.token, take_chain.chain_id)
		.ok_or_else(|| {
			ProcessError::OrderInvalid("no bucket covers the give token".to_string())
		})?;

	if take_chain.client.is_order_fulfilled(&order_id).await? {
		return Err(ProcessError::OrderInvalid(
			"already fulfilled on the take chain".to_string(),
		));
	}
	match give_chain.client.give_order_state(&order_id).await? {
		GiveOrderState::Created => {}
		state => {
			return Err(ProcessError::OrderInvalid(format!(
				"give-side record is {:?}",
				state
			)))
		}
	}

	let give_usd = ctx.estimator.usd_worth(&order.give).await?;

	let mut src_delay = give_chain
		.src_constraints
		.matching(give_usd)
		.map(|c| c.fulfillment_delay)
		.unwrap_or_default();
	let mut non_finalized = false;
	if let Some(Finalization::Confirmed {
		confirmation_blocks_count,
	}) = finalization
	{
		match confirmation::evaluate(
			give_usd,
			confirmation_blocks_count,
			&give_chain.src_constraints,
		) {
			ConfirmationVerdict::Accept { constraint } => {
				non_finalized = true;
				*allow_mempool = false;
				src_delay = constraint.fulfillment_delay;
			}
			ConfirmationVerdict::Reject { reason } => {
				// rejected announcements wait for the next feed event,
				// never the mempool
				return Err(ProcessError::OrderInvalid(format!(
					"confirmation policy: {}",
					reason
				)));
			}
		}
	}

	let dst_range = take_chain.dst_constraints.matching(give_usd);
	let change_recipient = dst_range.map(|c| c.change_recipient).unwrap_or_default();
	let dst_delay = dst_range.map(|c| c.fulfillment_delay).unwrap_or_default();
	let delay = src_delay.max(dst_delay);
	let elapsed = queued.first_seen_at.elapsed();
	if elapsed < delay {
		return Err(ProcessError::FulfillmentDelayed(delay - elapsed));
	}

	if !take_chain.tvl_budget.try_reserve(order_id, give_usd) {
		return Err(ProcessError::BudgetExhausted { budget: "tvl" });
	}
	if non_finalized && !take_chain.non_finalized_budget.try_reserve(order_id, give_usd) {
		return Err(ProcessError::BudgetExhausted {
			budget: "non-finalized",
		});
	}

	let reserve_token = bucket
		.equivalent_on(take_chain.chain_id)
		.cloned()
		.ok_or_else(|| {
			ProcessError::FatalInternal("bucket lost its reserve token".to_string())
		})?;
	let take_usd = ctx.estimator.usd_worth(&order.take).await?;
	let approx_required = ctx
		.estimator
		.token_units_for_usd(take_chain.chain_id, &reserve_token, take_usd)
		.await?;
	let taker_address = take_chain.fulfill_signer.address();
	let balance = take_chain
		.client
		.token_balance(&taker_address, &reserve_token)
		.await?;
	if balance < approx_required {
		return Err(ProcessError::InsufficientBalance {
			have: balance,
			need: approx_required,
		});
	}

	// preliminary construction with dummy slippage caps the gas budget
	let dummy_request = FulfillRequest {
		order: order.clone(),
		reserve_token: reserve_token.clone(),
		slippage_bps: DUMMY_SLIPPAGE_BPS,
		taker_address: taker_address.clone(),
		unlock_authority: take_chain.unlock_signer.address(),
		change_recipient,
		prefer_estimation: None,
	};
	let caps = ctx.executor.pre_estimate(take_chain, &dummy_request).await?;

	let evaluation = ctx
		.evaluator
		.evaluate(crate::evaluator::EvaluationInput {
			order,
			bucket,
			give_client: &give_chain.client,
			take_client: &take_chain.client,
			taker_address,
			prefer_estimation: None,
		})
		.await?;
	if !evaluation.is_profitable {
		return Err(ProcessError::Unprofitable(format!(
			"give {:.4} usd does not cover take {:.4} usd plus costs",
			evaluation.give_usd, evaluation.take_usd
		)));
	}
	if evaluation.reserve_token != reserve_token {
		return Err(ProcessError::FatalInternal(
			"evaluator picked a different reserve token".to_string(),
		));
	}

	// the final transaction replays the route the evaluation was based on
	let final_request = FulfillRequest {
		slippage_bps: evaluation.slippage_bps,
		prefer_estimation: evaluation.estimation.clone(),
		..dummy_request
	};
	ctx.executor.execute(take_chain, &final_request, caps).await
}

/// Map a failure to the order's next stop, honoring the mempool bar on
/// non-finalized orders and the fast-track budget for gas blowouts.
pub(crate) fn outcome_for_error(
	err: ProcessError,
	allow_mempool: bool,
	attempts: u32,
) -> ProcessOutcome {
	let reason = err.to_string();
	if let ProcessError::FulfillmentDelayed(remaining) = err {
		return if allow_mempool {
			ProcessOutcome::Postponed {
				delay: Some(remaining),
				reason,
			}
		} else {
			ProcessOutcome::Dropped { reason }
		};
	}
	match err.disposition() {
		Disposition::Drop => ProcessOutcome::Dropped { reason },
		Disposition::Mempool => {
			if allow_mempool {
				ProcessOutcome::Postponed {
					delay: None,
					reason,
				}
			} else {
				ProcessOutcome::Dropped { reason }
			}
		}
		Disposition::FastTrackMempool => {
			if !allow_mempool {
				ProcessOutcome::Dropped { reason }
			} else if attempts < GAS_BLOWOUT_FAST_RETRIES {
				ProcessOutcome::Postponed {
					delay: Some(FAST_TRACK_DELAY),
					reason,
				}
			} else {
				ProcessOutcome::Postponed {
					delay: None,
					reason,
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::evaluator::ProfitabilityEvaluator;
	use crate::executor::FulfillmentExecutor;
	use crate::hooks::HookDispatcher;
	use crate::mempool::MempoolConfig;
	use crate::registry::ChainRegistry;
	use crate::testutil::{
		entry_with, MockChainClient, MockTxBuilder, StaticPriceSource, StaticSwapConnector,
	};
	use crate::unlocker::BatchUnlocker;
	use std::collections::HashMap as StdHashMap;
	use taker_chains::ChainClient;
	use taker_chains::GiveOrderState as GiveState;
	use taker_pricing::UsdEstimator;
	use taker_swap::SwapRouter;
	use taker_types::{Address, Order, TokenAmount, TokensBucket, TokensBucketSet, U256};

	struct Harness {
		give_client: Arc<MockChainClient>,
		take_client: Arc<MockChainClient>,
		take_builder: Arc<MockTxBuilder>,
		give_builder: Arc<MockTxBuilder>,
		handle: PipelineHandle,
		shutdown_tx: broadcast::Sender<()>,
		mempool: Arc<MempoolScheduler>,
		worker: tokio::task::JoinHandle<()>,
		mempool_task: tokio::task::JoinHandle<()>,
	}

	fn reserve_token() -> Address {
		Address::evm([0xbb; 20])
	}

	fn give_token() -> Address {
		Address::evm([0xaa; 20])
	}

	async fn harness() -> Harness {
		let give_client = Arc::new(MockChainClient::new(ChainId::ETHEREUM));
		let take_client = Arc::new(MockChainClient::new(ChainId::ARBITRUM));
		let give_builder = Arc::new(MockTxBuilder::default());
		let take_builder = Arc::new(MockTxBuilder::default());

		let give_entry = entry_with(ChainId::ETHEREUM, give_client.clone(), give_builder.clone());
		let take_entry = entry_with(ChainId::ARBITRUM, take_client.clone(), take_builder.clone());
		let registry = Arc::new(ChainRegistry::new(vec![
			give_entry.clone(),
			take_entry.clone(),
		]));

		let mut tokens = StdHashMap::new();
		tokens.insert(ChainId::ETHEREUM, vec![give_token()]);
		tokens.insert(ChainId::ARBITRUM, vec![reserve_token()]);
		let buckets = Arc::new(TokensBucketSet::new(vec![TokensBucket::new(tokens)]));

		let mut clients: StdHashMap<ChainId, Arc<dyn ChainClient>> = StdHashMap::new();
		clients.insert(ChainId::ETHEREUM, give_client.clone());
		clients.insert(ChainId::ARBITRUM, take_client.clone());
		let estimator = Arc::new(UsdEstimator::new(
			Arc::new(StaticPriceSource::new(1.0, 1_000.0)),
			clients,
		));

		let router = Arc::new(SwapRouter::new(
			Arc::new(StaticSwapConnector::evm(U256::ZERO)),
			Arc::new(StaticSwapConnector::solana(U256::ZERO)),
		));
		router.set_enabled_chains(&[ChainId::ETHEREUM, ChainId::ARBITRUM]);

		let evaluator = Arc::new(ProfitabilityEvaluator::new(
			estimator.clone(),
			router,
			4,
			10,
		));
		let executor = Arc::new(FulfillmentExecutor::new(
			Duration::from_millis(300),
			Duration::from_millis(10),
		));
		let hooks = Arc::new(HookDispatcher::default());
		let unlocker = Arc::new(BatchUnlocker::new(registry.clone(), 1, hooks.clone()));

		let ctx = Arc::new(ProcessContext {
			registry,
			buckets,
			estimator,
			evaluator,
			executor,
			unlocker,
			hooks,
			global_filters: vec![],
		});

		let mempool = Arc::new(MempoolScheduler::new(
			ChainId::ARBITRUM,
			MempoolConfig {
				initial_interval: Duration::from_millis(40),
				max_delay_step: Duration::ZERO,
				tick: Duration::from_millis(5),
			},
		));
		let (shutdown_tx, _) = broadcast::channel(4);
		let (pipeline, handle) = OrderPipeline::new(
			take_entry,
			ctx,
			mempool.clone(),
			shutdown_tx.subscribe(),
		);
		let mempool_task = mempool
			.clone()
			.spawn(handle.sender(), shutdown_tx.subscribe());
		let worker = tokio::spawn(pipeline.run());

		Harness {
			give_client,
			take_client,
			take_builder,
			give_builder,
			handle,
			shutdown_tx,
			mempool,
			worker,
			mempool_task,
		}
	}

	impl Harness {
		async fn stop(self) {
			let _ = self.shutdown_tx.send(());
			let _ = tokio::time::timeout(Duration::from_secs(2), self.worker).await;
			let _ = tokio::time::timeout(Duration::from_secs(2), self.mempool_task).await;
		}
	}

	// give 2.0 tokens for 1.0 of the reserve token: comfortably profitable
	fn order(byte: u8) -> Order {
		Order {
			order_id: OrderId([byte; 32]),
			give: TokenAmount {
				chain_id: ChainId::ETHEREUM,
				token: give_token(),
				amount: U256::from(2_000_000u64),
			},
			take: TokenAmount {
				chain_id: ChainId::ARBITRUM,
				token: reserve_token(),
				amount: U256::from(1_000_000u64),
			},
			receiver: Address::evm([9u8; 20]),
			maker: Address::evm([8u8; 20]),
		}
	}

	fn created(byte: u8) -> IncomingOrder {
		IncomingOrder {
			order: order(byte),
			status: OrderStatus::Created {
				finalization: Finalization::Finalized,
			},
		}
	}

	fn archival_created(byte: u8) -> IncomingOrder {
		IncomingOrder {
			order: order(byte),
			status: OrderStatus::ArchivalCreated,
		}
	}

	async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
		let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
		while !cond() {
			if tokio::time::Instant::now() > deadline {
				panic!("timed out waiting for {}", what);
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	}

	#[tokio::test]
	async fn test_happy_path_fulfills_and_unlocks() {
		let h = harness().await;
		h.take_client.fulfill_after_send();

		h.handle.process(PipelineEvent::Feed(created(1)));

		wait_until("fulfill broadcast", || h.take_client.sent_count() == 1).await;
		// preliminary build with dummy slippage, then the final one
		let requests = h.take_builder.fulfill_requests();
		assert_eq!(requests.len(), 2);
		assert_eq!(requests[0].slippage_bps, 500);
		assert_eq!(requests[1].slippage_bps, 0);
		// batch size 1: the unlock fires right after the fulfill
		wait_until("unlock sent", || h.give_builder.unlock_calls().len() == 1).await;
		let (chain, token, ids, _) = h.give_builder.unlock_calls().remove(0);
		assert_eq!(chain, ChainId::ETHEREUM);
		assert_eq!(token, give_token());
		assert_eq!(ids, vec![OrderId([1u8; 32])]);
		h.stop().await;
	}

	#[tokio::test]
	async fn test_in_flight_arrivals_drain_priority_then_secondary() {
		let h = harness().await;
		// A broadcasts, then waits out the fulfill horizon (never observed)

		h.handle.process(PipelineEvent::Feed(created(0xa1)));
		wait_until("A broadcast", || h.take_client.sent_count() == 1).await;

		// while A holds the slot: C (secondary), B (priority), B again
		h.handle.process(PipelineEvent::Feed(archival_created(0xc1)));
		h.handle.process(PipelineEvent::Feed(created(0xb1)));
		h.handle.process(PipelineEvent::Feed(created(0xb1)));

		// after A times out, the fulfill flag flips so B and C complete
		h.take_client.fulfill_after_send();

		wait_until("B and C processed", || {
			h.give_client.state_read_ids().len() >= 3
		})
		.await;
		let reads: Vec<u8> = h
			.give_client
			.state_read_ids()
			.iter()
			.map(|id| id.0[0])
			.collect();
		// A first, then B (priority before secondary), then C; a mempool
		// re-entry of A may trail behind
		assert_eq!(&reads[..3], &[0xa1, 0xb1, 0xc1]);
		// B and C fulfilled, so each was processed exactly once
		assert_eq!(reads.iter().filter(|b| **b == 0xb1).count(), 1);
		assert_eq!(reads.iter().filter(|b| **b == 0xc1).count(), 1);
		h.stop().await;
	}

	#[tokio::test]
	async fn test_revoked_clears_without_rpc() {
		let h = harness().await;
		h.handle.process(PipelineEvent::Feed(IncomingOrder {
			order: order(5),
			status: OrderStatus::Created {
				finalization: Finalization::Revoked,
			},
		}));

		// give the worker a moment to process and drop it
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert!(h.give_client.state_read_ids().is_empty());
		assert_eq!(h.take_client.fulfilled_read_count(), 0);
		assert_eq!(h.take_client.sent_count(), 0);
		assert!(h.mempool.is_empty());
		h.stop().await;
	}

	#[tokio::test]
	async fn test_cancelled_while_queued_never_processes() {
		let h = harness().await;

		h.handle.process(PipelineEvent::Feed(created(0xa1)));
		wait_until("A broadcast", || h.take_client.sent_count() == 1).await;

		h.handle.process(PipelineEvent::Feed(created(0xb1)));
		h.handle.process(PipelineEvent::Feed(IncomingOrder {
			order: order(0xb1),
			status: OrderStatus::Cancelled,
		}));
		h.take_client.fulfill_after_send();

		// A re-queues through the mempool and eventually fulfills; B never
		// reaches the give-side state read
		wait_until("A retried", || {
			h.give_client
				.state_read_ids()
				.iter()
				.filter(|id| id.0[0] == 0xa1)
				.count() >= 2
		})
		.await;
		assert!(h
			.give_client
			.state_read_ids()
			.iter()
			.all(|id| id.0[0] != 0xb1));
		h.stop().await;
	}

	#[tokio::test]
	async fn test_balance_shortfall_recovers_through_mempool() {
		let h = harness().await;
		// take side holds 0.5 tokens, needs 1.0
		h.take_client.set_balance(U256::from(500_000u64));
		h.take_client.fulfill_after_send();

		h.handle.process(PipelineEvent::Feed(created(7)));
		wait_until("parked in mempool", || h.mempool.len() == 1 || h.take_client.sent_count() > 0)
			.await;
		assert_eq!(h.take_client.sent_count(), 0);

		// balance recovers; the scheduled retry fulfills
		h.take_client.set_balance(U256::from(2_000_000u64));
		wait_until("fulfilled after retry", || h.take_client.sent_count() == 1).await;
		wait_until("unlock sent", || h.give_builder.unlock_calls().len() == 1).await;
		h.stop().await;
	}

	#[tokio::test]
	async fn test_already_fulfilled_on_take_chain_dropped() {
		let h = harness().await;
		h.take_client.mark_fulfilled(OrderId([4u8; 32]));

		h.handle.process(PipelineEvent::Feed(created(4)));
		tokio::time::sleep(Duration::from_millis(50)).await;

		// dropped before the give-side read, nothing parked
		assert!(h.give_client.state_read_ids().is_empty());
		assert_eq!(h.take_client.sent_count(), 0);
		assert!(h.mempool.is_empty());
		h.stop().await;
	}

	#[tokio::test]
	async fn test_give_side_not_created_dropped() {
		let h = harness().await;
		h.give_client.set_give_state(GiveState::Cancelled);

		h.handle.process(PipelineEvent::Feed(created(6)));
		tokio::time::sleep(Duration::from_millis(50)).await;

		assert_eq!(h.take_client.sent_count(), 0);
		assert!(h.mempool.is_empty());
		h.stop().await;
	}

	#[tokio::test]
	async fn test_estimate_failure_parks_and_retries() {
		let h = harness().await;
		h.take_client.fail_next_estimates(1);
		h.take_client.fulfill_after_send();

		h.handle.process(PipelineEvent::Feed(created(2)));
		wait_until("fulfilled on retry", || h.take_client.sent_count() == 1).await;
		h.stop().await;
	}

	#[tokio::test]
	async fn test_preliminary_build_client_error_parks_and_retries() {
		let h = harness().await;
		h.take_builder.fail_next_fulfill_builds(1);
		h.take_client.fulfill_after_send();

		h.handle.process(PipelineEvent::Feed(created(8)));
		wait_until("fulfilled on retry", || h.take_client.sent_count() == 1).await;
		h.stop().await;
	}

	#[tokio::test]
	async fn test_unprofitable_order_parks_in_mempool() {
		let h = harness().await;
		let mut incoming = created(9);
		// give worth less than take
		incoming.order.give.amount = U256::from(900_000u64);
		h.handle.process(PipelineEvent::Feed(incoming));

		wait_until("parked", || h.mempool.contains(&OrderId([9u8; 32]))).await;
		assert_eq!(h.take_client.sent_count(), 0);
		h.stop().await;
	}

	#[tokio::test]
	async fn test_under_confirmed_order_dropped_without_mempool() {
		let h = harness().await;
		// harness entries carry no src constraints: no range covers any
		// worth, so a Confirmed announcement waits for finalization and
		// must not be parked in the mempool
		h.handle.process(PipelineEvent::Feed(IncomingOrder {
			order: order(0xd1),
			status: OrderStatus::Created {
				finalization: Finalization::Confirmed {
					confirmation_blocks_count: 3,
				},
			},
		}));

		tokio::time::sleep(Duration::from_millis(80)).await;
		assert!(h.mempool.is_empty());
		assert_eq!(h.take_client.sent_count(), 0);
		h.stop().await;
	}

	#[tokio::test]
	async fn test_broadcast_failure_parks_and_retries() {
		let h = harness().await;
		h.take_client.fail_next_sends(1);
		h.take_client.fulfill_after_send();

		h.handle.process(PipelineEvent::Feed(created(3)));
		wait_until("fulfilled on retry", || h.take_client.sent_count() == 1).await;
		h.stop().await;
	}

	#[test]
	fn test_gas_blowout_fast_tracks_twice_then_standard() {
		let blowout = || ProcessError::GasBlowout {
			estimated: 140_000,
			cap: 125_000,
		};
		match outcome_for_error(blowout(), true, 0) {
			ProcessOutcome::Postponed { delay, .. } => {
				assert_eq!(delay, Some(FAST_TRACK_DELAY))
			}
			other => panic!("unexpected outcome {:?}", other),
		}
		match outcome_for_error(blowout(), true, 1) {
			ProcessOutcome::Postponed { delay, .. } => {
				assert_eq!(delay, Some(FAST_TRACK_DELAY))
			}
			other => panic!("unexpected outcome {:?}", other),
		}
		match outcome_for_error(blowout(), true, 2) {
			ProcessOutcome::Postponed { delay, .. } => assert_eq!(delay, None),
			other => panic!("unexpected outcome {:?}", other),
		}
	}

	#[test]
	fn test_non_finalized_orders_never_mempool() {
		let err = ProcessError::TransientRpc("flaky".to_string());
		match outcome_for_error(err, false, 0) {
			ProcessOutcome::Dropped { .. } => {}
			other => panic!("unexpected outcome {:?}", other),
		}
	}

	#[test]
	fn test_delay_carries_remaining_duration() {
		let err = ProcessError::FulfillmentDelayed(Duration::from_secs(9));
		match outcome_for_error(err, true, 0) {
			ProcessOutcome::Postponed { delay, .. } => {
				assert_eq!(delay, Some(Duration::from_secs(9)))
			}
			other => panic!("unexpected outcome {:?}", other),
		}
	}

	#[test]
	fn test_budget_exhaustion_is_retryable() {
		let err = ProcessError::BudgetExhausted { budget: "tvl" };
		match outcome_for_error(err, true, 0) {
			ProcessOutcome::Postponed { delay: None, .. } => {}
			other => panic!("unexpected outcome {:?}", other),
		}
	}
}
