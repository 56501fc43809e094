//! Local retry queue with monotonically growing delays.
//!
//! Nothing here touches a chain's transaction mempool: this is the bot's
//! own parking lot for orders that failed transiently. Re-entries are
//! delivered through the pipeline's normal `process` entry point with a
//! bumped attempt count.

use crate::pipeline::PipelineEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use taker_types::{ChainId, IncomingOrder, OrderId};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct MempoolConfig {
	/// Base delay of the first re-entry.
	pub initial_interval: Duration,
	/// Added once per accumulated attempt.
	pub max_delay_step: Duration,
	/// Fire resolution; clamped to at least one second.
	pub tick: Duration,
}

impl Default for MempoolConfig {
	fn default() -> Self {
		Self {
			initial_interval: Duration::from_secs(30),
			max_delay_step: Duration::from_secs(30),
			tick: Duration::from_secs(1),
		}
	}
}

/// One parked order.
#[derive(Debug, Clone)]
pub struct PendingOrder {
	pub incoming: IncomingOrder,
	pub first_seen_at: Instant,
	/// Times this order has been scheduled here, including now.
	pub attempts: u32,
	next_eligible_at: Instant,
	seq: u64,
}

struct Inner {
	records: HashMap<OrderId, PendingOrder>,
	next_seq: u64,
}

/// Per-take-chain retry scheduler.
pub struct MempoolScheduler {
	chain_id: ChainId,
	config: MempoolConfig,
	inner: Mutex<Inner>,
}

impl MempoolScheduler {
	pub fn new(chain_id: ChainId, config: MempoolConfig) -> Self {
		Self {
			chain_id,
			config,
			inner: Mutex::new(Inner {
				records: HashMap::new(),
				next_seq: 0,
			}),
		}
	}

	/// Park an order. `prior_attempts` counts earlier deliveries from this
	/// scheduler; the explicit `delay` overrides the backoff formula
	/// (fast-track). `first_seen_at` survives across re-parks.
	pub fn add_order(
		&self,
		incoming: IncomingOrder,
		prior_attempts: u32,
		first_seen_at: Instant,
		delay: Option<Duration>,
	) {
		let order_id = incoming.order.order_id;
		let attempts = prior_attempts + 1;
		let backoff =
			delay.unwrap_or(self.config.initial_interval + self.config.max_delay_step * attempts);

		let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		let seq = inner.next_seq;
		inner.next_seq += 1;
		let first_seen_at = inner
			.records
			.get(&order_id)
			.map(|existing| existing.first_seen_at.min(first_seen_at))
			.unwrap_or(first_seen_at);
		inner.records.insert(
			order_id,
			PendingOrder {
				incoming,
				first_seen_at,
				attempts,
				next_eligible_at: Instant::now() + backoff,
				seq,
			},
		);
		debug!(
			chain = %self.chain_id,
			order_id = %order_id,
			attempts,
			delay_ms = backoff.as_millis() as u64,
			"order parked in mempool"
		);
	}

	/// Cancel a parked order. Synchronous; a fired order is not recalled.
	pub fn delete(&self, order_id: &OrderId) -> bool {
		self.inner
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.records
			.remove(order_id)
			.is_some()
	}

	pub fn contains(&self, order_id: &OrderId) -> bool {
		self.inner
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.records
			.contains_key(order_id)
	}

	pub fn len(&self) -> usize {
		self.inner
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.records
			.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Remove and return records due at `now`, in insertion order.
	pub fn take_due(&self, now: Instant) -> Vec<PendingOrder> {
		let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		let due_ids: Vec<OrderId> = inner
			.records
			.iter()
			.filter(|(_, record)| record.next_eligible_at <= now)
			.map(|(id, _)| *id)
			.collect();
		let mut due: Vec<PendingOrder> = due_ids
			.into_iter()
			.filter_map(|id| inner.records.remove(&id))
			.collect();
		due.sort_by_key(|record| record.seq);
		due
	}

	/// Tick loop: re-deliver due orders through the pipeline entry point.
	/// Shutdown drains the timers without firing.
	pub async fn run(
		self: Arc<Self>,
		sender: mpsc::UnboundedSender<PipelineEvent>,
		mut shutdown: broadcast::Receiver<()>,
	) {
		let tick = self.config.tick.max(Duration::from_millis(1));
		let mut interval = tokio::time::interval(tick);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			tokio::select! {
				_ = interval.tick() => {
					for record in self.take_due(Instant::now()) {
						let order_id = record.incoming.order.order_id;
						let event = PipelineEvent::Retry {
							incoming: record.incoming,
							attempts: record.attempts,
							first_seen_at: record.first_seen_at,
						};
						if sender.send(event).is_err() {
							warn!(chain = %self.chain_id, order_id = %order_id, "pipeline gone; mempool stopping");
							return;
						}
					}
				}
				_ = shutdown.recv() => {
					debug!(chain = %self.chain_id, parked = self.len(), "mempool scheduler draining");
					return;
				}
			}
		}
	}

	pub fn spawn(
		self: Arc<Self>,
		sender: mpsc::UnboundedSender<PipelineEvent>,
		shutdown: broadcast::Receiver<()>,
	) -> JoinHandle<()> {
		tokio::spawn(self.run(sender, shutdown))
	}
}
