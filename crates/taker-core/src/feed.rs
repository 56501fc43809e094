//! Order feed seam.
//!
//! The transport is external; the core consumes this interface and hands
//! the feed a sink to push events into, plus the unlock authorities and
//! confirmation thresholds it should announce upstream.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use taker_types::{Address, ChainId, IncomingOrder};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FeedError {
	#[error("feed connection failed: {0}")]
	Connection(String),
	#[error("feed rejected subscription: {0}")]
	Subscription(String),
}

/// Minimum confirmations the feed should announce orders with, per chain
/// and USD range.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationThreshold {
	pub chain_id: ChainId,
	pub usd_upper_threshold: f64,
	pub min_block_confirmations: u64,
}

/// Where the feed pushes events.
#[derive(Clone)]
pub struct FeedSink {
	tx: mpsc::UnboundedSender<IncomingOrder>,
}

impl FeedSink {
	pub fn new(tx: mpsc::UnboundedSender<IncomingOrder>) -> Self {
		Self { tx }
	}

	/// False once the consumer is gone.
	pub fn push(&self, incoming: IncomingOrder) -> bool {
		self.tx.send(incoming).is_ok()
	}
}

#[async_trait]
pub trait OrderFeed: Send + Sync {
	/// Connect and start pushing events into `sink`. Idempotent: a second
	/// call returns immediately without reconnecting.
	async fn init(
		&self,
		sink: FeedSink,
		unlock_authorities: Vec<Address>,
		min_confirmation_thresholds: Vec<ConfirmationThreshold>,
	) -> Result<(), FeedError>;

	async fn set_enabled_chains(&self, chains: &[ChainId]) -> Result<(), FeedError>;
}

/// In-process feed fed by the embedding application or by tests.
#[derive(Default)]
pub struct ChannelFeed {
	sink: Mutex<Option<FeedSink>>,
	enabled: Mutex<Vec<ChainId>>,
	initialized: AtomicBool,
}

impl ChannelFeed {
	pub fn new() -> Self {
		Self::default()
	}

	/// Push one event; false when not initialized or the consumer is gone.
	pub fn push(&self, incoming: IncomingOrder) -> bool {
		let sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
		match sink.as_ref() {
			Some(sink) => sink.push(incoming),
			None => false,
		}
	}

	pub fn enabled_chains(&self) -> Vec<ChainId> {
		self.enabled
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.clone()
	}
}

#[async_trait]
impl OrderFeed for ChannelFeed {
	async fn init(
		&self,
		sink: FeedSink,
		_unlock_authorities: Vec<Address>,
		_min_confirmation_thresholds: Vec<ConfirmationThreshold>,
	) -> Result<(), FeedError> {
		if self.initialized.swap(true, Ordering::SeqCst) {
			debug!("channel feed already initialized");
			return Ok(());
		}
		*self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
		Ok(())
	}

	async fn set_enabled_chains(&self, chains: &[ChainId]) -> Result<(), FeedError> {
		*self.enabled.lock().unwrap_or_else(|e| e.into_inner()) = chains.to_vec();
		Ok(())
	}
}
