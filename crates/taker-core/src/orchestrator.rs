//! Top-level wiring: registry construction, pipelines, feed fan-out and
//! graceful shutdown.

use crate::budget::UsdBudget;
use crate::context::ProcessContext;
use crate::evaluator::ProfitabilityEvaluator;
use crate::executor::FulfillmentExecutor;
use crate::feed::{ChannelFeed, ConfirmationThreshold, FeedSink, OrderFeed};
use crate::filters::{
	DenyDestination, GiveTokenAllowlist, MakerDenylist, OrderFilter, TakeTokenDenylist,
};
use crate::hooks::{HookDispatcher, HookHandler};
use crate::mempool::{MempoolConfig, MempoolScheduler};
use crate::pipeline::{OrderPipeline, PipelineEvent, PipelineHandle};
use crate::registry::{ChainEntry, ChainRegistry};
use crate::unlocker::BatchUnlocker;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taker_account::create_wallet;
use taker_chains::{ChainClient, OrderTxBuilder};
use taker_config::{
	parse_address_any, ConfigLoader, FilterConfig, PriceServiceConfig, TakerConfig,
};
use taker_pricing::{CachedPriceSource, CoingeckoPriceSource, PriceSource, UsdEstimator};
use taker_swap::{JupiterConnector, OneInchConnector, SwapRouter};
use taker_types::{Address, ChainId, IncomingOrder, TakerError};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Price cache lifetime; quotes older than this are refetched.
const PRICE_CACHE_TTL: Duration = Duration::from_secs(10);

/// The injected per-chain capabilities: RPC access and the wire format of
/// the order protocol's calls.
#[derive(Clone)]
pub struct ChainConnector {
	pub client: Arc<dyn ChainClient>,
	pub tx_builder: Arc<dyn OrderTxBuilder>,
}

/// Builder for a [`Taker`] instance.
pub struct TakerBuilder {
	config: Option<TakerConfig>,
	connectors: HashMap<ChainId, ChainConnector>,
	feed: Option<Arc<dyn OrderFeed>>,
	hooks: Vec<Arc<dyn HookHandler>>,
	price_source: Option<Arc<dyn PriceSource>>,
	swap_router: Option<Arc<SwapRouter>>,
}

impl TakerBuilder {
	pub fn new() -> Self {
		Self {
			config: None,
			connectors: HashMap::new(),
			feed: None,
			hooks: Vec::new(),
			price_source: None,
			swap_router: None,
		}
	}

	pub fn with_config(mut self, config: TakerConfig) -> Self {
		self.config = Some(config);
		self
	}

	pub fn with_connector(
		mut self,
		chain_id: ChainId,
		client: Arc<dyn ChainClient>,
		tx_builder: Arc<dyn OrderTxBuilder>,
	) -> Self {
		self.connectors
			.insert(chain_id, ChainConnector { client, tx_builder });
		self
	}

	pub fn with_feed(mut self, feed: Arc<dyn OrderFeed>) -> Self {
		self.feed = Some(feed);
		self
	}

	pub fn with_hook(mut self, hook: Arc<dyn HookHandler>) -> Self {
		self.hooks.push(hook);
		self
	}

	pub fn with_price_source(mut self, source: Arc<dyn PriceSource>) -> Self {
		self.price_source = Some(source);
		self
	}

	pub fn with_swap_router(mut self, router: Arc<SwapRouter>) -> Self {
		self.swap_router = Some(router);
		self
	}

	pub async fn build(self) -> Result<Taker, TakerError> {
		let config = self
			.config
			.ok_or_else(|| TakerError::Config("no configuration provided".to_string()))?;
		ConfigLoader::validate_config(&config).map_err(|e| TakerError::Config(e.to_string()))?;

		let buckets = Arc::new(
			config
				.bucket_set()
				.map_err(|e| TakerError::Config(e.to_string()))?,
		);

		// chain entries
		let mut entries = Vec::with_capacity(config.chains.len());
		let mut clients: HashMap<ChainId, Arc<dyn ChainClient>> = HashMap::new();
		for chain in &config.chains {
			let connector = self.connectors.get(&chain.chain).ok_or_else(|| {
				TakerError::Config(format!(
					"no chain connector registered for chain {}; the embedding \
					 application wires RPC clients and transaction builders",
					chain.chain
				))
			})?;

			let fulfill_signer = create_wallet(&chain.taker_private_key)
				.map_err(|e| TakerError::Account(e.to_string()))?;
			let unlock_signer = create_wallet(&chain.unlock_authority_private_key)
				.map_err(|e| TakerError::Account(e.to_string()))?;
			let beneficiary = chain
				.parsed_beneficiary()
				.map_err(|e| TakerError::Config(e.to_string()))?;

			let mut dst_filters = build_filters(&chain.dst_filters)?;
			if chain.disabled {
				// disabling a chain is explicit: blanket-deny it as a
				// destination
				dst_filters.push(Arc::new(DenyDestination) as Arc<dyn OrderFilter>);
			}

			entries.push(Arc::new(ChainEntry {
				chain_id: chain.chain,
				rpc_url: chain.chain_rpc.clone(),
				client: connector.client.clone(),
				tx_builder: connector.tx_builder.clone(),
				fulfill_signer,
				unlock_signer,
				beneficiary,
				environment: chain.environment.clone(),
				src_constraints: chain
					.src_constraint_set()
					.map_err(|e| TakerError::Config(e.to_string()))?,
				dst_constraints: chain
					.dst_constraint_set()
					.map_err(|e| TakerError::Config(e.to_string()))?,
				src_filters: build_filters(&chain.src_filters)?,
				dst_filters,
				tvl_budget: UsdBudget::new("tvl", chain.tvl_cap_usd),
				non_finalized_budget: UsdBudget::new("non_finalized", chain.non_finalized_cap_usd),
				disabled: chain.disabled,
			}));
			clients.insert(chain.chain, connector.client.clone());
		}
		let registry = Arc::new(ChainRegistry::new(entries));

		// prices
		let price_source = match self.price_source {
			Some(source) => source,
			None => {
				let coingecko = match &config.token_price_service {
					PriceServiceConfig::Coingecko { base_url: Some(url) } => {
						CoingeckoPriceSource::with_base_url(url.clone())
					}
					PriceServiceConfig::Coingecko { base_url: None } => {
						CoingeckoPriceSource::new()
					}
				}
				.map_err(|e| TakerError::Price(e.to_string()))?;
				Arc::new(CachedPriceSource::new(Arc::new(coingecko), PRICE_CACHE_TTL))
					as Arc<dyn PriceSource>
			}
		};
		let estimator = Arc::new(UsdEstimator::new(price_source, clients));

		// swap routing over the enabled chains
		let swap_router = match self.swap_router {
			Some(router) => router,
			None => {
				let one_inch =
					OneInchConnector::new(None).map_err(|e| TakerError::Swap(e.to_string()))?;
				let jupiter = JupiterConnector::new().map_err(|e| TakerError::Swap(e.to_string()))?;
				Arc::new(SwapRouter::new(Arc::new(one_inch), Arc::new(jupiter)))
			}
		};
		let enabled = registry.enabled_chain_ids();
		swap_router.set_enabled_chains(&enabled);

		let evaluator = Arc::new(ProfitabilityEvaluator::new(
			estimator.clone(),
			swap_router,
			config.min_profitability_bps,
			config.batch_unlock_size,
		));
		let executor = Arc::new(FulfillmentExecutor::new(
			Duration::from_secs(config.fulfillment.wait_secs),
			Duration::from_secs(config.fulfillment.poll_interval_secs),
		));

		// hooks: config names select among the registered handlers
		let hooks = Arc::new(HookDispatcher::new(select_hooks(
			&config.hook_handlers,
			self.hooks,
		)));
		let unlocker = Arc::new(BatchUnlocker::new(
			registry.clone(),
			config.batch_unlock_size,
			hooks.clone(),
		));

		let ctx = Arc::new(ProcessContext {
			registry: registry.clone(),
			buckets,
			estimator,
			evaluator,
			executor,
			unlocker,
			hooks,
			global_filters: build_filters(&config.filters)?,
		});

		// one pipeline and one mempool scheduler per enabled take chain
		let (shutdown_tx, _) = broadcast::channel(16);
		let mempool_config = MempoolConfig {
			initial_interval: Duration::from_secs(config.mempool.initial_interval_secs),
			max_delay_step: Duration::from_secs(config.mempool.max_delay_step_secs),
			..MempoolConfig::default()
		};
		let mut handles = HashMap::new();
		let mut pipelines = Vec::new();
		let mut mempools = Vec::new();
		for chain_id in &enabled {
			let entry = registry.get(*chain_id)?.clone();
			let mempool = Arc::new(MempoolScheduler::new(*chain_id, mempool_config.clone()));
			let (pipeline, handle) = OrderPipeline::new(
				entry,
				ctx.clone(),
				mempool.clone(),
				shutdown_tx.subscribe(),
			);
			mempools.push((handle.sender(), mempool));
			handles.insert(*chain_id, handle);
			pipelines.push(pipeline);
		}

		// feed wiring
		let feed = self
			.feed
			.unwrap_or_else(|| Arc::new(ChannelFeed::new()) as Arc<dyn OrderFeed>);
		let (feed_tx, feed_rx) = mpsc::unbounded_channel();
		let unlock_authorities: Vec<Address> = registry
			.entries()
			.map(|entry| entry.unlock_signer.address())
			.collect();
		let mut thresholds = Vec::new();
		for entry in registry.entries() {
			for range in entry.src_constraints.iter() {
				thresholds.push(ConfirmationThreshold {
					chain_id: entry.chain_id,
					usd_upper_threshold: range.usd_upper_threshold,
					min_block_confirmations: range.min_block_confirmations,
				});
			}
		}

		info!(
			chains = config.chains.len(),
			enabled = enabled.len(),
			"taker built"
		);

		Ok(Taker {
			registry,
			feed,
			handles,
			pipelines: Mutex::new(pipelines),
			mempools: Mutex::new(mempools),
			feed_sink: FeedSink::new(feed_tx),
			feed_rx: Mutex::new(Some(feed_rx)),
			unlock_authorities,
			thresholds,
			shutdown_tx,
			tasks: Mutex::new(JoinSet::new()),
			started: AtomicBool::new(false),
		})
	}
}

impl Default for TakerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn build_filters(configs: &[FilterConfig]) -> Result<Vec<Arc<dyn OrderFilter>>, TakerError> {
	let mut filters: Vec<Arc<dyn OrderFilter>> = Vec::with_capacity(configs.len());
	for config in configs {
		let filter: Arc<dyn OrderFilter> = match config {
			FilterConfig::GiveTokenAllowlist { tokens } => {
				Arc::new(GiveTokenAllowlist::new(parse_all(tokens)?))
			}
			FilterConfig::TakeTokenDenylist { tokens } => {
				Arc::new(TakeTokenDenylist::new(parse_all(tokens)?))
			}
			FilterConfig::MakerDenylist { makers } => {
				Arc::new(MakerDenylist::new(parse_all(makers)?))
			}
		};
		filters.push(filter);
	}
	Ok(filters)
}

fn parse_all(raw: &[String]) -> Result<Vec<Address>, TakerError> {
	raw.iter()
		.map(|s| parse_address_any(s).map_err(|e| TakerError::Config(e.to_string())))
		.collect()
}

fn select_hooks(
	names: &[String],
	registered: Vec<Arc<dyn HookHandler>>,
) -> Vec<Arc<dyn HookHandler>> {
	if names.is_empty() {
		return registered;
	}
	let mut selected = Vec::new();
	for name in names {
		match registered.iter().find(|h| h.name() == name) {
			Some(handler) => selected.push(handler.clone()),
			None => warn!(name = %name, "configured hook handler was never registered"),
		}
	}
	selected
}

/// The long-running taker process.
pub struct Taker {
	registry: Arc<ChainRegistry>,
	feed: Arc<dyn OrderFeed>,
	handles: HashMap<ChainId, PipelineHandle>,
	pipelines: Mutex<Vec<OrderPipeline>>,
	mempools: Mutex<Vec<(mpsc::UnboundedSender<PipelineEvent>, Arc<MempoolScheduler>)>>,
	feed_sink: FeedSink,
	feed_rx: Mutex<Option<mpsc::UnboundedReceiver<IncomingOrder>>>,
	unlock_authorities: Vec<Address>,
	thresholds: Vec<ConfirmationThreshold>,
	shutdown_tx: broadcast::Sender<()>,
	tasks: Mutex<JoinSet<()>>,
	started: AtomicBool,
}

impl std::fmt::Debug for Taker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Taker").finish_non_exhaustive()
	}
}

impl Taker {
	pub fn builder() -> TakerBuilder {
		TakerBuilder::new()
	}

	pub fn registry(&self) -> &Arc<ChainRegistry> {
		&self.registry
	}

	/// Spawn the pipelines and connect the feed. Idempotent: a second call
	/// returns immediately.
	pub async fn start(&self) -> Result<(), TakerError> {
		if self.started.swap(true, Ordering::SeqCst) {
			debug!("taker already started");
			return Ok(());
		}
		info!("starting taker");

		let mut tasks = self.tasks.lock().await;
		for pipeline in self.pipelines.lock().await.drain(..) {
			tasks.spawn(pipeline.run());
		}
		for (sender, mempool) in self.mempools.lock().await.drain(..) {
			tasks.spawn(mempool.run(sender, self.shutdown_tx.subscribe()));
		}

		// fan feed events out by take chain
		let mut feed_rx = self
			.feed_rx
			.lock()
			.await
			.take()
			.ok_or_else(|| TakerError::Internal("feed receiver already taken".to_string()))?;
		let handles = self.handles.clone();
		let mut shutdown = self.shutdown_tx.subscribe();
		tasks.spawn(async move {
			loop {
				tokio::select! {
					maybe = feed_rx.recv() => match maybe {
						Some(incoming) => {
							let take_chain = incoming.order.take_chain();
							match handles.get(&take_chain) {
								Some(handle) => {
									handle.process(PipelineEvent::Feed(incoming));
								}
								None => warn!(
									chain = %take_chain,
									order_id = %incoming.order.order_id,
									"order for unsupported take chain dropped"
								),
							}
						}
						None => break,
					},
					_ = shutdown.recv() => break,
				}
			}
		});
		drop(tasks);

		self.feed
			.init(
				self.feed_sink.clone(),
				self.unlock_authorities.clone(),
				self.thresholds.clone(),
			)
			.await
			.map_err(|e| TakerError::Feed(e.to_string()))?;
		self.feed
			.set_enabled_chains(&self.registry.enabled_chain_ids())
			.await
			.map_err(|e| TakerError::Feed(e.to_string()))?;

		info!("taker started");
		Ok(())
	}

	/// Stop feed intake, let in-flight orders finish, drain mempool timers.
	pub async fn shutdown(&self) {
		info!("shutting down taker");
		let _ = self.shutdown_tx.send(());
		let mut tasks = self.tasks.lock().await;
		while tasks.join_next().await.is_some() {}
		info!("taker stopped");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::{MockChainClient, MockTxBuilder, StaticPriceSource, StaticSwapConnector};
	use std::time::Duration;
	use taker_types::{Finalization, Order, OrderId, OrderStatus, TokenAmount, U256};

	const EVM_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn config_toml() -> String {
		format!(
			r#"
order_feed = "channel"
min_profitability_bps = 4
batch_unlock_size = 1

[fulfillment]
wait_secs = 1
poll_interval_secs = 1

[mempool]
initial_interval_secs = 1
max_delay_step_secs = 1

[[chains]]
chain = 1
chain_rpc = "https://eth.example.com"
taker_private_key = "{key}"
unlock_authority_private_key = "{key}"
beneficiary = "0x{bene}"

[[chains]]
chain = 42161
chain_rpc = "https://arb.example.com"
taker_private_key = "{key}"
unlock_authority_private_key = "{key}"
beneficiary = "0x{bene}"

[[buckets]]
1 = "0x{give}"
42161 = "0x{reserve}"
"#,
			key = EVM_KEY,
			bene = "11".repeat(20),
			give = "aa".repeat(20),
			reserve = "bb".repeat(20),
		)
	}

	struct TestRig {
		taker: Arc<Taker>,
		feed: Arc<ChannelFeed>,
		give_client: Arc<MockChainClient>,
		take_client: Arc<MockChainClient>,
		give_builder: Arc<MockTxBuilder>,
	}

	async fn rig() -> TestRig {
		let config = ConfigLoader::from_toml(&config_toml()).unwrap();
		let give_client = Arc::new(MockChainClient::new(ChainId::ETHEREUM));
		let take_client = Arc::new(MockChainClient::new(ChainId::ARBITRUM));
		let give_builder = Arc::new(MockTxBuilder::default());
		let take_builder = Arc::new(MockTxBuilder::default());
		let feed = Arc::new(ChannelFeed::new());

		let router = Arc::new(SwapRouter::new(
			Arc::new(StaticSwapConnector::evm(U256::ZERO)),
			Arc::new(StaticSwapConnector::solana(U256::ZERO)),
		));

		let taker = Taker::builder()
			.with_config(config)
			.with_connector(ChainId::ETHEREUM, give_client.clone(), give_builder.clone())
			.with_connector(ChainId::ARBITRUM, take_client.clone(), take_builder)
			.with_feed(feed.clone())
			.with_price_source(Arc::new(StaticPriceSource::new(1.0, 1_000.0)))
			.with_swap_router(router)
			.build()
			.await
			.unwrap();

		TestRig {
			taker: Arc::new(taker),
			feed,
			give_client,
			take_client,
			give_builder,
		}
	}

	fn created(byte: u8) -> IncomingOrder {
		IncomingOrder {
			order: Order {
				order_id: OrderId([byte; 32]),
				give: TokenAmount {
					chain_id: ChainId::ETHEREUM,
					token: Address::evm([0xaa; 20]),
					amount: U256::from(2_000_000u64),
				},
				take: TokenAmount {
					chain_id: ChainId::ARBITRUM,
					token: Address::evm([0xbb; 20]),
					amount: U256::from(1_000_000u64),
				},
				receiver: Address::evm([9u8; 20]),
				maker: Address::evm([8u8; 20]),
			},
			status: OrderStatus::Created {
				finalization: Finalization::Finalized,
			},
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
	async fn test_end_to_end_fulfill_and_unlock() {
		let rig = rig().await;
		rig.take_client.fulfill_after_send();
		rig.taker.start().await.unwrap();

		assert!(rig.feed.push(created(1)));
		wait_until("fulfill broadcast", || rig.take_client.sent_count() == 1).await;
		wait_until("unlock sent", || rig.give_builder.unlock_calls().len() == 1).await;

		rig.taker.shutdown().await;
	}

	#[tokio::test]
	async fn test_start_is_idempotent() {
		let rig = rig().await;
		rig.taker.start().await.unwrap();
		rig.taker.start().await.unwrap();
		rig.taker.shutdown().await;
	}

	#[tokio::test]
	async fn test_unsupported_take_chain_dropped() {
		let rig = rig().await;
		rig.taker.start().await.unwrap();

		let mut incoming = created(2);
		incoming.order.take.chain_id = ChainId::POLYGON;
		assert!(rig.feed.push(incoming));

		// nothing reaches either client
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert_eq!(rig.take_client.sent_count(), 0);
		assert!(rig.give_client.state_read_ids().is_empty());
		rig.taker.shutdown().await;
	}

	#[tokio::test]
	async fn test_build_fails_without_connector() {
		let config = ConfigLoader::from_toml(&config_toml()).unwrap();
		let err = Taker::builder()
			.with_config(config)
			.with_price_source(Arc::new(StaticPriceSource::new(1.0, 1.0)))
			.build()
			.await
			.unwrap_err();
		assert!(err.to_string().contains("no chain connector"));
	}
}
