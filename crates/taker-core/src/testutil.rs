//! Shared mocks for the crate's tests.

use crate::budget::UsdBudget;
use crate::registry::ChainEntry;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taker_account::{AccountError, SignerAdapter};
use taker_chains::{
	ChainClient, ChainError, FulfillRequest, GiveOrderState, OrderTxBuilder,
};
use taker_pricing::{PriceError, PriceSource};
use taker_swap::{SwapConnector, SwapError, SwapEstimation, SwapRequest};
use taker_types::{
	Address, ChainEngine, ChainId, ConstraintSet, OrderId, Signature, Transaction,
	TransactionHash, TransactionKind, TransactionReceipt, U256,
};

pub struct MockChainClient {
	chain_id: ChainId,
	balance: Mutex<U256>,
	decimals: u8,
	gas_estimates: Mutex<std::collections::VecDeque<u64>>,
	gas_price: Mutex<u128>,
	give_state: Mutex<GiveOrderState>,
	fulfilled: Mutex<std::collections::HashSet<OrderId>>,
	fulfill_after_send: AtomicBool,
	fail_sends: Mutex<u32>,
	fail_estimates: Mutex<u32>,
	sent: Mutex<Vec<Transaction>>,
	state_reads: Mutex<Vec<OrderId>>,
	fulfilled_reads: AtomicUsize,
}

impl MockChainClient {
	pub fn new(chain_id: ChainId) -> Self {
		Self {
			chain_id,
			balance: Mutex::new(U256::from(u128::MAX)),
			decimals: 6,
			gas_estimates: Mutex::new(std::collections::VecDeque::from([100_000])),
			gas_price: Mutex::new(0),
			give_state: Mutex::new(GiveOrderState::Created),
			fulfilled: Mutex::new(std::collections::HashSet::new()),
			fulfill_after_send: AtomicBool::new(false),
			fail_sends: Mutex::new(0),
			fail_estimates: Mutex::new(0),
			sent: Mutex::new(Vec::new()),
			state_reads: Mutex::new(Vec::new()),
			fulfilled_reads: AtomicUsize::new(0),
		}
	}

	pub fn set_balance(&self, balance: U256) {
		*self.balance.lock().unwrap() = balance;
	}

	pub fn set_gas_estimate(&self, estimate: u64) {
		*self.gas_estimates.lock().unwrap() = std::collections::VecDeque::from([estimate]);
	}

	/// Successive estimates, the last one repeating.
	pub fn set_gas_estimate_sequence(&self, estimates: Vec<u64>) {
		*self.gas_estimates.lock().unwrap() = estimates.into();
	}

	pub fn set_gas_price(&self, price: u128) {
		*self.gas_price.lock().unwrap() = price;
	}

	pub fn set_give_state(&self, state: GiveOrderState) {
		*self.give_state.lock().unwrap() = state;
	}

	pub fn mark_fulfilled(&self, order_id: OrderId) {
		self.fulfilled.lock().unwrap().insert(order_id);
	}

	/// Broadcasting marks the order fulfilled, as a healthy chain would.
	/// The order id is recovered from the mock transaction payload.
	pub fn fulfill_after_send(&self) {
		self.fulfill_after_send.store(true, Ordering::SeqCst);
	}

	pub fn fail_next_sends(&self, count: u32) {
		*self.fail_sends.lock().unwrap() = count;
	}

	pub fn fail_next_estimates(&self, count: u32) {
		*self.fail_estimates.lock().unwrap() = count;
	}

	pub fn sent_count(&self) -> usize {
		self.sent.lock().unwrap().len()
	}

	pub fn last_sent(&self) -> Option<Transaction> {
		self.sent.lock().unwrap().last().cloned()
	}

	/// Give-side state reads in call order.
	pub fn state_read_ids(&self) -> Vec<OrderId> {
		self.state_reads.lock().unwrap().clone()
	}

	pub fn fulfilled_read_count(&self) -> usize {
		self.fulfilled_reads.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl ChainClient for MockChainClient {
	fn chain_id(&self) -> ChainId {
		self.chain_id
	}

	async fn token_balance(&self, _: &Address, _: &Address) -> Result<U256, ChainError> {
		Ok(*self.balance.lock().unwrap())
	}

	async fn token_decimals(&self, _: &Address) -> Result<u8, ChainError> {
		Ok(self.decimals)
	}

	async fn estimate_gas(&self, _: &Transaction) -> Result<u64, ChainError> {
		let mut failures = self.fail_estimates.lock().unwrap();
		if *failures > 0 {
			*failures -= 1;
			return Err(ChainError::Rpc("estimate failed".to_string()));
		}
		drop(failures);
		let mut estimates = self.gas_estimates.lock().unwrap();
		if estimates.len() > 1 {
			Ok(estimates.pop_front().unwrap_or(100_000))
		} else {
			Ok(estimates.front().copied().unwrap_or(100_000))
		}
	}

	async fn gas_price(&self) -> Result<u128, ChainError> {
		Ok(*self.gas_price.lock().unwrap())
	}

	async fn send_transaction(&self, tx: Transaction) -> Result<TransactionHash, ChainError> {
		let mut failures = self.fail_sends.lock().unwrap();
		if *failures > 0 {
			*failures -= 1;
			return Err(ChainError::Rpc("broadcast refused".to_string()));
		}
		drop(failures);
		if self.fulfill_after_send.load(Ordering::SeqCst) {
			let payload = match &tx.kind {
				TransactionKind::Evm { data, .. } => data.as_slice(),
				TransactionKind::Solana { payload, .. } => payload.as_slice(),
			};
			if payload.len() >= 32 {
				let mut id = [0u8; 32];
				id.copy_from_slice(&payload[..32]);
				self.fulfilled.lock().unwrap().insert(OrderId(id));
			}
		}
		self.sent.lock().unwrap().push(tx);
		Ok(TransactionHash(vec![0xfe; 32]))
	}

	async fn transaction_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, ChainError> {
		if self.sent.lock().unwrap().is_empty() {
			Ok(None)
		} else {
			Ok(Some(TransactionReceipt {
				hash: hash.clone(),
				block_number: 1,
				success: true,
			}))
		}
	}

	async fn give_order_state(&self, order_id: &OrderId) -> Result<GiveOrderState, ChainError> {
		self.state_reads.lock().unwrap().push(*order_id);
		Ok(*self.give_state.lock().unwrap())
	}

	async fn is_order_fulfilled(&self, order_id: &OrderId) -> Result<bool, ChainError> {
		self.fulfilled_reads.fetch_add(1, Ordering::SeqCst);
		Ok(self.fulfilled.lock().unwrap().contains(order_id))
	}
}

#[derive(Default)]
pub struct MockTxBuilder {
	fail_fulfill_builds: Mutex<u32>,
	fail_unlocks: AtomicBool,
	fulfill_requests: Mutex<Vec<FulfillRequest>>,
	unlock_calls: Mutex<Vec<(ChainId, Address, Vec<OrderId>, Address)>>,
}

impl MockTxBuilder {
	pub fn fail_next_fulfill_builds(&self, count: u32) {
		*self.fail_fulfill_builds.lock().unwrap() = count;
	}

	pub fn fail_unlocks(&self) {
		self.fail_unlocks.store(true, Ordering::SeqCst);
	}

	pub fn fulfill_requests(&self) -> Vec<FulfillRequest> {
		self.fulfill_requests.lock().unwrap().clone()
	}

	pub fn unlock_calls(&self) -> Vec<(ChainId, Address, Vec<OrderId>, Address)> {
		self.unlock_calls.lock().unwrap().clone()
	}
}

#[async_trait]
impl OrderTxBuilder for MockTxBuilder {
	async fn build_fulfill(&self, request: &FulfillRequest) -> Result<Transaction, ChainError> {
		let mut failures = self.fail_fulfill_builds.lock().unwrap();
		if *failures > 0 {
			*failures -= 1;
			return Err(ChainError::Client("fulfill construction failed".to_string()));
		}
		drop(failures);
		self.fulfill_requests.lock().unwrap().push(request.clone());

		// order id first so the mock client can recover it on send
		let mut data = request.order.order_id.0.to_vec();
		data.extend_from_slice(&request.slippage_bps.to_be_bytes());

		let take_chain = request.order.take_chain();
		let kind = match take_chain.engine() {
			ChainEngine::Evm => TransactionKind::Evm {
				to: Address::evm([0u8; 20]),
				value: U256::ZERO,
				data,
				gas_limit: None,
				gas_price: None,
			},
			ChainEngine::Solana => TransactionKind::Solana {
				payload: data,
				payer: request.taker_address.clone(),
			},
		};
		Ok(Transaction {
			chain_id: take_chain,
			kind,
		})
	}

	async fn build_batch_unlock(
		&self,
		give_chain: ChainId,
		give_token: &Address,
		order_ids: &[OrderId],
		beneficiary: &Address,
	) -> Result<Transaction, ChainError> {
		if self.fail_unlocks.load(Ordering::SeqCst) {
			return Err(ChainError::Rpc("unlock construction failed".to_string()));
		}
		self.unlock_calls.lock().unwrap().push((
			give_chain,
			give_token.clone(),
			order_ids.to_vec(),
			beneficiary.clone(),
		));

		let kind = match give_chain.engine() {
			ChainEngine::Evm => TransactionKind::Evm {
				to: Address::evm([0u8; 20]),
				value: U256::ZERO,
				data: vec![order_ids.len() as u8],
				gas_limit: None,
				gas_price: None,
			},
			ChainEngine::Solana => TransactionKind::Solana {
				payload: vec![order_ids.len() as u8],
				payer: beneficiary.clone(),
			},
		};
		Ok(Transaction {
			chain_id: give_chain,
			kind,
		})
	}
}

pub struct MockSigner {
	address: Address,
	engine: ChainEngine,
}

impl MockSigner {
	pub fn for_chain(chain_id: ChainId, seed: u8) -> Self {
		match chain_id.engine() {
			ChainEngine::Evm => Self {
				address: Address::evm([seed; 20]),
				engine: ChainEngine::Evm,
			},
			ChainEngine::Solana => Self {
				address: Address::solana([seed; 32]),
				engine: ChainEngine::Solana,
			},
		}
	}
}

#[async_trait]
impl SignerAdapter for MockSigner {
	fn address(&self) -> Address {
		self.address.clone()
	}

	fn engine(&self) -> ChainEngine {
		self.engine
	}

	async fn sign(&self, _: &[u8]) -> Result<Signature, AccountError> {
		Ok(Signature(vec![0u8; 65]))
	}
}

pub struct StaticPriceSource {
	token_usd: f64,
	native_usd: f64,
}

impl StaticPriceSource {
	pub fn new(token_usd: f64, native_usd: f64) -> Self {
		Self {
			token_usd,
			native_usd,
		}
	}
}

#[async_trait]
impl PriceSource for StaticPriceSource {
	async fn token_price_usd(&self, _: ChainId, _: &Address) -> Result<f64, PriceError> {
		Ok(self.token_usd)
	}

	async fn native_price_usd(&self, _: ChainId) -> Result<f64, PriceError> {
		Ok(self.native_usd)
	}
}

pub struct StaticSwapConnector {
	engine: ChainEngine,
	amount_out: U256,
}

impl StaticSwapConnector {
	pub fn evm(amount_out: U256) -> Self {
		Self {
			engine: ChainEngine::Evm,
			amount_out,
		}
	}

	pub fn solana(amount_out: U256) -> Self {
		Self {
			engine: ChainEngine::Solana,
			amount_out,
		}
	}
}

#[async_trait]
impl SwapConnector for StaticSwapConnector {
	fn engine(&self) -> ChainEngine {
		self.engine
	}

	async fn quote(&self, request: SwapRequest) -> Result<SwapEstimation, SwapError> {
		Ok(SwapEstimation {
			request,
			amount_out: self.amount_out,
			route: serde_json::json!({}),
			fetched_at: chrono::Utc::now(),
		})
	}
}

/// A chain entry with permissive defaults: no filters, no constraint
/// ranges, uncapped budgets.
pub fn entry_with(
	chain_id: ChainId,
	client: Arc<MockChainClient>,
	tx_builder: Arc<MockTxBuilder>,
) -> Arc<ChainEntry> {
	Arc::new(ChainEntry {
		chain_id,
		rpc_url: "http://localhost:8545".to_string(),
		client,
		tx_builder,
		fulfill_signer: Arc::new(MockSigner::for_chain(chain_id, 0x33)),
		unlock_signer: Arc::new(MockSigner::for_chain(chain_id, 0x44)),
		beneficiary: match chain_id.engine() {
			ChainEngine::Evm => Address::evm([0x55; 20]),
			ChainEngine::Solana => Address::solana([0x55; 32]),
		},
		environment: std::collections::HashMap::new(),
		src_constraints: ConstraintSet::new(vec![]).unwrap(),
		dst_constraints: ConstraintSet::new(vec![]).unwrap(),
		src_filters: vec![],
		dst_filters: vec![],
		tvl_budget: UsdBudget::new("tvl", None),
		non_finalized_budget: UsdBudget::new("non_finalized", None),
		disabled: false,
	})
}
