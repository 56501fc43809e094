//! Batch unlocker: amortized reclaim of give-chain funds.
//!
//! Fulfilled orders accumulate per (give chain, give token) until the
//! configured batch size, then one unlock call reclaims them all. Orders
//! touching Solana on either leg unlock one at a time. There is no
//! flush-on-idle timer; a partial batch waits for more fulfillments.

use crate::hooks::HookDispatcher;
use crate::registry::ChainRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use taker_types::{Address, ChainEngine, ChainId, HookEvent, Order, OrderId, TransactionHash};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct UnlockEntry {
	order_id: OrderId,
}

type BatchKey = (ChainId, Address);

pub struct BatchUnlocker {
	registry: Arc<ChainRegistry>,
	batch_unlock_size: usize,
	slots: Mutex<HashMap<BatchKey, Vec<UnlockEntry>>>,
	hooks: Arc<HookDispatcher>,
}

impl BatchUnlocker {
	pub fn new(
		registry: Arc<ChainRegistry>,
		batch_unlock_size: usize,
		hooks: Arc<HookDispatcher>,
	) -> Self {
		Self {
			registry,
			batch_unlock_size,
			slots: Mutex::new(HashMap::new()),
			hooks,
		}
	}

	/// Batch size for one order's legs: Solana on either side means
	/// un-batched.
	fn effective_batch_size(&self, order: &Order) -> usize {
		if order.give_chain().engine() == ChainEngine::Solana
			|| order.take_chain().engine() == ChainEngine::Solana
		{
			1
		} else {
			self.batch_unlock_size
		}
	}

	/// Record a fulfilled order; flushes when its slot reaches the batch
	/// size. Returns the unlock hash when a batch went out.
	pub async fn register_fulfilled(&self, order: &Order) -> Option<TransactionHash> {
		let key: BatchKey = (order.give_chain(), order.give.token.clone());
		let size = self.effective_batch_size(order);

		let ready: Option<Vec<UnlockEntry>> = {
			let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
			let slot = slots.entry(key.clone()).or_default();
			if slot.iter().any(|entry| entry.order_id == order.order_id) {
				debug!(order_id = %order.order_id, "order already awaiting unlock");
				return None;
			}
			slot.push(UnlockEntry {
				order_id: order.order_id,
			});
			if slot.len() >= size {
				Some(std::mem::take(slot))
			} else {
				debug!(
					give_chain = %key.0,
					pending = slot.len(),
					batch_size = size,
					"unlock batch filling"
				);
				None
			}
		};

		let batch = ready?;
		match self.flush(&key, &batch).await {
			Ok(hash) => Some(hash),
			Err(reason) => {
				warn!(
					give_chain = %key.0,
					orders = batch.len(),
					reason = %reason,
					"unlock failed; batch stays pending"
				);
				// entries stay pending in fulfillment order for the
				// operator; no automatic retry
				let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
				let slot = slots.entry(key).or_default();
				let mut restored = batch;
				restored.append(slot);
				*slot = restored;
				None
			}
		}
	}

	async fn flush(&self, key: &BatchKey, batch: &[UnlockEntry]) -> Result<TransactionHash, String> {
		let (give_chain, give_token) = key;
		let entry = self
			.registry
			.get(*give_chain)
			.map_err(|e| e.to_string())?;
		let order_ids: Vec<OrderId> = batch.iter().map(|e| e.order_id).collect();

		let tx = entry
			.tx_builder
			.build_batch_unlock(*give_chain, give_token, &order_ids, &entry.beneficiary)
			.await
			.map_err(|e| e.to_string())?;
		let hash = entry
			.client
			.send_transaction(tx)
			.await
			.map_err(|e| e.to_string())?;

		info!(
			give_chain = %give_chain,
			orders = order_ids.len(),
			tx = %hash,
			"unlock batch sent"
		);
		self.hooks.dispatch(HookEvent::UnlockSent {
			give_chain: *give_chain,
			give_token: give_token.clone(),
			order_ids,
			tx_hash: hash.clone(),
		});
		Ok(hash)
	}

	/// Orders currently awaiting a batch in the slot.
	pub fn pending_len(&self, give_chain: ChainId, give_token: &Address) -> usize {
		self.slots
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.get(&(give_chain, give_token.clone()))
			.map(|slot| slot.len())
			.unwrap_or(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::{entry_with, MockChainClient, MockTxBuilder};
	use taker_types::{TokenAmount, U256};

	fn order(byte: u8, give_chain: ChainId, take_chain: ChainId) -> Order {
		Order {
			order_id: OrderId([byte; 32]),
			give: TokenAmount {
				chain_id: give_chain,
				token: match give_chain.engine() {
					ChainEngine::Evm => Address::evm([0xaa; 20]),
					ChainEngine::Solana => Address::solana([0xaa; 32]),
				},
				amount: U256::from(100u64),
			},
			take: TokenAmount {
				chain_id: take_chain,
				token: Address::evm([0xbb; 20]),
				amount: U256::from(99u64),
			},
			receiver: Address::evm([1u8; 20]),
			maker: Address::evm([2u8; 20]),
		}
	}

	fn unlocker(batch_size: usize) -> (BatchUnlocker, Arc<MockChainClient>, Arc<MockTxBuilder>) {
		let client = Arc::new(MockChainClient::new(ChainId::ETHEREUM));
		let builder = Arc::new(MockTxBuilder::default());
		let sol_client = Arc::new(MockChainClient::new(ChainId::SOLANA));
		let registry = Arc::new(ChainRegistry::new(vec![
			entry_with(ChainId::ETHEREUM, client.clone(), builder.clone()),
			entry_with(ChainId::SOLANA, sol_client, Arc::new(MockTxBuilder::default())),
		]));
		(
			BatchUnlocker::new(registry, batch_size, Arc::new(HookDispatcher::default())),
			client,
			builder,
		)
	}

	#[tokio::test]
	async fn test_batch_fills_then_flushes_once_in_order() {
		let (unlocker, client, builder) = unlocker(3);

		for byte in [1u8, 2, 3] {
			let flushed = unlocker
				.register_fulfilled(&order(byte, ChainId::ETHEREUM, ChainId::ARBITRUM))
				.await;
			if byte < 3 {
				assert!(flushed.is_none());
			} else {
				assert!(flushed.is_some());
			}
		}

		let calls = builder.unlock_calls();
		assert_eq!(calls.len(), 1);
		let (_, _, ids, _) = &calls[0];
		assert_eq!(
			ids,
			&vec![OrderId([1u8; 32]), OrderId([2u8; 32]), OrderId([3u8; 32])]
		);
		assert_eq!(client.sent_count(), 1);
		assert_eq!(
			unlocker.pending_len(ChainId::ETHEREUM, &Address::evm([0xaa; 20])),
			0
		);
	}

	#[tokio::test]
	async fn test_partial_batch_stays_pending() {
		let (unlocker, client, _) = unlocker(3);
		unlocker
			.register_fulfilled(&order(1, ChainId::ETHEREUM, ChainId::ARBITRUM))
			.await;
		assert_eq!(client.sent_count(), 0);
		assert_eq!(
			unlocker.pending_len(ChainId::ETHEREUM, &Address::evm([0xaa; 20])),
			1
		);
	}

	#[tokio::test]
	async fn test_solana_leg_unlocks_unbatched() {
		let (unlocker, _, builder) = unlocker(10);
		// EVM give chain, Solana take chain: still un-batched
		let flushed = unlocker
			.register_fulfilled(&order(1, ChainId::ETHEREUM, ChainId::SOLANA))
			.await;
		assert!(flushed.is_some());
		assert_eq!(builder.unlock_calls().len(), 1);
	}

	#[tokio::test]
	async fn test_failed_unlock_keeps_entries_pending() {
		let (unlocker, client, builder) = unlocker(2);
		builder.fail_unlocks();

		for byte in [1u8, 2] {
			unlocker
				.register_fulfilled(&order(byte, ChainId::ETHEREUM, ChainId::ARBITRUM))
				.await;
		}
		assert_eq!(client.sent_count(), 0);
		// both entries remain for the operator
		assert_eq!(
			unlocker.pending_len(ChainId::ETHEREUM, &Address::evm([0xaa; 20])),
			2
		);
	}

	#[tokio::test]
	async fn test_duplicate_registration_ignored() {
		let (unlocker, _, _) = unlocker(2);
		let o = order(1, ChainId::ETHEREUM, ChainId::ARBITRUM);
		unlocker.register_fulfilled(&o).await;
		unlocker.register_fulfilled(&o).await;
		assert_eq!(
			unlocker.pending_len(ChainId::ETHEREUM, &Address::evm([0xaa; 20])),
			1
		);
	}
}
