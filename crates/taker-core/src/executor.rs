//! Fulfillment execution on the destination chain.
//!
//! EVM fulfillments are gas-capped: a preliminary estimate (times a safety
//! multiplier) bounds the gas the final transaction may need, and a
//! transaction whose re-estimate blows past that cap is never broadcast.
//! Solana fulfillments carry no gas caps.

use crate::error::ProcessError;
use crate::registry::ChainEntry;
use std::time::Duration;
use taker_chains::FulfillRequest;
use taker_types::{ChainEngine, OrderId, Transaction, TransactionHash, TransactionKind};
use tracing::{debug, info, warn};

/// Safety multiplier on the preliminary gas estimate: ×1.25.
const GAS_LIMIT_MULTIPLIER: (u64, u64) = (125, 100);
/// Bump cap on the current gas price: ×1.3.
const GAS_PRICE_MULTIPLIER: (u128, u128) = (13, 10);
/// Gas-blowout orders fast-track through the mempool this many times.
pub const GAS_BLOWOUT_FAST_RETRIES: u32 = 2;
/// Fast-track mempool delay.
pub const FAST_TRACK_DELAY: Duration = Duration::from_secs(5);

/// Caps derived from the preliminary estimation, attached before broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasCaps {
	pub gas_limit_cap: u64,
	pub gas_price_cap: u128,
}

pub struct FulfillmentExecutor {
	wait: Duration,
	poll_interval: Duration,
}

impl FulfillmentExecutor {
	pub fn new(wait: Duration, poll_interval: Duration) -> Self {
		Self {
			wait,
			poll_interval,
		}
	}

	/// Preliminary EVM estimation: build the transaction with the dummy
	/// request, estimate gas and derive the caps. Returns `None` on
	/// Solana take chains.
	pub async fn pre_estimate(
		&self,
		take_chain: &ChainEntry,
		dummy_request: &FulfillRequest,
	) -> Result<Option<GasCaps>, ProcessError> {
		if take_chain.chain_id.engine() != ChainEngine::Evm {
			return Ok(None);
		}

		let tx = take_chain.tx_builder.build_fulfill(dummy_request).await?;
		let estimate = take_chain.client.estimate_gas(&tx).await?;
		let gas_price = take_chain.client.gas_price().await?;

		let caps = GasCaps {
			gas_limit_cap: estimate * GAS_LIMIT_MULTIPLIER.0 / GAS_LIMIT_MULTIPLIER.1,
			gas_price_cap: gas_price * GAS_PRICE_MULTIPLIER.0 / GAS_PRICE_MULTIPLIER.1,
		};
		debug!(
			estimate,
			gas_limit_cap = caps.gas_limit_cap,
			gas_price_cap = caps.gas_price_cap,
			"preliminary gas estimation done"
		);
		Ok(Some(caps))
	}

	/// Build the final transaction, enforce the caps, broadcast and wait
	/// for the fulfill to be observed on-chain.
	pub async fn execute(
		&self,
		take_chain: &ChainEntry,
		request: &FulfillRequest,
		caps: Option<GasCaps>,
	) -> Result<TransactionHash, ProcessError> {
		let mut tx = take_chain.tx_builder.build_fulfill(request).await?;

		if let Some(caps) = caps {
			let final_estimate = take_chain.client.estimate_gas(&tx).await?;
			if final_estimate > caps.gas_limit_cap {
				return Err(ProcessError::GasBlowout {
					estimated: final_estimate,
					cap: caps.gas_limit_cap,
				});
			}
			attach_gas_caps(&mut tx, caps);
		}

		let order_id = request.order.order_id;
		let hash = take_chain
			.client
			.send_transaction(tx)
			.await
			.map_err(|e| ProcessError::Broadcast(e.to_string()))?;
		info!(order_id = %order_id, tx = %hash, "fulfill broadcast");

		self.wait_for_fulfill(take_chain, &order_id).await?;
		Ok(hash)
	}

	/// Poll the take chain until the order reads as fulfilled, bounded by
	/// the configured horizon.
	async fn wait_for_fulfill(
		&self,
		take_chain: &ChainEntry,
		order_id: &OrderId,
	) -> Result<(), ProcessError> {
		let deadline = tokio::time::Instant::now() + self.wait;
		loop {
			match take_chain.client.is_order_fulfilled(order_id).await {
				Ok(true) => return Ok(()),
				Ok(false) => {}
				Err(e) => warn!(order_id = %order_id, "fulfill poll failed: {}", e),
			}
			if tokio::time::Instant::now() >= deadline {
				return Err(ProcessError::FulfillTimeout(self.wait));
			}
			tokio::time::sleep(self.poll_interval).await;
		}
	}
}

fn attach_gas_caps(tx: &mut Transaction, caps: GasCaps) {
	if let TransactionKind::Evm {
		gas_limit,
		gas_price,
		..
	} = &mut tx.kind
	{
		*gas_limit = Some(caps.gas_limit_cap);
		*gas_price = Some(caps.gas_price_cap);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::{entry_with, MockChainClient, MockTxBuilder};
	use std::sync::Arc;
	use taker_types::{Address, ChainId, ChangeRecipient, Order, TokenAmount, U256};

	fn request(order_id_byte: u8) -> FulfillRequest {
		FulfillRequest {
			order: Order {
				order_id: taker_types::OrderId([order_id_byte; 32]),
				give: TokenAmount {
					chain_id: ChainId::ETHEREUM,
					token: Address::evm([0xaa; 20]),
					amount: U256::from(100u64),
				},
				take: TokenAmount {
					chain_id: ChainId::ARBITRUM,
					token: Address::evm([0xbb; 20]),
					amount: U256::from(99u64),
				},
				receiver: Address::evm([1u8; 20]),
				maker: Address::evm([2u8; 20]),
			},
			reserve_token: Address::evm([0xbb; 20]),
			slippage_bps: 50,
			taker_address: Address::evm([3u8; 20]),
			unlock_authority: Address::evm([4u8; 20]),
			change_recipient: ChangeRecipient::Taker,
			prefer_estimation: None,
		}
	}

	fn executor() -> FulfillmentExecutor {
		FulfillmentExecutor::new(Duration::from_millis(200), Duration::from_millis(10))
	}

	#[tokio::test]
	async fn test_pre_estimate_applies_multipliers() {
		let client = Arc::new(MockChainClient::new(ChainId::ARBITRUM));
		client.set_gas_estimate(100_000);
		client.set_gas_price(10_000_000_000);
		let entry = entry_with(ChainId::ARBITRUM, client, Arc::new(MockTxBuilder::default()));

		let caps = executor()
			.pre_estimate(&entry, &request(1))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(caps.gas_limit_cap, 125_000);
		assert_eq!(caps.gas_price_cap, 13_000_000_000);
	}

	#[tokio::test]
	async fn test_pre_estimate_skipped_on_solana() {
		let client = Arc::new(MockChainClient::new(ChainId::SOLANA));
		let entry = entry_with(ChainId::SOLANA, client, Arc::new(MockTxBuilder::default()));

		let caps = executor().pre_estimate(&entry, &request(1)).await.unwrap();
		assert!(caps.is_none());
	}

	#[tokio::test]
	async fn test_gas_blowout_is_not_broadcast() {
		let client = Arc::new(MockChainClient::new(ChainId::ARBITRUM));
		// 100k at pre-estimation caps the budget at 125k; the re-estimate
		// comes back at 140k
		client.set_gas_estimate_sequence(vec![100_000, 140_000]);
		let entry = entry_with(
			ChainId::ARBITRUM,
			client.clone(),
			Arc::new(MockTxBuilder::default()),
		);

		let caps = executor()
			.pre_estimate(&entry, &request(1))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(caps.gas_limit_cap, 125_000);

		let err = executor()
			.execute(&entry, &request(1), Some(caps))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ProcessError::GasBlowout {
				estimated: 140_000,
				cap: 125_000
			}
		));
		assert_eq!(client.sent_count(), 0);
	}

	#[tokio::test]
	async fn test_execute_attaches_caps_and_waits() {
		let client = Arc::new(MockChainClient::new(ChainId::ARBITRUM));
		client.set_gas_estimate(100_000);
		client.fulfill_after_send();
		let entry = entry_with(
			ChainId::ARBITRUM,
			client.clone(),
			Arc::new(MockTxBuilder::default()),
		);

		let caps = GasCaps {
			gas_limit_cap: 125_000,
			gas_price_cap: 13_000_000_000,
		};
		let hash = executor()
			.execute(&entry, &request(1), Some(caps))
			.await
			.unwrap();
		assert!(!hash.0.is_empty());

		let sent = client.last_sent().unwrap();
		match sent.kind {
			TransactionKind::Evm {
				gas_limit,
				gas_price,
				..
			} => {
				assert_eq!(gas_limit, Some(125_000));
				assert_eq!(gas_price, Some(13_000_000_000));
			}
			_ => panic!("expected evm transaction"),
		}
	}

	#[tokio::test]
	async fn test_wait_timeout_maps_to_mempool_disposition() {
		let client = Arc::new(MockChainClient::new(ChainId::ARBITRUM));
		client.set_gas_estimate(100_000);
		// never observed fulfilled
		let entry = entry_with(
			ChainId::ARBITRUM,
			client,
			Arc::new(MockTxBuilder::default()),
		);

		let err = executor()
			.execute(&entry, &request(1), None)
			.await
			.unwrap_err();
		assert!(matches!(err, ProcessError::FulfillTimeout(_)));
		assert_eq!(err.disposition(), crate::error::Disposition::Mempool);
	}
}
