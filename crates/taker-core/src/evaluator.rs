//! Profitability evaluation against a live swap quote.

use crate::error::ProcessError;
use std::sync::Arc;
use taker_chains::ChainClient;
use taker_pricing::UsdEstimator;
use taker_swap::{SwapEstimation, SwapRequest, SwapRouter};
use taker_types::{Address, ChainEngine, Order, TokenAmount, TokensBucket, U256};
use tracing::debug;

/// Gas units one unlock call spends on an EVM give chain.
const UNLOCK_GAS_UNITS: u64 = 300_000;
/// Gas units a preswap-and-fulfill call spends on an EVM take chain.
const FULFILL_GAS_UNITS: u64 = 400_000;
/// Flat per-transaction cost assumed on Solana.
const SOLANA_FLAT_FEE_USD: f64 = 0.05;

/// Everything one evaluation needs, passed per call.
pub struct EvaluationInput<'a> {
	pub order: &'a Order,
	pub bucket: &'a TokensBucket,
	pub give_client: &'a Arc<dyn ChainClient>,
	pub take_client: &'a Arc<dyn ChainClient>,
	/// Address of the fulfill signer; receives the swap output.
	pub taker_address: Address,
	/// Reuse a previously fetched route instead of quoting again.
	pub prefer_estimation: Option<SwapEstimation>,
}

/// The evaluator's decision and the artifacts fulfillment needs.
#[derive(Debug, Clone)]
pub struct Evaluation {
	pub reserve_token: Address,
	pub required_reserve_amount: U256,
	pub slippage_bps: u32,
	pub is_profitable: bool,
	/// Route to replay when building the fulfill transaction.
	pub estimation: Option<SwapEstimation>,
	pub give_usd: f64,
	pub take_usd: f64,
}

pub struct ProfitabilityEvaluator {
	estimator: Arc<UsdEstimator>,
	swap: Arc<SwapRouter>,
	min_profitability_bps: u32,
	batch_unlock_size: usize,
}

impl ProfitabilityEvaluator {
	pub fn new(
		estimator: Arc<UsdEstimator>,
		swap: Arc<SwapRouter>,
		min_profitability_bps: u32,
		batch_unlock_size: usize,
	) -> Self {
		Self {
			estimator,
			swap,
			min_profitability_bps,
			batch_unlock_size,
		}
	}

	/// Unlock costs amortize over a batch, except when either chain is
	/// Solana: those orders unlock one at a time.
	fn unlock_batch_size(&self, order: &Order) -> usize {
		if order.give_chain().engine() == ChainEngine::Solana
			|| order.take_chain().engine() == ChainEngine::Solana
		{
			1
		} else {
			self.batch_unlock_size
		}
	}

	pub async fn evaluate(&self, input: EvaluationInput<'_>) -> Result<Evaluation, ProcessError> {
		let order = input.order;
		let reserve_token = input
			.bucket
			.equivalent_on(order.take_chain())
			.cloned()
			.ok_or_else(|| {
				ProcessError::OrderInvalid(format!(
					"bucket has no reserve token on chain {}",
					order.take_chain()
				))
			})?;

		let give_usd = self.estimator.usd_worth(&order.give).await?;
		let take_usd = self.estimator.usd_worth(&order.take).await?;

		let unlock_cost_usd = match order.give_chain().engine() {
			ChainEngine::Evm => {
				let gas_price = input.give_client.gas_price().await?;
				let full = self
					.estimator
					.gas_cost_usd(order.give_chain(), UNLOCK_GAS_UNITS, gas_price)
					.await?;
				full / self.unlock_batch_size(order) as f64
			}
			ChainEngine::Solana => SOLANA_FLAT_FEE_USD,
		};

		let fulfill_gas_usd = match order.take_chain().engine() {
			ChainEngine::Evm => {
				let gas_price = input.take_client.gas_price().await?;
				self.estimator
					.gas_cost_usd(order.take_chain(), FULFILL_GAS_UNITS, gas_price)
					.await?
			}
			ChainEngine::Solana => SOLANA_FLAT_FEE_USD,
		};

		let (required_reserve_amount, slippage_bps, estimation) = if reserve_token
			== order.take.token
		{
			// The operator already holds the take token; no swap leg.
			(order.take.amount, 0u32, None)
		} else {
			let estimation = match input.prefer_estimation {
				Some(estimation) => estimation,
				None => {
					let probe_in = self
						.estimator
						.token_units_for_usd(order.take_chain(), &reserve_token, take_usd)
						.await?;
					self.swap
						.quote(SwapRequest {
							chain_id: order.take_chain(),
							token_in: reserve_token.clone(),
							token_out: order.take.token.clone(),
							amount_in: probe_in,
							slippage_bps: 0,
							recipient: input.taker_address.clone(),
						})
						.await?
				}
			};

			if estimation.amount_out.is_zero() {
				return Err(ProcessError::Client("swap quoted zero output".to_string()));
			}

			let (required, slippage_bps) = if estimation.amount_out >= order.take.amount {
				// Headroom between the quote and the take amount is the
				// slippage budget, less the operator margin.
				let headroom = estimation.amount_out - order.take.amount;
				let headroom_bps =
					(headroom * U256::from(10_000u64) / estimation.amount_out).to::<u64>() as u32;
				(
					estimation.request.amount_in,
					headroom_bps.saturating_sub(self.min_profitability_bps),
				)
			} else {
				// Quote came up short: scale the input so the output covers
				// the take amount at the lower bound.
				let scaled = estimation.request.amount_in * order.take.amount
					/ estimation.amount_out
					+ U256::from(1u64);
				(scaled, 0)
			};
			(required, slippage_bps, Some(estimation))
		};

		let reserve_spend_usd = self
			.estimator
			.usd_worth(&TokenAmount {
				chain_id: order.take_chain(),
				token: reserve_token.clone(),
				amount: required_reserve_amount,
			})
			.await?;
		let margin_usd = take_usd * self.min_profitability_bps as f64 / 10_000.0;
		let is_profitable =
			reserve_spend_usd + fulfill_gas_usd + unlock_cost_usd + margin_usd <= give_usd;

		debug!(
			order_id = %order.order_id,
			give_usd,
			reserve_spend_usd,
			fulfill_gas_usd,
			unlock_cost_usd,
			margin_usd,
			is_profitable,
			"profitability evaluated"
		);

		Ok(Evaluation {
			reserve_token,
			required_reserve_amount,
			slippage_bps,
			is_profitable,
			estimation,
			give_usd,
			take_usd,
		})
	}
}
