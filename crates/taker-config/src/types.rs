//! Configuration types for the taker.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use taker_types::{
	Address, ChainEngine, ChainId, ChangeRecipient, ConstraintSet, DstConstraint, SrcConstraint,
	TokensBucket, TokensBucketSet,
};

/// The connector pairing this build ships; anything else is rejected.
pub const SUPPORTED_SWAP_CONNECTOR: &str = "1inch+jupiter";

/// The one order processor this build ships.
pub const UNIVERSAL_ORDER_PROCESSOR: &str = "universal";

/// Complete taker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TakerConfig {
	/// Order feed connection string
	pub order_feed: String,
	/// Chain configurations
	pub chains: Vec<ChainSettings>,
	/// Token equivalence buckets; values are a token string or a list
	pub buckets: Vec<BucketConfig>,
	/// Global admission filters
	#[serde(default)]
	pub filters: Vec<FilterConfig>,
	/// Minimum margin in basis points for an order to be taken
	#[serde(default = "default_min_profitability_bps")]
	pub min_profitability_bps: u32,
	/// Fulfilled orders coalesced per unlock transaction
	#[serde(default = "default_batch_unlock_size")]
	pub batch_unlock_size: usize,
	#[serde(default)]
	pub mempool: MempoolSettings,
	#[serde(default)]
	pub fulfillment: FulfillmentSettings,
	#[serde(default)]
	pub token_price_service: PriceServiceConfig,
	/// Swap connector pairing; only the default is supported
	#[serde(default = "default_swap_connector")]
	pub swap_connector: String,
	/// Order processor driving the pipeline
	#[serde(default = "default_order_processor")]
	pub order_processor: String,
	/// Named hook handlers to attach at startup
	#[serde(default)]
	pub hook_handlers: Vec<String>,
}

/// Chain-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainSettings {
	/// Chain id
	pub chain: ChainId,
	/// RPC endpoint URL
	pub chain_rpc: String,
	/// Key of the fulfill signer; `0x` hex or base58 by engine
	pub taker_private_key: String,
	/// Key of the unlock authority
	pub unlock_authority_private_key: String,
	/// Unlocked give-leg funds are sent here
	pub beneficiary: String,
	/// A disabled chain gets a blanket deny-destination filter
	#[serde(default)]
	pub disabled: bool,
	/// Per-chain processor override
	#[serde(default)]
	pub order_processor: Option<String>,
	/// Contract-address overrides
	#[serde(default)]
	pub environment: HashMap<String, String>,
	#[serde(default)]
	pub src_filters: Vec<FilterConfig>,
	#[serde(default)]
	pub dst_filters: Vec<FilterConfig>,
	/// Source-side constraints applied when this chain is the give chain
	#[serde(default)]
	pub constraints: SrcConstraintsConfig,
	/// Destination-side constraints applied when this chain is the take chain
	#[serde(default)]
	pub dst_constraints: DstConstraintsConfig,
	/// Cap on USD value locked in outstanding fulfillments
	#[serde(default)]
	pub tvl_cap_usd: Option<f64>,
	/// Cap on USD value of accepted not-yet-finalized orders
	#[serde(default)]
	pub non_finalized_cap_usd: Option<f64>,
}

/// One bucket: chain id (as map key) to one token or a list of tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BucketConfig(
	#[serde(
		deserialize_with = "crate::serde_helpers::deserialize_chain_id_map",
		serialize_with = "crate::serde_helpers::serialize_chain_id_map"
	)]
	pub HashMap<ChainId, OneOrMany>,
);

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany {
	One(String),
	Many(Vec<String>),
}

impl OneOrMany {
	pub fn as_vec(&self) -> Vec<&str> {
		match self {
			OneOrMany::One(s) => vec![s.as_str()],
			OneOrMany::Many(list) => list.iter().map(String::as_str).collect(),
		}
	}
}

/// Admission filter configurations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
	/// Only admit orders giving one of these tokens
	GiveTokenAllowlist { tokens: Vec<String> },
	/// Refuse orders taking one of these tokens
	TakeTokenDenylist { tokens: Vec<String> },
	/// Refuse orders from these makers
	MakerDenylist { makers: Vec<String> },
}

/// Source-side constraint configuration: chain defaults plus ranges.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SrcConstraintsConfig {
	#[serde(default)]
	pub fulfillment_delay_secs: Option<u64>,
	#[serde(default)]
	pub required_confirmations_thresholds: Vec<ThresholdConfig>,
}

/// Destination-side constraint configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DstConstraintsConfig {
	#[serde(default)]
	pub fulfillment_delay_secs: Option<u64>,
	#[serde(default)]
	pub pre_fulfill_swap_change_recipient: Option<ChangeRecipient>,
	#[serde(default)]
	pub per_order_value_upper_threshold: Vec<ThresholdConfig>,
}

/// One USD-indexed range.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdConfig {
	pub threshold_amount_in_usd: f64,
	#[serde(default)]
	pub min_block_confirmations: Option<u64>,
	#[serde(default)]
	pub fulfillment_delay_secs: Option<u64>,
	#[serde(default)]
	pub pre_fulfill_swap_change_recipient: Option<ChangeRecipient>,
}

/// Local retry queue settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MempoolSettings {
	#[serde(default = "default_mempool_initial_interval_secs")]
	pub initial_interval_secs: u64,
	#[serde(default = "default_mempool_max_delay_step_secs")]
	pub max_delay_step_secs: u64,
}

impl Default for MempoolSettings {
	fn default() -> Self {
		Self {
			initial_interval_secs: default_mempool_initial_interval_secs(),
			max_delay_step_secs: default_mempool_max_delay_step_secs(),
		}
	}
}

/// Fulfill broadcast and observation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FulfillmentSettings {
	/// Bounded wait for the fulfill to appear on-chain
	#[serde(default = "default_fulfill_wait_secs")]
	pub wait_secs: u64,
	#[serde(default = "default_fulfill_poll_interval_secs")]
	pub poll_interval_secs: u64,
}

impl Default for FulfillmentSettings {
	fn default() -> Self {
		Self {
			wait_secs: default_fulfill_wait_secs(),
			poll_interval_secs: default_fulfill_poll_interval_secs(),
		}
	}
}

/// Token price service selection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PriceServiceConfig {
	Coingecko {
		#[serde(default)]
		base_url: Option<String>,
	},
}

impl Default for PriceServiceConfig {
	fn default() -> Self {
		PriceServiceConfig::Coingecko { base_url: None }
	}
}

fn default_min_profitability_bps() -> u32 {
	4
}

fn default_batch_unlock_size() -> usize {
	10
}

fn default_mempool_initial_interval_secs() -> u64 {
	30
}

fn default_mempool_max_delay_step_secs() -> u64 {
	30
}

fn default_fulfill_wait_secs() -> u64 {
	120
}

fn default_fulfill_poll_interval_secs() -> u64 {
	2
}

fn default_swap_connector() -> String {
	SUPPORTED_SWAP_CONNECTOR.to_string()
}

fn default_order_processor() -> String {
	UNIVERSAL_ORDER_PROCESSOR.to_string()
}

/// Parse an address string by encoding alone, for scopes with no chain
/// context (global filter lists).
pub fn parse_address_any(raw: &str) -> Result<Address, ConfigError> {
	let bytes = if let Some(stripped) = raw.strip_prefix("0x") {
		hex::decode(stripped)
			.map_err(|e| ConfigError::Validation(format!("bad hex address '{}': {}", raw, e)))?
	} else {
		bs58::decode(raw)
			.into_vec()
			.map_err(|e| ConfigError::Validation(format!("bad base58 address '{}': {}", raw, e)))?
	};
	Ok(Address(bytes))
}

/// Parse an address string against a chain's engine.
pub fn parse_address(chain_id: ChainId, raw: &str) -> Result<Address, ConfigError> {
	let bytes = if let Some(stripped) = raw.strip_prefix("0x") {
		hex::decode(stripped)
			.map_err(|e| ConfigError::Validation(format!("bad hex address '{}': {}", raw, e)))?
	} else {
		bs58::decode(raw)
			.into_vec()
			.map_err(|e| ConfigError::Validation(format!("bad base58 address '{}': {}", raw, e)))?
	};
	let expected = match chain_id.engine() {
		ChainEngine::Evm => 20,
		ChainEngine::Solana => 32,
	};
	if bytes.len() != expected {
		return Err(ConfigError::Validation(format!(
			"address '{}' is {} bytes, chain {} expects {}",
			raw,
			bytes.len(),
			chain_id,
			expected
		)));
	}
	Ok(Address(bytes))
}

impl ChainSettings {
	pub fn parsed_beneficiary(&self) -> Result<Address, ConfigError> {
		parse_address(self.chain, &self.beneficiary)
	}

	/// Resolve source constraints with explicit precedence:
	/// range value, else chain default, else zero.
	pub fn src_constraint_set(&self) -> Result<ConstraintSet<SrcConstraint>, ConfigError> {
		let chain_delay = self.constraints.fulfillment_delay_secs.unwrap_or(0);
		let ranges = self
			.constraints
			.required_confirmations_thresholds
			.iter()
			.map(|t| SrcConstraint {
				usd_upper_threshold: t.threshold_amount_in_usd,
				min_block_confirmations: t.min_block_confirmations.unwrap_or(0),
				fulfillment_delay: Duration::from_secs(
					t.fulfillment_delay_secs.unwrap_or(chain_delay),
				),
			})
			.collect();
		ConstraintSet::new(ranges).map_err(|e| ConfigError::Validation(e.to_string()))
	}

	/// Resolve destination constraints with the same precedence.
	pub fn dst_constraint_set(&self) -> Result<ConstraintSet<DstConstraint>, ConfigError> {
		let chain_delay = self.dst_constraints.fulfillment_delay_secs.unwrap_or(0);
		let chain_recipient = self
			.dst_constraints
			.pre_fulfill_swap_change_recipient
			.unwrap_or_default();
		let ranges = self
			.dst_constraints
			.per_order_value_upper_threshold
			.iter()
			.map(|t| DstConstraint {
				usd_upper_threshold: t.threshold_amount_in_usd,
				fulfillment_delay: Duration::from_secs(
					t.fulfillment_delay_secs.unwrap_or(chain_delay),
				),
				change_recipient: t
					.pre_fulfill_swap_change_recipient
					.unwrap_or(chain_recipient),
			})
			.collect();
		ConstraintSet::new(ranges).map_err(|e| ConfigError::Validation(e.to_string()))
	}
}

impl TakerConfig {
	pub fn enabled_chains(&self) -> Vec<ChainId> {
		self.chains
			.iter()
			.filter(|c| !c.disabled)
			.map(|c| c.chain)
			.collect()
	}

	/// Materialize the bucket set, parsing token addresses per engine.
	pub fn bucket_set(&self) -> Result<TokensBucketSet, ConfigError> {
		let mut buckets = Vec::with_capacity(self.buckets.len());
		for bucket in &self.buckets {
			let mut tokens: HashMap<ChainId, Vec<Address>> = HashMap::new();
			for (chain_id, entry) in &bucket.0 {
				let parsed = entry
					.as_vec()
					.into_iter()
					.map(|raw| parse_address(*chain_id, raw))
					.collect::<Result<Vec<_>, _>>()?;
				tokens.insert(*chain_id, parsed);
			}
			buckets.push(TokensBucket::new(tokens));
		}
		Ok(TokensBucketSet::new(buckets))
	}
}
