//! Chain registry: per-chain configured state, built once at startup.

use crate::budget::UsdBudget;
use crate::error::ProcessError;
use crate::filters::OrderFilter;
use std::collections::HashMap;
use std::sync::Arc;
use taker_account::SignerAdapter;
use taker_chains::{ChainClient, OrderTxBuilder};
use taker_types::{Address, ChainId, ConstraintSet, DstConstraint, SrcConstraint};

/// Everything the pipeline needs to know about one configured chain.
pub struct ChainEntry {
	pub chain_id: ChainId,
	pub rpc_url: String,
	pub client: Arc<dyn ChainClient>,
	pub tx_builder: Arc<dyn OrderTxBuilder>,
	pub fulfill_signer: Arc<dyn SignerAdapter>,
	pub unlock_signer: Arc<dyn SignerAdapter>,
	pub beneficiary: Address,
	/// Contract-address overrides consumed by the injected builders.
	pub environment: HashMap<String, String>,
	/// Ascending by threshold; applied when this chain is the give chain.
	pub src_constraints: ConstraintSet<SrcConstraint>,
	/// Ascending by threshold; applied when this chain is the take chain.
	pub dst_constraints: ConstraintSet<DstConstraint>,
	pub src_filters: Vec<Arc<dyn OrderFilter>>,
	pub dst_filters: Vec<Arc<dyn OrderFilter>>,
	pub tvl_budget: UsdBudget,
	pub non_finalized_budget: UsdBudget,
	pub disabled: bool,
}

/// Read-only lookup of configured chains, alive for the process lifetime.
pub struct ChainRegistry {
	entries: HashMap<ChainId, Arc<ChainEntry>>,
}

impl ChainRegistry {
	pub fn new(entries: Vec<Arc<ChainEntry>>) -> Self {
		Self {
			entries: entries
				.into_iter()
				.map(|entry| (entry.chain_id, entry))
				.collect(),
		}
	}

	pub fn get(&self, chain_id: ChainId) -> Result<&Arc<ChainEntry>, ProcessError> {
		self.entries
			.get(&chain_id)
			.ok_or(ProcessError::UnsupportedChain(chain_id))
	}

	pub fn contains(&self, chain_id: ChainId) -> bool {
		self.entries.contains_key(&chain_id)
	}

	pub fn chain_ids(&self) -> impl Iterator<Item = ChainId> + '_ {
		self.entries.keys().copied()
	}

	pub fn enabled_chain_ids(&self) -> Vec<ChainId> {
		self.entries
			.values()
			.filter(|entry| !entry.disabled)
			.map(|entry| entry.chain_id)
			.collect()
	}

	pub fn entries(&self) -> impl Iterator<Item = &Arc<ChainEntry>> {
		self.entries.values()
	}
}
