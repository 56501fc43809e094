//! Engine-dispatching router over the configured connectors.

use crate::{SwapConnector, SwapError, SwapEstimation, SwapRequest};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use taker_types::{ChainEngine, ChainId};
use tracing::debug;

/// Routes quote requests to the 1inch or Jupiter connector by chain engine.
///
/// Only chains explicitly enabled through [`SwapRouter::set_enabled_chains`]
/// are quotable; a disabled chain is an error, not a silent pass-through.
pub struct SwapRouter {
	evm: Arc<dyn SwapConnector>,
	solana: Arc<dyn SwapConnector>,
	enabled: RwLock<HashSet<ChainId>>,
}

impl SwapRouter {
	pub fn new(evm: Arc<dyn SwapConnector>, solana: Arc<dyn SwapConnector>) -> Self {
		Self {
			evm,
			solana,
			enabled: RwLock::new(HashSet::new()),
		}
	}

	/// Replace the enabled-chain set.
	pub fn set_enabled_chains(&self, chains: &[ChainId]) {
		let mut enabled = self.enabled.write().unwrap_or_else(|e| e.into_inner());
		*enabled = chains.iter().copied().collect();
		debug!(count = enabled.len(), "swap router enabled chains updated");
	}

	pub fn disable_chain(&self, chain_id: ChainId) {
		let mut enabled = self.enabled.write().unwrap_or_else(|e| e.into_inner());
		enabled.remove(&chain_id);
	}

	pub fn is_enabled(&self, chain_id: ChainId) -> bool {
		self.enabled
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.contains(&chain_id)
	}

	pub async fn quote(&self, request: SwapRequest) -> Result<SwapEstimation, SwapError> {
		if !request.chain_id.is_supported() {
			return Err(SwapError::UnsupportedChain(request.chain_id));
		}
		if !self.is_enabled(request.chain_id) {
			return Err(SwapError::ChainDisabled(request.chain_id));
		}
		match request.chain_id.engine() {
			ChainEngine::Evm => self.evm.quote(request).await,
			ChainEngine::Solana => self.solana.quote(request).await,
		}
	}
}
