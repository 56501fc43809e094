//! Signing identities for the taker.
//!
//! Each configured chain carries two identities, one for fulfill
//! transactions and one for unlock authority. Private keys select their
//! engine by encoding: `0x`-prefixed hex keys are EVM, base58 keys are
//! Solana ed25519 keypairs.

use std::sync::Arc;

use async_trait::async_trait;
use taker_types::{Address, ChainEngine, Signature};
use thiserror::Error;

mod evm;
mod solana;

pub use evm::EvmWallet;
pub use solana::SolanaWallet;

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("invalid private key: {0}")]
	InvalidKey(String),
	#[error("signing failed: {0}")]
	SigningFailed(String),
}

/// The minimal signer capability the core consumes.
///
/// Engine-specific operations stay behind the concrete wallet types; the
/// pipeline only ever needs the identity's address and a signature over an
/// opaque payload.
#[async_trait]
pub trait SignerAdapter: Send + Sync {
	fn address(&self) -> Address;
	fn engine(&self) -> ChainEngine;
	async fn sign(&self, payload: &[u8]) -> Result<Signature, AccountError>;
}

/// Create a wallet from a raw configured key, selecting the engine by the
/// `0x` prefix.
pub fn create_wallet(raw_key: &str) -> Result<Arc<dyn SignerAdapter>, AccountError> {
	if raw_key.starts_with("0x") {
		Ok(Arc::new(EvmWallet::new(raw_key)?))
	} else {
		Ok(Arc::new(SolanaWallet::new(raw_key)?))
	}
}
