//! Solana wallet over a base58-encoded ed25519 keypair.

use crate::{AccountError, SignerAdapter};
use async_trait::async_trait;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use taker_types::{Address, ChainEngine, Signature};

/// Local Solana wallet backed by an ed25519 keypair.
pub struct SolanaWallet {
	keypair: Keypair,
}

impl SolanaWallet {
	/// Creates a wallet from a base58-encoded 64-byte keypair.
	pub fn new(base58_keypair: &str) -> Result<Self, AccountError> {
		let bytes = bs58::decode(base58_keypair)
			.into_vec()
			.map_err(|e| AccountError::InvalidKey(format!("invalid base58: {}", e)))?;
		let keypair = Keypair::from_bytes(&bytes)
			.map_err(|e| AccountError::InvalidKey(format!("invalid ed25519 keypair: {}", e)))?;
		Ok(Self { keypair })
	}
}

#[async_trait]
impl SignerAdapter for SolanaWallet {
	fn address(&self) -> Address {
		Address(self.keypair.pubkey().to_bytes().to_vec())
	}

	fn engine(&self) -> ChainEngine {
		ChainEngine::Solana
	}

	async fn sign(&self, payload: &[u8]) -> Result<Signature, AccountError> {
		let signature = self.keypair.sign_message(payload);
		Ok(Signature(signature.as_ref().to_vec()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_round_trips_generated_keypair() {
		let keypair = Keypair::new();
		let encoded = bs58::encode(keypair.to_bytes()).into_string();
		let wallet = SolanaWallet::new(&encoded).unwrap();
		assert_eq!(wallet.address().0, keypair.pubkey().to_bytes().to_vec());
	}

	#[tokio::test]
	async fn test_signature_is_64_bytes() {
		let keypair = Keypair::new();
		let encoded = bs58::encode(keypair.to_bytes()).into_string();
		let wallet = SolanaWallet::new(&encoded).unwrap();
		let sig = wallet.sign(b"unlock payload").await.unwrap();
		assert_eq!(sig.0.len(), 64);
	}

	#[test]
	fn test_rejects_truncated_keypair() {
		let short = bs58::encode([1u8; 16]).into_string();
		assert!(SolanaWallet::new(&short).is_err());
	}
}
