//! EVM wallet over a locally held secp256k1 key.

use crate::{AccountError, SignerAdapter};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use taker_types::{Address, ChainEngine, Signature};

/// Local EVM wallet backed by Alloy's signer.
pub struct EvmWallet {
	signer: PrivateKeySigner,
}

impl EvmWallet {
	/// Creates a wallet from a `0x`-prefixed hex private key.
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		let stripped = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
		if stripped.len() != 64 {
			return Err(AccountError::InvalidKey(
				"EVM private key must be 64 hex characters (32 bytes)".to_string(),
			));
		}
		let signer = stripped
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(e.to_string()))?;
		Ok(Self { signer })
	}
}

#[async_trait]
impl SignerAdapter for EvmWallet {
	fn address(&self) -> Address {
		Address(self.signer.address().as_slice().to_vec())
	}

	fn engine(&self) -> ChainEngine {
		ChainEngine::Evm
	}

	async fn sign(&self, payload: &[u8]) -> Result<Signature, AccountError> {
		// EIP-191 message signing is handled inside the Alloy signer
		let signature = self
			.signer
			.sign_message(payload)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(signature.into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	#[test]
	fn test_derives_expected_address() {
		let wallet = EvmWallet::new(KEY).unwrap();
		// First anvil developer account
		assert_eq!(
			wallet.address().to_string(),
			"0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
		);
	}

	#[test]
	fn test_rejects_short_key() {
		assert!(EvmWallet::new("0xdeadbeef").is_err());
	}

	#[tokio::test]
	async fn test_signature_is_65_bytes() {
		let wallet = EvmWallet::new(KEY).unwrap();
		let sig = wallet.sign(b"order payload").await.unwrap();
		assert_eq!(sig.0.len(), 65);
	}
}
