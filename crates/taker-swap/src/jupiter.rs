//! Jupiter aggregation API connector for Solana.

use crate::{format_token, parse_amount, SwapConnector, SwapError, SwapEstimation, SwapRequest};
use async_trait::async_trait;
use std::time::Duration;
use taker_types::ChainEngine;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://quote-api.jup.ag/v6";

pub struct JupiterConnector {
	client: reqwest::Client,
	base_url: String,
}

impl JupiterConnector {
	pub fn new() -> Result<Self, SwapError> {
		Self::with_base_url(DEFAULT_BASE_URL.to_string())
	}

	pub fn with_base_url(base_url: String) -> Result<Self, SwapError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(10))
			.build()
			.map_err(|e| SwapError::Http(e.to_string()))?;
		Ok(Self { client, base_url })
	}
}

#[async_trait]
impl SwapConnector for JupiterConnector {
	fn engine(&self) -> ChainEngine {
		ChainEngine::Solana
	}

	async fn quote(&self, request: SwapRequest) -> Result<SwapEstimation, SwapError> {
		let url = format!("{}/quote", self.base_url);
		debug!(amount_in = %request.amount_in, "requesting jupiter quote");

		let response = self
			.client
			.get(&url)
			.query(&[
				("inputMint", format_token(request.chain_id, &request.token_in)),
				("outputMint", format_token(request.chain_id, &request.token_out)),
				("amount", request.amount_in.to_string()),
				("slippageBps", request.slippage_bps.to_string()),
			])
			.send()
			.await
			.map_err(|e| SwapError::Http(e.to_string()))?;
		if !response.status().is_success() {
			return Err(SwapError::Http(format!(
				"jupiter returned status {}",
				response.status()
			)));
		}

		let route: serde_json::Value = response
			.json()
			.await
			.map_err(|e| SwapError::InvalidResponse(e.to_string()))?;
		let amount_out = route
			.get("outAmount")
			.and_then(|v| v.as_str())
			.ok_or_else(|| SwapError::InvalidResponse("missing outAmount".to_string()))
			.and_then(parse_amount)?;

		Ok(SwapEstimation {
			request,
			amount_out,
			route,
			fetched_at: chrono::Utc::now(),
		})
	}
}
