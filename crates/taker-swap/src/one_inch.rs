//! 1inch aggregation API connector for EVM chains.

use crate::{format_token, parse_amount, SwapConnector, SwapError, SwapEstimation, SwapRequest};
use async_trait::async_trait;
use std::time::Duration;
use taker_types::ChainEngine;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.1inch.dev/swap/v6.0";

pub struct OneInchConnector {
	client: reqwest::Client,
	base_url: String,
	api_key: Option<String>,
}

impl OneInchConnector {
	pub fn new(api_key: Option<String>) -> Result<Self, SwapError> {
		Self::with_base_url(DEFAULT_BASE_URL.to_string(), api_key)
	}

	pub fn with_base_url(base_url: String, api_key: Option<String>) -> Result<Self, SwapError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(10))
			.build()
			.map_err(|e| SwapError::Http(e.to_string()))?;
		Ok(Self {
			client,
			base_url,
			api_key,
		})
	}
}

#[async_trait]
impl SwapConnector for OneInchConnector {
	fn engine(&self) -> ChainEngine {
		ChainEngine::Evm
	}

	async fn quote(&self, request: SwapRequest) -> Result<SwapEstimation, SwapError> {
		let url = format!("{}/{}/quote", self.base_url, request.chain_id);
		debug!(
			chain = %request.chain_id,
			amount_in = %request.amount_in,
			"requesting 1inch quote"
		);

		let mut builder = self.client.get(&url).query(&[
			("src", format_token(request.chain_id, &request.token_in)),
			("dst", format_token(request.chain_id, &request.token_out)),
			("amount", request.amount_in.to_string()),
		]);
		if let Some(key) = &self.api_key {
			builder = builder.bearer_auth(key);
		}

		let response = builder
			.send()
			.await
			.map_err(|e| SwapError::Http(e.to_string()))?;
		if !response.status().is_success() {
			return Err(SwapError::Http(format!(
				"1inch returned status {}",
				response.status()
			)));
		}

		let route: serde_json::Value = response
			.json()
			.await
			.map_err(|e| SwapError::InvalidResponse(e.to_string()))?;
		let amount_out = route
			.get("dstAmount")
			.and_then(|v| v.as_str())
			.ok_or_else(|| SwapError::InvalidResponse("missing dstAmount".to_string()))
			.and_then(parse_amount)?;

		Ok(SwapEstimation {
			request,
			amount_out,
			route,
			fetched_at: chrono::Utc::now(),
		})
	}
}
