//! TTL cache over a price source.
//!
//! Shared across all pipelines; safe under concurrent read with monotonic
//! write (a stale entry is only ever replaced by a fresher one).

use crate::{PriceError, PriceSource};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taker_types::{Address, ChainId};

pub struct CachedPriceSource {
	inner: Arc<dyn PriceSource>,
	ttl: Duration,
	tokens: DashMap<(ChainId, Address), (f64, Instant)>,
	natives: DashMap<ChainId, (f64, Instant)>,
}

impl CachedPriceSource {
	pub fn new(inner: Arc<dyn PriceSource>, ttl: Duration) -> Self {
		Self {
			inner,
			ttl,
			tokens: DashMap::new(),
			natives: DashMap::new(),
		}
	}
}

#[async_trait]
impl PriceSource for CachedPriceSource {
	async fn token_price_usd(&self, chain_id: ChainId, token: &Address) -> Result<f64, PriceError> {
		let key = (chain_id, token.clone());
		if let Some(entry) = self.tokens.get(&key) {
			let (price, fetched_at) = *entry;
			if fetched_at.elapsed() < self.ttl {
				return Ok(price);
			}
		}
		let price = self.inner.token_price_usd(chain_id, token).await?;
		self.tokens.insert(key, (price, Instant::now()));
		Ok(price)
	}

	async fn native_price_usd(&self, chain_id: ChainId) -> Result<f64, PriceError> {
		if let Some(entry) = self.natives.get(&chain_id) {
			let (price, fetched_at) = *entry;
			if fetched_at.elapsed() < self.ttl {
				return Ok(price);
			}
		}
		let price = self.inner.native_price_usd(chain_id).await?;
		self.natives.insert(chain_id, (price, Instant::now()));
		Ok(price)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct CountingSource {
		calls: AtomicUsize,
	}

	#[async_trait]
	impl PriceSource for CountingSource {
		async fn token_price_usd(&self, _: ChainId, _: &Address) -> Result<f64, PriceError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Ok(2.0)
		}

		async fn native_price_usd(&self, _: ChainId) -> Result<f64, PriceError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Ok(3_000.0)
		}
	}

	#[tokio::test]
	async fn test_caches_within_ttl() {
		let inner = Arc::new(CountingSource {
			calls: AtomicUsize::new(0),
		});
		let cached = CachedPriceSource::new(inner.clone(), Duration::from_secs(60));
		let token = Address::evm([1u8; 20]);

		for _ in 0..5 {
			let price = cached
				.token_price_usd(ChainId::ETHEREUM, &token)
				.await
				.unwrap();
			assert_eq!(price, 2.0);
		}
		assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_expired_entry_refetches() {
		let inner = Arc::new(CountingSource {
			calls: AtomicUsize::new(0),
		});
		let cached = CachedPriceSource::new(inner.clone(), Duration::ZERO);
		let token = Address::evm([1u8; 20]);

		cached
			.token_price_usd(ChainId::ETHEREUM, &token)
			.await
			.unwrap();
		cached
			.token_price_usd(ChainId::ETHEREUM, &token)
			.await
			.unwrap();
		assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
	}
}
