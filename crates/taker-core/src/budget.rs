//! Advisory USD budget controllers.
//!
//! Two independent controllers gate admission per take chain: one caps the
//! total value locked in outstanding fulfillments, the other caps exposure
//! to orders accepted before source-chain finality. Both are advisory; the
//! signer balance is verified separately before fulfillment.

use std::collections::HashMap;
use std::sync::Mutex;
use taker_types::OrderId;
use tracing::debug;

/// A capped sum of per-order USD contributions.
pub struct UsdBudget {
	label: &'static str,
	cap_usd: Option<f64>,
	entries: Mutex<HashMap<OrderId, f64>>,
}

impl UsdBudget {
	/// `cap_usd = None` disables the gate but keeps the bookkeeping.
	pub fn new(label: &'static str, cap_usd: Option<f64>) -> Self {
		Self {
			label,
			cap_usd,
			entries: Mutex::new(HashMap::new()),
		}
	}

	/// Reserve `usd` for the order. Re-reserving the same order replaces
	/// its previous contribution instead of double-counting.
	pub fn try_reserve(&self, order_id: OrderId, usd: f64) -> bool {
		let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
		let current: f64 = entries
			.iter()
			.filter(|(id, _)| **id != order_id)
			.map(|(_, v)| v)
			.sum();
		if let Some(cap) = self.cap_usd {
			if current + usd > cap {
				debug!(
					budget = self.label,
					in_use = current,
					requested = usd,
					cap,
					"budget reservation refused"
				);
				return false;
			}
		}
		entries.insert(order_id, usd);
		true
	}

	/// Remove the order's contribution, returning it if present.
	pub fn release(&self, order_id: &OrderId) -> Option<f64> {
		self.entries
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.remove(order_id)
	}

	pub fn in_use(&self) -> f64 {
		self.entries
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.values()
			.sum()
	}

	pub fn contains(&self, order_id: &OrderId) -> bool {
		self.entries
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.contains_key(order_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn id(byte: u8) -> OrderId {
		OrderId([byte; 32])
	}

	#[test]
	fn test_reserve_up_to_cap() {
		let budget = UsdBudget::new("tvl", Some(1_000.0));
		assert!(budget.try_reserve(id(1), 600.0));
		assert!(budget.try_reserve(id(2), 400.0));
		assert!(!budget.try_reserve(id(3), 0.01));
		assert_eq!(budget.in_use(), 1_000.0);
	}

	#[test]
	fn test_release_frees_capacity() {
		let budget = UsdBudget::new("tvl", Some(1_000.0));
		assert!(budget.try_reserve(id(1), 800.0));
		assert!(!budget.try_reserve(id(2), 300.0));
		assert_eq!(budget.release(&id(1)), Some(800.0));
		assert!(budget.try_reserve(id(2), 300.0));
	}

	#[test]
	fn test_rereserve_replaces_contribution() {
		let budget = UsdBudget::new("non_finalized", Some(1_000.0));
		assert!(budget.try_reserve(id(1), 900.0));
		// A retry of the same order re-reserves; it must not double-count.
		assert!(budget.try_reserve(id(1), 950.0));
		assert_eq!(budget.in_use(), 950.0);
	}

	#[test]
	fn test_uncapped_budget_always_reserves() {
		let budget = UsdBudget::new("tvl", None);
		assert!(budget.try_reserve(id(1), f64::MAX / 2.0));
		assert!(budget.try_reserve(id(2), f64::MAX / 2.0));
		assert!(budget.contains(&id(1)));
	}

	#[test]
	fn test_release_missing_is_none() {
		let budget = UsdBudget::new("tvl", Some(10.0));
		assert_eq!(budget.release(&id(9)), None);
	}
}
