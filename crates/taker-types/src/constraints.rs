//! USD-threshold-indexed constraint ranges.
//!
//! A chain carries an ascending list of ranges keyed by an upper USD
//! threshold. A worth `w` matches the first range with
//! `previous_upper < w <= upper`; worths above the last upper threshold
//! match nothing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Who receives swap change left over from the pre-fulfill swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeRecipient {
	#[default]
	Taker,
	Maker,
}

/// Threshold-indexed bound common to both constraint kinds.
pub trait UsdRange {
	fn usd_upper_threshold(&self) -> f64;
}

/// Source-chain constraint: confirmation requirements for pre-finalized
/// orders below the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrcConstraint {
	pub usd_upper_threshold: f64,
	pub min_block_confirmations: u64,
	#[serde(default)]
	pub fulfillment_delay: Duration,
}

impl UsdRange for SrcConstraint {
	fn usd_upper_threshold(&self) -> f64 {
		self.usd_upper_threshold
	}
}

/// Destination-chain constraint: same shape without confirmations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DstConstraint {
	pub usd_upper_threshold: f64,
	#[serde(default)]
	pub fulfillment_delay: Duration,
	#[serde(default)]
	pub change_recipient: ChangeRecipient,
}

impl UsdRange for DstConstraint {
	fn usd_upper_threshold(&self) -> f64 {
		self.usd_upper_threshold
	}
}

/// An ascending, validated list of constraint ranges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintSet<T> {
	ranges: Vec<T>,
}

impl<T: UsdRange> ConstraintSet<T> {
	/// Build from ranges, enforcing a strictly ascending threshold order.
	pub fn new(ranges: Vec<T>) -> Result<Self, ConstraintError> {
		for pair in ranges.windows(2) {
			if pair[1].usd_upper_threshold() <= pair[0].usd_upper_threshold() {
				return Err(ConstraintError::NotAscending {
					lower: pair[0].usd_upper_threshold(),
					upper: pair[1].usd_upper_threshold(),
				});
			}
		}
		Ok(Self { ranges })
	}

	/// First range with `previous_upper < usd_worth <= upper`.
	pub fn matching(&self, usd_worth: f64) -> Option<&T> {
		let mut lower = 0.0f64;
		for range in &self.ranges {
			let upper = range.usd_upper_threshold();
			if usd_worth > lower && usd_worth <= upper {
				return Some(range);
			}
			lower = upper;
		}
		None
	}

	pub fn is_empty(&self) -> bool {
		self.ranges.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.ranges.iter()
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ConstraintError {
	#[error("constraint thresholds must ascend strictly: {lower} then {upper}")]
	NotAscending { lower: f64, upper: f64 },
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ranges() -> ConstraintSet<SrcConstraint> {
		ConstraintSet::new(vec![
			SrcConstraint {
				usd_upper_threshold: 1_000.0,
				min_block_confirmations: 12,
				fulfillment_delay: Duration::ZERO,
			},
			SrcConstraint {
				usd_upper_threshold: 10_000.0,
				min_block_confirmations: 32,
				fulfillment_delay: Duration::ZERO,
			},
		])
		.unwrap()
	}

	#[test]
	fn test_first_match_wins() {
		let set = ranges();
		assert_eq!(set.matching(500.0).unwrap().min_block_confirmations, 12);
		assert_eq!(set.matching(5_000.0).unwrap().min_block_confirmations, 32);
	}

	#[test]
	fn test_exactly_at_threshold_matches_lower_range() {
		// worth == upper bound belongs to the lower range: from < w <= to
		let set = ranges();
		assert_eq!(set.matching(1_000.0).unwrap().min_block_confirmations, 12);
	}

	#[test]
	fn test_above_last_threshold_matches_nothing() {
		let set = ranges();
		assert!(set.matching(10_000.01).is_none());
	}

	#[test]
	fn test_zero_worth_matches_nothing() {
		assert!(ranges().matching(0.0).is_none());
	}

	#[test]
	fn test_rejects_unsorted_ranges() {
		let result = ConstraintSet::new(vec![
			SrcConstraint {
				usd_upper_threshold: 10_000.0,
				min_block_confirmations: 32,
				fulfillment_delay: Duration::ZERO,
			},
			SrcConstraint {
				usd_upper_threshold: 1_000.0,
				min_block_confirmations: 12,
				fulfillment_delay: Duration::ZERO,
			},
		]);
		assert!(result.is_err());
	}
}
