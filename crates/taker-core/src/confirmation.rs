//! Confirmation-threshold policy for pre-finalized orders.
//!
//! An order announced with `Confirmed { n }` is acceptable only when `n`
//! meets the minimum confirmations of the USD range its worth falls into.
//! Worths above every configured range wait for finalization.

use taker_types::{ConstraintSet, SrcConstraint};

#[derive(Debug, Clone)]
pub enum ConfirmationVerdict {
	/// Accepted speculatively. The order counts against the non-finalized
	/// budget and must not be parked in the mempool.
	Accept { constraint: SrcConstraint },
	Reject { reason: String },
}

impl ConfirmationVerdict {
	pub fn is_accept(&self) -> bool {
		matches!(self, ConfirmationVerdict::Accept { .. })
	}
}

pub fn evaluate(
	usd_worth: f64,
	announced_confirmations: u64,
	constraints: &ConstraintSet<SrcConstraint>,
) -> ConfirmationVerdict {
	let range = match constraints.matching(usd_worth) {
		Some(range) => range,
		None => {
			return ConfirmationVerdict::Reject {
				reason: format!(
					"no confirmation range covers {:.2} usd; waiting for finalization",
					usd_worth
				),
			}
		}
	};

	if announced_confirmations < range.min_block_confirmations {
		return ConfirmationVerdict::Reject {
			reason: format!(
				"announced {} confirmations, range requires {}",
				announced_confirmations, range.min_block_confirmations
			),
		};
	}

	ConfirmationVerdict::Accept {
		constraint: range.clone(),
	}
}
