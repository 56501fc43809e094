//! Token equivalence buckets.
//!
//! A bucket declares a set of tokens across chains equivalent for
//! reserve-currency purposes: when an order gives USDC on Ethereum and takes
//! USDC on Arbitrum, one bucket covers both legs and names the token the
//! operator holds on the destination chain.

use crate::chains::ChainId;
use crate::common::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A set of tokens declared equivalent across chains.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokensBucket {
	tokens: HashMap<ChainId, Vec<Address>>,
}

impl TokensBucket {
	pub fn new(tokens: HashMap<ChainId, Vec<Address>>) -> Self {
		Self { tokens }
	}

	/// Is this (chain, token) part of the bucket?
	pub fn contains(&self, chain_id: ChainId, token: &Address) -> bool {
		self.tokens
			.get(&chain_id)
			.map(|list| list.contains(token))
			.unwrap_or(false)
	}

	/// The reserve token this bucket names on `chain_id`, if any.
	///
	/// The first configured token on a chain is the canonical reserve.
	pub fn equivalent_on(&self, chain_id: ChainId) -> Option<&Address> {
		self.tokens.get(&chain_id).and_then(|list| list.first())
	}

	pub fn chains(&self) -> impl Iterator<Item = ChainId> + '_ {
		self.tokens.keys().copied()
	}
}

/// All configured buckets, searched in configuration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokensBucketSet {
	buckets: Vec<TokensBucket>,
}

impl TokensBucketSet {
	pub fn new(buckets: Vec<TokensBucket>) -> Self {
		Self { buckets }
	}

	/// Find the first bucket containing the give leg and naming a reserve
	/// token on the take chain.
	pub fn find(
		&self,
		give_chain: ChainId,
		give_token: &Address,
		take_chain: ChainId,
	) -> Option<&TokensBucket> {
		self.buckets
			.iter()
			.find(|b| b.contains(give_chain, give_token) && b.equivalent_on(take_chain).is_some())
	}

	/// Does any bucket cover both chains of the pair?
	pub fn covers_pair(&self, give_chain: ChainId, take_chain: ChainId) -> bool {
		self.buckets.iter().any(|b| {
			b.equivalent_on(give_chain).is_some() && b.equivalent_on(take_chain).is_some()
		})
	}

	pub fn is_empty(&self) -> bool {
		self.buckets.is_empty()
	}
}
