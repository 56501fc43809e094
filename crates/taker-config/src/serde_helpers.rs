//! Serde helpers for chain-id-keyed maps.
//!
//! TOML and JSON object keys are strings; these adapters bridge them to
//! numeric [`ChainId`] keys.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use taker_types::ChainId;

pub fn deserialize_chain_id_map<'de, D, V>(
	deserializer: D,
) -> Result<HashMap<ChainId, V>, D::Error>
where
	D: Deserializer<'de>,
	V: Deserialize<'de>,
{
	let raw: HashMap<String, V> = HashMap::deserialize(deserializer)?;
	raw.into_iter()
		.map(|(key, value)| {
			key.parse::<ChainId>()
				.map(|id| (id, value))
				.map_err(|e| D::Error::custom(format!("bad chain id key '{}': {}", key, e)))
		})
		.collect()
}

pub fn serialize_chain_id_map<S, V>(
	map: &HashMap<ChainId, V>,
	serializer: S,
) -> Result<S::Ok, S::Error>
where
	S: Serializer,
	V: Serialize,
{
	let raw: HashMap<String, &V> = map.iter().map(|(k, v)| (k.to_string(), v)).collect();
	raw.serialize(serializer)
}
