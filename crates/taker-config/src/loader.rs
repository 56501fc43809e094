//! Configuration loading from files and environment.

use crate::types::*;
use crate::ConfigError;
use std::path::Path;
use taker_types::{ChainEngine, ChainId};
use tracing::{debug, info};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
	/// Load configuration from file, picking the format by extension.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<TakerConfig, ConfigError> {
		let path = path.as_ref();
		info!("Loading configuration from {:?}", path);

		if !path.exists() {
			return Err(ConfigError::FileNotFound(path.display().to_string()));
		}
		let contents = std::fs::read_to_string(path)?;

		let mut config = match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Self::from_toml(&contents)?,
			Some("json") => Self::from_json(&contents)?,
			other => {
				return Err(ConfigError::Parse(format!(
					"unsupported config format: {:?}",
					other
				)))
			}
		};

		Self::apply_env_overrides(&mut config);
		Self::validate_config(&config)?;
		Ok(config)
	}

	/// Load from TOML string
	pub fn from_toml(contents: &str) -> Result<TakerConfig, ConfigError> {
		toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
	}

	/// Load from JSON string
	pub fn from_json(contents: &str) -> Result<TakerConfig, ConfigError> {
		serde_json::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
	}

	/// Apply environment variable overrides
	fn apply_env_overrides(config: &mut TakerConfig) {
		for chain in &mut config.chains {
			if let Ok(url) = std::env::var(format!("RPC_URL_{}", chain.chain)) {
				debug!("Overriding RPC URL for chain {} from environment", chain.chain);
				chain.chain_rpc = url;
			}
			if let Ok(key) = std::env::var(format!("TAKER_PRIVATE_KEY_{}", chain.chain)) {
				debug!(
					"Overriding taker private key for chain {} from environment",
					chain.chain
				);
				chain.taker_private_key = key;
			}
			if let Ok(key) = std::env::var(format!("UNLOCK_AUTHORITY_PRIVATE_KEY_{}", chain.chain))
			{
				debug!(
					"Overriding unlock authority key for chain {} from environment",
					chain.chain
				);
				chain.unlock_authority_private_key = key;
			}
		}
	}

	/// Validate configuration before anything is built from it.
	pub fn validate_config(config: &TakerConfig) -> Result<(), ConfigError> {
		if config.chains.is_empty() {
			return Err(ConfigError::Validation("no chains configured".to_string()));
		}

		if !(1..=10).contains(&config.batch_unlock_size) {
			return Err(ConfigError::Validation(format!(
				"batch_unlock_size must be within [1, 10], got {}",
				config.batch_unlock_size
			)));
		}

		if config.swap_connector != SUPPORTED_SWAP_CONNECTOR {
			return Err(ConfigError::Validation(format!(
				"custom swap connector '{}' is not supported; only '{}'",
				config.swap_connector, SUPPORTED_SWAP_CONNECTOR
			)));
		}

		if config.order_processor != UNIVERSAL_ORDER_PROCESSOR {
			return Err(ConfigError::Validation(format!(
				"unknown order processor '{}'",
				config.order_processor
			)));
		}

		let mut seen = std::collections::HashSet::new();
		for chain in &config.chains {
			if !seen.insert(chain.chain) {
				return Err(ConfigError::Validation(format!(
					"chain {} configured twice",
					chain.chain
				)));
			}
			Self::validate_chain(chain)?;
		}

		// Every served pair needs a bucket naming a reserve on both legs.
		let buckets = config.bucket_set()?;
		let enabled = config.enabled_chains();
		for give in &enabled {
			for take in &enabled {
				if give != take && !buckets.covers_pair(*give, *take) {
					return Err(ConfigError::Validation(format!(
						"no bucket covers the ({}, {}) chain pair",
						give, take
					)));
				}
			}
		}

		Ok(())
	}

	fn validate_chain(chain: &ChainSettings) -> Result<(), ConfigError> {
		let hard_cap = chain.chain.finality_hard_cap().ok_or_else(|| {
			ConfigError::Validation(format!("unsupported chain {}", chain.chain))
		})?;

		if let Some(processor) = &chain.order_processor {
			if processor != UNIVERSAL_ORDER_PROCESSOR {
				return Err(ConfigError::Validation(format!(
					"unknown order processor '{}' for chain {}",
					processor, chain.chain
				)));
			}
		}

		Self::validate_key_encoding(chain.chain, &chain.taker_private_key, "taker_private_key")?;
		Self::validate_key_encoding(
			chain.chain,
			&chain.unlock_authority_private_key,
			"unlock_authority_private_key",
		)?;
		chain.parsed_beneficiary()?;

		let src = chain.src_constraint_set()?;
		for range in src.iter() {
			if range.min_block_confirmations >= hard_cap {
				return Err(ConfigError::Validation(format!(
					"chain {} requires {} confirmations, at or above the finality cap {}",
					chain.chain, range.min_block_confirmations, hard_cap
				)));
			}
		}
		chain.dst_constraint_set()?;

		Ok(())
	}

	/// Key encoding selects the engine; it has to agree with the chain.
	fn validate_key_encoding(
		chain_id: ChainId,
		key: &str,
		field: &str,
	) -> Result<(), ConfigError> {
		let key_engine = if key.starts_with("0x") {
			ChainEngine::Evm
		} else {
			ChainEngine::Solana
		};
		if key_engine != chain_id.engine() {
			return Err(ConfigError::Validation(format!(
				"{} for chain {} is {}-encoded but the chain runs {}",
				field,
				chain_id,
				key_engine,
				chain_id.engine()
			)));
		}
		Ok(())
	}
}

/// Load configuration from standard locations.
pub fn load_config() -> Result<TakerConfig, ConfigError> {
	if let Ok(path) = std::env::var("TAKER_CONFIG_FILE") {
		return ConfigLoader::from_file(&path);
	}

	let paths = ["./taker.toml", "./config/taker.toml", "/etc/taker/taker.toml"];
	for path in &paths {
		if Path::new(path).exists() {
			return ConfigLoader::from_file(path);
		}
	}

	Err(ConfigError::FileNotFound(
		"no config file found in standard locations".to_string(),
	))
}
