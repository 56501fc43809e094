//! Configuration for the taker.

mod loader;
mod serde_helpers;
mod types;

pub use loader::{load_config, ConfigLoader};
pub use types::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("config file not found: {0}")]
	FileNotFound(String),
	#[error("failed to parse config: {0}")]
	Parse(String),
	#[error("invalid configuration: {0}")]
	Validation(String),
	#[error("io error reading config: {0}")]
	Io(#[from] std::io::Error),
}
