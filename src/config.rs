//! Configuration file management.
//!
//! The configuration is loaded once at startup and handed to the node client, the sync driver
//! and the transaction service. Every field has a default, so a missing file or section is
//! not an error.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Complete ledger-sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
	/// Node connection settings.
	#[serde(default)]
	pub blockchain: BlockchainConfig,
	/// Database settings.
	#[serde(default)]
	pub database: DatabaseConfig,
	/// Chain parameters.
	#[serde(default)]
	pub chain: ChainConfig,
	/// Sync loop settings.
	#[serde(default)]
	pub sync: SyncConfig,
	/// Logging settings.
	#[serde(default)]
	pub logging: LoggingConfig,
}

/// Node connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainConfig {
	/// JSON-RPC endpoint of the node.
	#[serde(default = "default_endpoint")]
	pub endpoint: String,
	/// RPC user for HTTP basic auth.
	#[serde(default)]
	pub username: Option<String>,
	/// RPC password for HTTP basic auth.
	#[serde(default)]
	pub password: Option<String>,
	/// Per-request timeout in seconds.
	#[serde(default = "default_timeout")]
	pub timeout_secs: u64,
	/// Give up retrying a failing request after this many seconds.
	#[serde(default = "default_max_retry")]
	pub max_retry_secs: u64,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
	/// SQLite database file.
	#[serde(default = "default_database_path")]
	pub path: String,
}

/// Chain parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
	/// Native currency code, used for outputs and fee computation.
	#[serde(default = "default_currency")]
	pub currency: String,
	/// Decimal places of the native currency.
	#[serde(default = "default_units")]
	pub units: u32,
}

/// Sync loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
	/// Seconds between sync cycles in continuous mode.
	#[serde(default = "default_poll_interval")]
	pub poll_interval_secs: u64,
	/// Seconds to wait before retrying a failed cycle.
	#[serde(default = "default_retry_delay")]
	pub retry_delay_secs: u64,
	/// Log every Nth height while far behind the node tip.
	#[serde(default = "default_log_interval")]
	pub log_interval: u64,
	/// Refresh the mempool snapshot after every completed cycle.
	#[serde(default = "default_refresh_mempool")]
	pub refresh_mempool: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
	/// Default level: "trace" | "debug" | "info" | "warn" | "error".
	#[serde(default = "default_log_level")]
	pub level: String,
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid config file: {0}")]
	Toml(#[from] toml::de::Error),
}

// Default value functions

fn default_endpoint() -> String {
	"http://127.0.0.1:8332".to_string()
}

fn default_timeout() -> u64 {
	30
}

fn default_max_retry() -> u64 {
	60
}

fn default_database_path() -> String {
	"ledger.db".to_string()
}

fn default_currency() -> String {
	"MBC".to_string()
}

fn default_units() -> u32 {
	8
}

fn default_poll_interval() -> u64 {
	10
}

fn default_retry_delay() -> u64 {
	5
}

fn default_log_interval() -> u64 {
	100
}

fn default_refresh_mempool() -> bool {
	true
}

fn default_log_level() -> String {
	"info".to_string()
}

impl Default for BlockchainConfig {
	fn default() -> Self {
		Self {
			endpoint: default_endpoint(),
			username: None,
			password: None,
			timeout_secs: default_timeout(),
			max_retry_secs: default_max_retry(),
		}
	}
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			path: default_database_path(),
		}
	}
}

impl Default for ChainConfig {
	fn default() -> Self {
		Self {
			currency: default_currency(),
			units: default_units(),
		}
	}
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			poll_interval_secs: default_poll_interval(),
			retry_delay_secs: default_retry_delay(),
			log_interval: default_log_interval(),
			refresh_mempool: default_refresh_mempool(),
		}
	}
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: default_log_level(),
		}
	}
}

impl LedgerConfig {
	/// Load configuration from a TOML file. A missing file yields the defaults.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		if !path.exists() {
			tracing::info!("Config file {} not found, using defaults", path.display());
			return Ok(Self::default());
		}

		let content = std::fs::read_to_string(path)?;
		Self::from_toml(&content)
	}

	/// Parse configuration from TOML text.
	pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(content)?)
	}
}
