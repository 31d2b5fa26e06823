//! Agent Configuration
//!
//! Typed configuration for one node's ritual agent and its TOML codec.
//!
//! ```toml
//! [node]
//! provider = "0xaa00000000000000000000000000000000000001"
//!
//! [confirmation]
//! average_block_time_ms = 12000
//! confirmations = 2
//! ```

use ritual_core::{Address, Result, RitualError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_storage_path() -> PathBuf {
    PathBuf::from("./.ritual")
}

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Identity of this node
    pub node: NodeConfig,

    /// Receipt and confirmation waiting
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Persistence of pending actions
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log filtering
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AgentConfig {
    /// Config for `provider` with every other section defaulted.
    pub fn for_provider(provider: Address) -> Self {
        Self {
            node: NodeConfig { provider },
            confirmation: ConfirmationConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| RitualError::invalid(format!("invalid agent config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let input = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&input)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| RitualError::serialization(e.to_string()))
    }

    /// Reject values that would make the confirmation loop spin or never end.
    pub fn validate(&self) -> Result<()> {
        self.confirmation.validate()
    }
}

/// Node identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address this node participates as
    pub provider: Address,
}

/// Confirmation and receipt waiting
///
/// The overall confirmation budget is
/// `timeout_multiplier × average_block_time_ms × confirmations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Expected time between blocks
    pub average_block_time_ms: u64,
    /// Pause before the first confirmation check
    pub cooling_interval_ms: u64,
    /// Pause between polls
    pub poll_interval_ms: u64,
    /// Headroom multiplier applied to the expected confirmation time
    pub timeout_multiplier: u32,
    /// Budget for a transaction to be mined at all
    pub receipt_timeout_ms: u64,
    /// Blocks required on top of the inclusion block; 0 disables reorg checks
    pub confirmations: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            average_block_time_ms: 12_000,
            cooling_interval_ms: 1_000,
            poll_interval_ms: 1_000,
            timeout_multiplier: 3,
            receipt_timeout_ms: 120_000,
            confirmations: 0,
        }
    }
}

impl ConfirmationConfig {
    /// Budget for reaching `confirmations` blocks of depth.
    pub fn confirmations_timeout(&self, confirmations: u64) -> Duration {
        let ms = u64::from(self.timeout_multiplier)
            .saturating_mul(self.average_block_time_ms)
            .saturating_mul(confirmations);
        Duration::from_millis(ms)
    }

    /// Budget for a transaction to be mined.
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.average_block_time_ms == 0 {
            return Err(RitualError::invalid("average_block_time_ms must be non-zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(RitualError::invalid("poll_interval_ms must be non-zero"));
        }
        if self.timeout_multiplier == 0 {
            return Err(RitualError::invalid("timeout_multiplier must be non-zero"));
        }
        Ok(())
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base storage directory
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
