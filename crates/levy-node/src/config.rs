//! Node configuration for the levy ledger service.
//!
//! Provides [`NodeConfig`] with defaults for data directory, logging, and the
//! numerical parameters seeded into a fresh store. The configuration can be
//! built programmatically or loaded from a TOML file plus `LEVY_*`
//! environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use levy_core::error::{ConfigError, LevyError};
use levy_core::params::NumericalParams;

/// Configuration for a ledger node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "debug", "levy_tax=trace").
    pub log_level: String,
    /// Log output format ("text" or "json").
    pub log_format: String,
    /// Parameters written to the store for keys it does not hold yet.
    pub params: NumericalParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("levy");

        Self {
            data_dir,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            params: NumericalParams::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from an optional TOML file, then apply `LEVY_*`
    /// environment variables (`LEVY_LOG_LEVEL`, `LEVY_PARAMS__POWER_DEGREE`, ...).
    ///
    /// A missing file is not an error; unset fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LevyError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading variables from `vars` instead of
    /// the process environment when given.
    pub fn load_with_env(
        path: impl AsRef<Path>,
        vars: Option<config::Map<String, String>>,
    ) -> Result<Self, LevyError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("LEVY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()
            .map_err(|e| ConfigError::Source(e.to_string()))?;

        let cfg: NodeConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Source(e.to_string()))?;
        cfg.params.validate()?;
        Ok(cfg)
    }

    /// Path to the RocksDB record directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

/// Install a global `tracing` subscriber for the given configuration.
///
/// `RUST_LOG` takes precedence over `log_level`. Fails if a subscriber is
/// already installed.
pub fn init_logging(cfg: &NodeConfig) -> Result<(), LevyError> {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    let result = if cfg.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init()
    };
    result.map_err(|e| ConfigError::Source(e.to_string()).into())
}
