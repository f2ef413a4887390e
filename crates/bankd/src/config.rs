//! Server configuration loaded from TOML.
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration. `BANK_LISTEN` overrides the listen address after loading.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use bank_core::Money;

/// Default listen address
pub const DEFAULT_LISTEN: &str = "127.0.0.1:7878";

/// Environment variable overriding the listen address
pub const LISTEN_ENV: &str = "BANK_LISTEN";

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "BANK_CONFIG";

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    /// Address the TCP listener binds to
    pub listen: SocketAddr,

    /// Ledger snapshot file; `None` keeps the ledger in memory only
    pub snapshot_path: Option<PathBuf>,

    /// Business-rule parameters
    pub rules: RulesConfig,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            snapshot_path: None,
            rules: RulesConfig::default(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7878))
}

/// Configurable business rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Withdrawals a new savings account allows per calendar month
    pub savings_withdrawal_limit: u32,

    /// Minimum checking balance a client needs to open a credit line
    pub credit_line_checking_threshold: Money,

    /// Credit limit used when a create request names none
    pub default_credit_limit: Money,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            savings_withdrawal_limit: 5,
            credit_line_checking_threshold: Money::from_cents(100_000),
            default_credit_limit: Money::from_cents(50_000),
        }
    }
}

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid listen address {value:?}: {source}")]
    ListenAddress {
        value: String,
        source: std::net::AddrParseError,
    },
}

impl BankConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Loads configuration from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Loads from `path`, falling back to `BANK_CONFIG`, then applies
    /// environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };

        if let Ok(listen) = std::env::var(LISTEN_ENV) {
            config.set_listen(&listen)?;
        }
        Ok(config)
    }

    /// Overrides the listen address from a string.
    pub fn set_listen(&mut self, value: &str) -> Result<(), ConfigError> {
        self.listen = value.parse().map_err(|source| ConfigError::ListenAddress {
            value: value.to_string(),
            source,
        })?;
        Ok(())
    }
}
