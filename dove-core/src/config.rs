//! Configuration loading for the Dove client.
//!
//! Loaded from TOML; every section is required. `DoveConfig::default_devnet()`
//! holds the defaults used by tests and the inspector.

use crate::error::ConfigError;
use crate::identity::{AccountKey, DOVE_PROGRAM_ID};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DOVE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DoveConfig {
    pub program_id: AccountKey,
    /// Serve every cache from its deterministic mock instead of the network.
    pub mock_backend: bool,
    pub oracle_max_age_secs: u64,
    pub rpc: RpcConfig,
    pub confirmation: ConfirmationConfig,
    pub amounts: AmountPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcConfig {
    pub url: String,
    pub request_timeout_ms: u64,
    pub commitment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmationConfig {
    pub poll_interval_ms: u64,
}

/// Amount-safety policy applied when composing transactions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmountPolicy {
    /// A repay that leaves less than this much debt is treated as a full repay.
    pub full_repay_threshold: f64,
    /// Amount submitted for a full repay; the program caps it at the actual debt.
    pub full_repay_sentinel: f64,
    /// Clamp requested amounts to what the snapshot shows is available.
    pub clamp_to_available: bool,
}

impl Default for AmountPolicy {
    fn default() -> Self {
        Self {
            full_repay_threshold: 0.02,
            full_repay_sentinel: 1e12,
            clamp_to_available: true,
        }
    }
}

impl DoveConfig {
    /// Load from the path given by `--config` or `DOVE_CONFIG`, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn default_devnet() -> Self {
        Self {
            program_id: DOVE_PROGRAM_ID,
            mock_backend: false,
            oracle_max_age_secs: 60,
            rpc: RpcConfig {
                url: "https://api.devnet.solana.com".to_string(),
                request_timeout_ms: 30_000,
                commitment: "confirmed".to_string(),
            },
            confirmation: ConfirmationConfig {
                poll_interval_ms: 1_000,
            },
            amounts: AmountPolicy::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.request_timeout_ms)
    }

    pub fn oracle_max_age(&self) -> Duration {
        Duration::from_secs(self.oracle_max_age_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.rpc.url.trim();
        if url.is_empty() {
            return Err(invalid("rpc.url", &self.rpc.url, "must not be empty"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("rpc.url", &self.rpc.url, "must be an http(s) url"));
        }
        if self.rpc.request_timeout_ms == 0 {
            return Err(invalid("rpc.request_timeout_ms", "0", "must be > 0"));
        }
        if !matches!(
            self.rpc.commitment.as_str(),
            "processed" | "confirmed" | "finalized"
        ) {
            return Err(invalid(
                "rpc.commitment",
                &self.rpc.commitment,
                "must be processed, confirmed or finalized",
            ));
        }
        if self.confirmation.poll_interval_ms == 0 {
            return Err(invalid("confirmation.poll_interval_ms", "0", "must be > 0"));
        }
        if self.oracle_max_age_secs == 0 {
            return Err(invalid("oracle_max_age_secs", "0", "must be > 0"));
        }
        let policy = &self.amounts;
        if !(policy.full_repay_threshold.is_finite() && policy.full_repay_threshold >= 0.0) {
            return Err(invalid(
                "amounts.full_repay_threshold",
                &policy.full_repay_threshold.to_string(),
                "must be a finite, non-negative number",
            ));
        }
        if !(policy.full_repay_sentinel.is_finite() && policy.full_repay_sentinel > 0.0) {
            return Err(invalid(
                "amounts.full_repay_sentinel",
                &policy.full_repay_sentinel.to_string(),
                "must be a finite, positive number",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
