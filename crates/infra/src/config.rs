//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `STOCKLEDGER_MAX_ATTEMPTS` - attempts per operation on conflict (default: 5)
//! - `STOCKLEDGER_BACKOFF_MS` - base retry backoff in milliseconds (default: 2)
//! - `STOCKLEDGER_PO_PREFIX` - purchase order number prefix (default: PO)
//! - `STOCKLEDGER_SO_PREFIX` - sales order number prefix (default: SO)
//! - `STOCKLEDGER_DEFAULT_REORDER_POINT` - reorder point for products the
//!   catalog cannot resolve (default: 20)

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_catalog::DEFAULT_REORDER_POINT;

use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables shared by the ledger and both workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub purchase_order_prefix: String,
    pub sales_order_prefix: String,
    pub default_reorder_point: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 2,
            purchase_order_prefix: "PO".to_string(),
            sales_order_prefix: "SO".to_string(),
            default_reorder_point: DEFAULT_REORDER_POINT,
        }
    }
}

impl EngineConfig {
    /// Load from `STOCKLEDGER_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_attempts: parse_or(&lookup, "STOCKLEDGER_MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff_ms: parse_or(&lookup, "STOCKLEDGER_BACKOFF_MS", defaults.backoff_ms)?,
            purchase_order_prefix: lookup("STOCKLEDGER_PO_PREFIX")
                .unwrap_or(defaults.purchase_order_prefix),
            sales_order_prefix: lookup("STOCKLEDGER_SO_PREFIX")
                .unwrap_or(defaults.sales_order_prefix),
            default_reorder_point: parse_or(
                &lookup,
                "STOCKLEDGER_DEFAULT_REORDER_POINT",
                defaults.default_reorder_point,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.purchase_order_prefix.trim().is_empty() || self.sales_order_prefix.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "order number prefixes cannot be empty".to_string(),
            ));
        }
        if self.default_reorder_point < 0 {
            return Err(ConfigError::Invalid(
                "default_reorder_point cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
