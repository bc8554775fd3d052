//! Runtime configuration (environment-driven).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Tunables for the reservation and ledger subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Hold window applied when the caller does not pass one.
    pub reservation_ttl: Duration,
    /// Longest hold window a caller may ask for.
    pub max_reservation_ttl: Duration,
    /// Expiry Sweeper period.
    pub sweep_interval: Duration,
    pub retry: RetryPolicy,
    /// Default page size for movement history.
    pub history_limit: usize,
    /// How far ahead batch expiry alerts look.
    pub batch_expiry_window: Duration,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::from_secs(15 * 60),
            max_reservation_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            history_limit: 50,
            batch_expiry_window: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl InventoryConfig {
    /// Defaults overridden by `TILESTOCK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`InventoryConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(secs) = parse::<u64, _>(&lookup, "TILESTOCK_RESERVATION_TTL_SECS")? {
            cfg.reservation_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "TILESTOCK_MAX_RESERVATION_TTL_SECS")? {
            cfg.max_reservation_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "TILESTOCK_SWEEP_INTERVAL_SECS")? {
            cfg.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(n) = parse::<u32, _>(&lookup, "TILESTOCK_RETRY_MAX_ATTEMPTS")? {
            cfg.retry.max_attempts = n;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "TILESTOCK_RETRY_BASE_DELAY_MS")? {
            cfg.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "TILESTOCK_RETRY_MAX_DELAY_MS")? {
            cfg.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse::<usize, _>(&lookup, "TILESTOCK_HISTORY_LIMIT")? {
            cfg.history_limit = n;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, value: String| Err(ConfigError::Invalid { key, value });

        if self.reservation_ttl.is_zero() {
            return invalid("TILESTOCK_RESERVATION_TTL_SECS", "0".into());
        }
        if self.max_reservation_ttl < self.reservation_ttl {
            return invalid(
                "TILESTOCK_MAX_RESERVATION_TTL_SECS",
                self.max_reservation_ttl.as_secs().to_string(),
            );
        }
        if self.sweep_interval.is_zero() {
            return invalid("TILESTOCK_SWEEP_INTERVAL_SECS", "0".into());
        }
        if self.retry.max_attempts == 0 {
            return invalid("TILESTOCK_RETRY_MAX_ATTEMPTS", "0".into());
        }
        if self.history_limit == 0 {
            return invalid("TILESTOCK_HISTORY_LIMIT", "0".into());
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
