//! Configuration for the economy core
//!
//! Deployments ship a small TOML file; everything has a working default so
//! embedding hosts can also construct the config in code and override the
//! fields they care about.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// When mutations are written back to the ledger file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Persist after every acknowledged mutation.
    WriteThrough,
    /// Mark dirty and persist from a periodic background task.
    Batched {
        #[serde(with = "humantime_serde")]
        interval: Duration,
    },
}

/// Sliding-window command throttle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Trailing window commands are counted over.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Commands allowed inside one window before the user is throttled.
    pub max_commands: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            max_commands: 5,
        }
    }
}

/// Main configuration for an [`Economy`](crate::Economy) instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Path of the persisted ledger file.
    pub ledger_path: PathBuf,
    /// Balance granted when an account is created on first sight.
    pub starting_balance: u64,
    /// Write-back policy for balance mutations.
    pub flush: FlushPolicy,
    /// Default poll interval for the ledger file watcher.
    #[serde(with = "humantime_serde")]
    pub watch_interval: Duration,
    /// Per-user command throttle.
    pub rate_limit: RateLimitConfig,
    /// Start from an empty ledger when the file on disk is unparsable.
    /// Off by default: a corrupt file aborts startup instead of silently
    /// wiping real balances.
    pub init_fresh_on_corrupt: bool,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("economy.json"),
            starting_balance: 100,
            flush: FlushPolicy::WriteThrough,
            watch_interval: Duration::from_secs(30),
            rate_limit: RateLimitConfig::default(),
            init_fresh_on_corrupt: false,
        }
    }
}

impl EconomyConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("cannot read {:?}: {}", path.as_ref(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {:?}: {}", path.as_ref(), e)))
    }

    /// Validate runtime bounds before the economy is opened.
    pub fn validate(&self) -> Result<()> {
        if self.ledger_path.as_os_str().is_empty() {
            return Err(Error::Config("ledger_path must not be empty".into()));
        }
        if self.watch_interval.is_zero() {
            return Err(Error::Config(
                "watch_interval must be greater than zero".into(),
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(Error::Config(
                "rate_limit.window must be greater than zero".into(),
            ));
        }
        if self.rate_limit.max_commands == 0 {
            return Err(Error::Config(
                "rate_limit.max_commands must be greater than zero".into(),
            ));
        }
        if let FlushPolicy::Batched { interval } = self.flush {
            if interval.is_zero() {
                return Err(Error::Config(
                    "flush.interval must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }
}
