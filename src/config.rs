//! Configuration for the recovery engine
//!
//! Supports JSON files, environment overrides and validation. Every
//! field has a production default so an empty `{}` document is valid.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Prefix for environment overrides, e.g. `LIGHTNING_RECOVERY_RTO_MINUTES`
pub const ENV_PREFIX: &str = "LIGHTNING_RECOVERY_";

/// Recovery engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Recovery time objective in minutes
    pub rto_minutes: u64,

    /// Recovery point objective in minutes
    pub rpo_minutes: u64,

    /// Interval between watchdog health polls
    pub health_check_interval_ms: u64,

    /// Let the watchdog start recovery plans on its own
    pub automatic_failover: bool,

    /// Simulated per-step delay during dry runs
    pub dry_run_step_delay_ms: u64,

    /// Upper bound for a single step procedure (none = unbounded)
    pub step_timeout_ms: Option<u64>,

    /// Fraction of failed steps above which a plan is rolled back
    pub rollback_failure_ratio: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            rto_minutes: 240, // 4 hours
            rpo_minutes: 60,
            health_check_interval_ms: 30_000,
            automatic_failover: false,
            dry_run_step_delay_ms: 100,
            step_timeout_ms: None,
            rollback_failure_ratio: 0.5,
        }
    }
}

impl RecoveryConfig {
    /// Load configuration from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: RecoveryConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LIGHTNING_RECOVERY_*` environment variables on top of this config
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_var("RTO_MINUTES") {
            self.rto_minutes = parse_env("RTO_MINUTES", &v)?;
        }
        if let Some(v) = env_var("RPO_MINUTES") {
            self.rpo_minutes = parse_env("RPO_MINUTES", &v)?;
        }
        if let Some(v) = env_var("HEALTH_CHECK_INTERVAL_MS") {
            self.health_check_interval_ms = parse_env("HEALTH_CHECK_INTERVAL_MS", &v)?;
        }
        if let Some(v) = env_var("AUTOMATIC_FAILOVER") {
            self.automatic_failover = parse_env("AUTOMATIC_FAILOVER", &v)?;
        }
        if let Some(v) = env_var("DRY_RUN_STEP_DELAY_MS") {
            self.dry_run_step_delay_ms = parse_env("DRY_RUN_STEP_DELAY_MS", &v)?;
        }
        if let Some(v) = env_var("STEP_TIMEOUT_MS") {
            self.step_timeout_ms = Some(parse_env("STEP_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = env_var("ROLLBACK_FAILURE_RATIO") {
            self.rollback_failure_ratio = parse_env("ROLLBACK_FAILURE_RATIO", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject configurations that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        if self.rto_minutes == 0 {
            return Err(Error::Config("rto_minutes must be greater than zero".into()));
        }
        if self.rpo_minutes == 0 {
            return Err(Error::Config("rpo_minutes must be greater than zero".into()));
        }
        if self.health_check_interval_ms == 0 {
            return Err(Error::Config(
                "health_check_interval_ms must be greater than zero".into(),
            ));
        }
        if self.step_timeout_ms == Some(0) {
            return Err(Error::Config("step_timeout_ms must be greater than zero".into()));
        }
        if !(self.rollback_failure_ratio > 0.0 && self.rollback_failure_ratio <= 1.0) {
            return Err(Error::Config(format!(
                "rollback_failure_ratio must be in (0, 1], got {}",
                self.rollback_failure_ratio
            )));
        }
        Ok(())
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn dry_run_step_delay(&self) -> Duration {
        Duration::from_millis(self.dry_run_step_delay_ms)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_ms.map(Duration::from_millis)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    debug!("Applying environment override {}{}={}", ENV_PREFIX, key, value);
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "Invalid value for {}{}: {}",
            ENV_PREFIX, key, value
        ))
    })
}
