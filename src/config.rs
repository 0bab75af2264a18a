//! Environment-driven configuration for the harness.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::ConfigError;

/// Tuning knobs for the worker pool and queue sweeper.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Base interval a worker sleeps between poll cycles absent a trigger.
    pub worker_sleep: Duration,
    /// Lower bound of the jitter window added to `worker_sleep` (may be negative-equivalent).
    pub worker_min_jitter_secs: i64,
    /// Upper bound of the jitter window.
    pub worker_max_jitter_secs: i64,
    /// Number of long-lived worker tasks.
    pub num_workers: usize,
    /// Retry cap per event before the sweeper retires it.
    pub max_attempts: i32,
    /// Absolute age after which a live event is retired regardless of attempts.
    pub max_age: Duration,
    /// Lease length granted on each successful claim.
    pub invisibility: Duration,
    /// Channel identifiers in which a plain message is offered as a proactive prompt.
    pub proactive_prompt_channels: HashSet<String>,
}

impl HarnessConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let worker_sleep = Duration::from_secs(env_u64("WORKER_SLEEP_SECONDS", 60)?);
        let worker_min_jitter_secs = env_i64("WORKER_MIN_JITTER_SECONDS", -15)?;
        let worker_max_jitter_secs = env_i64("WORKER_MAX_JITTER_SECONDS", 15)?;
        let num_workers = env_u64("NUM_WORKERS", 5)? as usize;
        let max_attempts = env_i64("MAX_ATTEMPTS", 3)? as i32;
        let max_age = Duration::from_secs(env_u64("MAX_AGE_MINUTES", 60)? * 60);
        let invisibility = Duration::from_secs(env_u64("INVISIBILITY_MINUTES", 10)? * 60);
        let proactive_prompt_channels = std::env::var("PROACTIVE_PROMPT_CHANNELS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let config = Self {
            worker_sleep,
            worker_min_jitter_secs,
            worker_max_jitter_secs,
            num_workers,
            max_attempts,
            max_age,
            invisibility,
            proactive_prompt_channels,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_sleep.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "WORKER_SLEEP_SECONDS",
                reason: "must be greater than zero".into(),
            });
        }
        if self.worker_min_jitter_secs >= self.worker_max_jitter_secs {
            return Err(ConfigError::InvalidValue {
                name: "WORKER_MIN_JITTER_SECONDS",
                reason: "must be less than WORKER_MAX_JITTER_SECONDS".into(),
            });
        }
        if self.worker_sleep.as_secs() as i64 + self.worker_min_jitter_secs <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "WORKER_MIN_JITTER_SECONDS",
                reason: "worker_sleep + min_jitter must remain positive".into(),
            });
        }
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue {
                name: "NUM_WORKERS",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_attempts <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_ATTEMPTS",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            worker_sleep: Duration::from_secs(60),
            worker_min_jitter_secs: -15,
            worker_max_jitter_secs: 15,
            num_workers: 5,
            max_attempts: 3,
            max_age: Duration::from_secs(60 * 60),
            invisibility: Duration::from_secs(10 * 60),
            proactive_prompt_channels: HashSet::new(),
        }
    }
}

fn env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val.parse().map_err(|_| ConfigError::InvalidValue {
            name,
            reason: format!("'{val}' is not a non-negative integer"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_i64(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val.parse().map_err(|_| ConfigError::InvalidValue {
            name,
            reason: format!("'{val}' is not an integer"),
        }),
        Err(_) => Ok(default),
    }
}
