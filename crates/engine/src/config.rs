use std::time::Duration;

use gentrack_client::DEFAULT_RECONNECT_DELAY;
use gentrack_core::lifecycle::{LifecyclePolicy, DEFAULT_EVICTION_HORIZON_SECS, DEFAULT_PENDING_TIMEOUT_SECS};

/// A configuration variable that is set but unusable.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {var}: {value:?} ({reason})")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// Session configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backend base URL, without the `/api` prefix.
    pub api_base_url: String,
    /// SQLite URL of the snapshot database.
    pub database_url: String,
    /// Row key the session's snapshot is stored under.
    pub snapshot_key: String,
    /// Period of the interval poll trigger.
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    /// Fixed delay before reconnecting the push stream.
    pub reconnect_delay: Duration,
    pub policy: LifecyclePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            database_url: "sqlite://gentrack.db?mode=rwc".into(),
            snapshot_key: "gentrack.tasks".into(),
            poll_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            policy: LifecyclePolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                          |
    /// |--------------------------|----------------------------------|
    /// | `API_BASE_URL`           | `http://localhost:8000`          |
    /// | `SNAPSHOT_DATABASE_URL`  | `sqlite://gentrack.db?mode=rwc`  |
    /// | `SNAPSHOT_KEY`           | `gentrack.tasks`                 |
    /// | `POLL_INTERVAL_SECS`     | `30`                             |
    /// | `SWEEP_INTERVAL_SECS`    | `60`                             |
    /// | `RECONNECT_DELAY_SECS`   | `5`                              |
    /// | `PENDING_TIMEOUT_SECS`   | `3600`                           |
    /// | `EVICTION_HORIZON_SECS`  | `86400`                          |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("API_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(ConfigError {
                var: "API_BASE_URL",
                value: api_base_url,
                reason: "must be an http(s) URL",
            });
        }

        let database_url = lookup("SNAPSHOT_DATABASE_URL").unwrap_or(defaults.database_url);
        let snapshot_key = lookup("SNAPSHOT_KEY")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.snapshot_key);

        let pending_timeout = secs(&lookup, "PENDING_TIMEOUT_SECS", DEFAULT_PENDING_TIMEOUT_SECS as u64)?;
        let eviction_horizon = secs(&lookup, "EVICTION_HORIZON_SECS", DEFAULT_EVICTION_HORIZON_SECS as u64)?;

        Ok(Self {
            api_base_url,
            database_url,
            snapshot_key,
            poll_interval: secs(&lookup, "POLL_INTERVAL_SECS", 30)?,
            sweep_interval: secs(&lookup, "SWEEP_INTERVAL_SECS", 60)?,
            reconnect_delay: secs(&lookup, "RECONNECT_DELAY_SECS", 5)?,
            policy: LifecyclePolicy {
                pending_timeout: to_chrono(pending_timeout),
                eviction_horizon: to_chrono(eviction_horizon),
            },
        })
    }
}

/// Parse a positive whole number of seconds.
fn secs<F>(lookup: &F, var: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(Duration::from_secs(default));
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError {
            var,
            value: raw,
            reason: "must be greater than zero",
        }),
        Ok(n) if n > i64::MAX as u64 / 1000 => Err(ConfigError {
            var,
            value: raw,
            reason: "out of range",
        }),
        Ok(n) => Ok(Duration::from_secs(n)),
        Err(_) => Err(ConfigError {
            var,
            value: raw,
            reason: "must be a whole number of seconds",
        }),
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::seconds(duration.as_secs() as i64)
}
