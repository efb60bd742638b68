//! Workstation configuration.
//!
//! Pure data with defaults, `with_*` builders and an environment loader.
//! Nothing here touches the filesystem except resolving the default cache
//! directory.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::PersistenceTier;

/// Default number of concurrent interactive completion workers.
pub const DEFAULT_INTERACTIVE_WORKERS: usize = 4;

/// Default minimum interval between diagnostic progress events.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Environment variable names understood by [`FetcherConfig::from_env`].
pub const ENV_INTERACTIVE_WORKERS: &str = "FETCHER_INTERACTIVE_WORKERS";
pub const ENV_DEFAULT_TIER: &str = "FETCHER_DEFAULT_TIER";
pub const ENV_PROGRESS_INTERVAL_MS: &str = "FETCHER_PROGRESS_INTERVAL_MS";
pub const ENV_CACHE_DIR: &str = "FETCHER_CACHE_DIR";
pub const ENV_CANCEL_WHEN_UNOBSERVED: &str = "FETCHER_CANCEL_WHEN_UNOBSERVED";

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Could not determine a cache directory for this platform")]
    NoCacheDir,
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Configuration for the fetch workstation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Upper bound on completion pipelines running at once.
    pub interactive_workers: usize,
    /// Tier used when a caller does not name one.
    pub default_tier: PersistenceTier,
    /// Minimum interval between diagnostic progress events per transfer.
    #[serde(with = "duration_millis")]
    pub progress_event_interval: Duration,
    /// Root directory of the durable cache tier.
    pub cache_dir: Option<PathBuf>,
    /// Cancel the transport when the last caller detaches.
    pub cancel_when_unobserved: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            interactive_workers: DEFAULT_INTERACTIVE_WORKERS,
            default_tier: PersistenceTier::default(),
            progress_event_interval: DEFAULT_PROGRESS_INTERVAL,
            cache_dir: None,
            cancel_when_unobserved: true,
        }
    }
}

impl FetcherConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of completion workers (at least one).
    #[must_use]
    pub fn with_interactive_workers(mut self, workers: usize) -> Self {
        self.interactive_workers = workers.max(1);
        self
    }

    #[must_use]
    pub const fn with_default_tier(mut self, tier: PersistenceTier) -> Self {
        self.default_tier = tier;
        self
    }

    #[must_use]
    pub const fn with_progress_event_interval(mut self, interval: Duration) -> Self {
        self.progress_event_interval = interval;
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub const fn with_cancel_when_unobserved(mut self, cancel: bool) -> Self {
        self.cancel_when_unobserved = cancel;
        self
    }

    /// Load overrides from the process environment on top of defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load overrides from an arbitrary key lookup on top of defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_INTERACTIVE_WORKERS) {
            let workers: usize = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_INTERACTIVE_WORKERS, &raw, "not a number"))?;
            if workers == 0 {
                return Err(ConfigError::invalid(
                    ENV_INTERACTIVE_WORKERS,
                    &raw,
                    "must be at least 1",
                ));
            }
            config.interactive_workers = workers;
        }

        if let Some(raw) = lookup(ENV_DEFAULT_TIER) {
            config.default_tier = PersistenceTier::parse(&raw).ok_or_else(|| {
                ConfigError::invalid(ENV_DEFAULT_TIER, &raw, "expected memory or durable")
            })?;
        }

        if let Some(raw) = lookup(ENV_PROGRESS_INTERVAL_MS) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_PROGRESS_INTERVAL_MS, &raw, "not a number"))?;
            config.progress_event_interval = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup(ENV_CACHE_DIR) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                config.cache_dir = Some(PathBuf::from(trimmed));
            }
        }

        if let Some(raw) = lookup(ENV_CANCEL_WHEN_UNOBSERVED) {
            config.cancel_when_unobserved = parse_bool(&raw).ok_or_else(|| {
                ConfigError::invalid(ENV_CANCEL_WHEN_UNOBSERVED, &raw, "expected true or false")
            })?;
        }

        Ok(config)
    }

    /// The configured cache directory, or the platform default
    /// (`<cache dir>/fetcher`).
    pub fn resolved_cache_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|dir| dir.join("fetcher"))
            .ok_or(ConfigError::NoCacheDir)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
