//! Runtime configuration.
//!
//! Defaults are usable as-is; `from_env` overlays `INSIGHT_*` environment
//! variables on top of them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DAY_SECS: i64 = 24 * 60 * 60;

/// Default application snapshot schedule: hourly.
pub const DEFAULT_APPLICATION_SCHEDULE: &str = "0 0 * * * *";
/// Default deployment ingest schedule: every ten minutes.
pub const DEFAULT_DEPLOYMENT_SCHEDULE: &str = "0 */10 * * * *";

/// Configuration of one scheduled collector job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Tri-state enablement; `None` means disabled.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Cron expression (5-field or seconds-first 6/7-field).
    pub schedule: String,
}

impl JobConfig {
    fn with_schedule(schedule: &str) -> Self {
        Self {
            enabled: None,
            schedule: schedule.to_string(),
        }
    }

    /// Returns true only when explicitly enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled == Some(true)
    }
}

/// Storage layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of deployments per chunk.
    pub chunk_max_count: usize,
    /// Longest range accepted by deployment range queries, in seconds.
    pub max_query_range_secs: i64,
    /// Number of completed chunks kept in the read cache; 0 disables it.
    pub chunk_cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_max_count: 3000,
            max_query_range_secs: 2 * 365 * DAY_SECS,
            chunk_cache_capacity: 256,
        }
    }
}

/// Top-level configuration of the insight service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightConfig {
    /// Application snapshot job.
    pub application_collector: JobConfig,
    /// Deployment ingest job.
    pub deployment_collector: JobConfig,
    /// Page size used when listing applications.
    pub application_page_size: usize,
    /// Page size used when listing deployments.
    pub deployment_page_size: usize,
    /// Look-back window used when no milestone exists yet, in seconds.
    pub milestone_bootstrap_secs: i64,
    /// Longest window a single deployment run catches up on, in seconds.
    pub catch_up_clamp_secs: i64,
    /// Storage layer settings.
    pub store: StoreConfig,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            application_collector: JobConfig::with_schedule(DEFAULT_APPLICATION_SCHEDULE),
            deployment_collector: JobConfig::with_schedule(DEFAULT_DEPLOYMENT_SCHEDULE),
            application_page_size: 100,
            deployment_page_size: 50,
            milestone_bootstrap_secs: 60 * 60,
            catch_up_clamp_secs: 2 * DAY_SECS,
            store: StoreConfig::default(),
        }
    }
}

impl InsightConfig {
    /// Loads configuration from environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed, or
    /// if the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`InsightConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(&lookup);
        let mut config = Self::default();

        config.application_collector.enabled =
            env.bool("INSIGHT_APPLICATION_COLLECTOR_ENABLED")?;
        if let Some(schedule) = env.string("INSIGHT_APPLICATION_COLLECTOR_SCHEDULE") {
            config.application_collector.schedule = schedule;
        }
        config.deployment_collector.enabled = env.bool("INSIGHT_DEPLOYMENT_COLLECTOR_ENABLED")?;
        if let Some(schedule) = env.string("INSIGHT_DEPLOYMENT_COLLECTOR_SCHEDULE") {
            config.deployment_collector.schedule = schedule;
        }
        if let Some(v) = env.parse("INSIGHT_APPLICATION_PAGE_SIZE")? {
            config.application_page_size = v;
        }
        if let Some(v) = env.parse("INSIGHT_DEPLOYMENT_PAGE_SIZE")? {
            config.deployment_page_size = v;
        }
        if let Some(v) = env.parse("INSIGHT_MILESTONE_BOOTSTRAP_SECS")? {
            config.milestone_bootstrap_secs = v;
        }
        if let Some(v) = env.parse("INSIGHT_CATCH_UP_CLAMP_SECS")? {
            config.catch_up_clamp_secs = v;
        }
        if let Some(v) = env.parse("INSIGHT_CHUNK_MAX_COUNT")? {
            config.store.chunk_max_count = v;
        }
        if let Some(v) = env.parse("INSIGHT_MAX_QUERY_RANGE_SECS")? {
            config.store.max_query_range_secs = v;
        }
        if let Some(v) = env.parse("INSIGHT_CHUNK_CACHE_CAPACITY")? {
            config.store.chunk_cache_capacity = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the collectors cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.store.chunk_max_count == 0 {
            return Err(invalid("chunk_max_count must be greater than 0"));
        }
        if self.store.max_query_range_secs <= 0 {
            return Err(invalid("max_query_range_secs must be greater than 0"));
        }
        if self.application_page_size == 0 || self.deployment_page_size == 0 {
            return Err(invalid("page sizes must be greater than 0"));
        }
        if self.milestone_bootstrap_secs < 0 {
            return Err(invalid("milestone_bootstrap_secs must not be negative"));
        }
        if self.catch_up_clamp_secs <= 0 {
            return Err(invalid("catch_up_clamp_secs must be greater than 0"));
        }
        for (name, job) in [
            ("application_collector", &self.application_collector),
            ("deployment_collector", &self.deployment_collector),
        ] {
            if job.is_enabled() {
                parse_schedule(&job.schedule)
                    .map_err(|e| invalid(&format!("{name}.schedule: {e}")))?;
            }
        }
        Ok(())
    }
}

/// Parses a cron expression, accepting the classic 5-field form.
///
/// Five-field expressions (minute first) are normalised by prefixing a `0`
/// seconds field.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the expression does not parse.
pub fn parse_schedule(expression: &str) -> Result<cron::Schedule> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    cron::Schedule::from_str(&normalized)
        .map_err(|e| Error::InvalidInput(format!("invalid cron expression '{expression}': {e}")))
}

fn invalid(message: &str) -> Error {
    Error::InvalidInput(message.to_string())
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<T>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} is invalid: {e}")))
    }

    fn bool(&self, name: &str) -> Result<Option<bool>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Ok(Some(true)),
            "false" | "0" | "no" | "n" => Ok(Some(false)),
            _ => Err(Error::InvalidInput(format!(
                "{name} must be a boolean (true/false/1/0)"
            ))),
        }
    }
}
