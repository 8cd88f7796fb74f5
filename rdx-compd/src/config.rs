//! Defines all configuration structures for the competition daemon.
//!
//! Settings come from an optional TOML file, overridden by `COMPD_`-prefixed
//! environment variables (nested keys separated by `__`, for example
//! `COMPD_TIMING__LIVE=150`). Every field has a default, so an empty or missing
//! file yields a working configuration.

use crate::components::phase::MatchTiming;
use crate::error::Result;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// The top-level configuration shared by every controller.
#[derive(Debug, Clone, Deserialize)]
pub struct CompdConfig {
    /// Durations of the match phases.
    #[serde(default)]
    pub timing: MatchTiming,

    /// How often controllers tick. The state controller publishes one
    /// heartbeat per tick.
    #[serde(default = "default_resolution")]
    pub resolution: ClockResolution,

    /// Seconds between `controller.<name>.heartbeat` liveness reports.
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,

    #[serde(default)]
    pub store: StoreConfig,

    /// Zone used when rendering wall-clock times in logs. IANA names, e.g.
    /// "Europe/London".
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// Whether `panic-over` restarts the competition clock or leaves it for
    /// an explicit `unpause`.
    #[serde(default = "default_panic_over_resumes")]
    pub panic_over_resumes: bool,
}

/// Defines the tick speed of the controller loops.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockResolution {
    /// 4 ticks per second.
    High,
    /// 2 ticks per second.
    Medium,
    /// 1 tick per second.
    Low,
    /// A user-defined speed in ticks per second.
    Custom { ticks_per_second: u64 },
}

impl ClockResolution {
    pub fn period(&self) -> Duration {
        match self {
            ClockResolution::High => Duration::from_millis(250),
            ClockResolution::Medium => Duration::from_millis(500),
            ClockResolution::Low => Duration::from_secs(1),
            ClockResolution::Custom { ticks_per_second } => {
                Duration::from_nanos(1_000_000_000 / (*ticks_per_second).max(1))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

// --- Default value functions for serde ---

fn default_resolution() -> ClockResolution {
    ClockResolution::Low
}

fn default_liveness_interval() -> u64 {
    4
}

fn default_timezone() -> Tz {
    Tz::UTC
}

fn default_panic_over_resumes() -> bool {
    true
}

fn default_redis_url() -> String {
    "redis://127.0.0.1/".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
        }
    }
}

impl Default for CompdConfig {
    fn default() -> Self {
        Self {
            timing: MatchTiming::default(),
            resolution: default_resolution(),
            liveness_interval_secs: default_liveness_interval(),
            store: StoreConfig::default(),
            timezone: default_timezone(),
            panic_over_resumes: default_panic_over_resumes(),
        }
    }
}

impl CompdConfig {
    /// Loads the configuration from `path` (or `compd.toml` in the working
    /// directory, if present) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("compd").required(false),
        };
        let config: CompdConfig = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("COMPD").separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        let timing = &self.timing;
        if [timing.enter, timing.boot, timing.live, timing.settle]
            .iter()
            .any(|duration| *duration <= 0)
        {
            return Err(ConfigError::Message(format!(
                "match phase durations must be positive, got {timing:?}"
            )));
        }
        if self.liveness_interval_secs == 0 {
            return Err(ConfigError::Message(
                "liveness_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> std::result::Result<CompdConfig, ConfigError> {
        let config: CompdConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.timing, MatchTiming::default());
        assert_eq!(config.resolution, ClockResolution::Low);
        assert_eq!(config.liveness_interval(), Duration::from_secs(4));
        assert_eq!(config.timezone, Tz::UTC);
        assert!(config.panic_over_resumes);
    }

    #[test]
    fn overrides_from_toml() {
        let config = parse(
            r#"
            timezone = "Europe/London"
            panic_over_resumes = false

            [timing]
            live = 150

            [resolution.custom]
            ticks_per_second = 20

            [store]
            redis_url = "redis://arena.local/"
            "#,
        )
        .unwrap();
        assert_eq!(config.timing.live, 150);
        assert_eq!(config.timing.enter, 90);
        assert_eq!(config.resolution.period(), Duration::from_millis(50));
        assert_eq!(config.timezone, Tz::Europe__London);
        assert_eq!(config.store.redis_url, "redis://arena.local/");
        assert!(!config.panic_over_resumes);
    }

    #[test]
    fn rejects_non_positive_durations() {
        assert!(parse("[timing]\nboot = 0").is_err());
    }
}
