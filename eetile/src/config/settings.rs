//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;
use std::time::Duration;

use crate::scheduler::{RetryPolicy, SchedulerConfig};
use crate::source::SourceConfig;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Tile endpoint settings
    pub source: SourceSettings,
    /// Concurrency and retry settings
    pub scheduler: SchedulerSettings,
    /// HTTP client settings
    pub http: HttpSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Tile endpoint configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    /// Endpoint prefix
    pub base_url: String,
    /// Map or asset id; usually supplied per run
    pub map_id: Option<String>,
    /// Custom URL layout using `{base}`, `{map_id}`, `{z}`, `{x}`, `{y}`
    pub url_template: Option<String>,
    /// Deepest zoom level requested
    pub max_zoom: u8,
}

/// Request scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// Simultaneous fetches
    pub max_concurrent: usize,
    /// Attempts per fetch including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay_ms: u64,
    /// Cap on any single backoff delay
    pub max_delay_ms: u64,
    /// Growth factor between delays
    pub multiplier: f64,
    /// Random extra as a fraction of the base delay
    pub jitter: f64,
}

/// HTTP client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Directory the log file is written to
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
}

impl SchedulerSettings {
    /// Retry policy described by these settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        if self.max_attempts <= 1 {
            return RetryPolicy::None;
        }
        RetryPolicy::ExponentialBackoff {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }

    /// Scheduler configuration described by these settings.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent: self.max_concurrent,
            retry: self.retry_policy(),
        }
    }
}

impl ConfigFile {
    /// Builds a [`SourceConfig`] from the `[source]` and `[scheduler]` sections.
    ///
    /// The map id is left empty when the file does not set one; callers
    /// supply it before constructing a source.
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            base_url: self.source.base_url.clone(),
            map_id: self.source.map_id.clone().unwrap_or_default(),
            url_template: self.source.url_template.clone(),
            max_zoom: self.source.max_zoom,
            scheduler: self.scheduler.scheduler_config(),
        }
    }
}
