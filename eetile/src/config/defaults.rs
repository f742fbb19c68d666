//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation. Values mirror the library defaults so an empty config file
//! behaves exactly like a source built with `SourceConfig::default()`.

use std::path::PathBuf;

use super::settings::*;
use crate::scheduler::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_JITTER, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_DELAY_SECS,
};
use crate::source::{DEFAULT_BASE_URL, DEFAULT_MAX_ZOOM, DEFAULT_TIMEOUT_SECS};

/// Default maximum backoff delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = DEFAULT_MAX_DELAY_SECS * 1000;

/// Default log directory, relative to the working directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "eetile.log";

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            source: SourceSettings {
                base_url: DEFAULT_BASE_URL.to_string(),
                map_id: None,
                url_template: None,
                max_zoom: DEFAULT_MAX_ZOOM,
            },
            scheduler: SchedulerSettings {
                max_concurrent: DEFAULT_MAX_CONCURRENT,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
                max_delay_ms: DEFAULT_MAX_DELAY_MS,
                multiplier: DEFAULT_BACKOFF_MULTIPLIER,
                jitter: DEFAULT_JITTER,
            },
            http: HttpSettings {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIR),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
