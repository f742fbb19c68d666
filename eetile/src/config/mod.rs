//! User configuration stored in `~/.eetile/config.ini`.
//!
//! Missing keys fall back to the library defaults, so an empty or absent
//! file yields the same behavior as [`SourceConfig::default()`](crate::source::SourceConfig).
//!
//! # Example
//!
//! ```
//! use eetile::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! assert_eq!(config.scheduler.max_concurrent, 8);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::{DEFAULT_LOG_DIR, DEFAULT_LOG_FILE, DEFAULT_MAX_DELAY_MS};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, HttpSettings, LoggingSettings, SchedulerSettings, SourceSettings};
