//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use eetile::config::ConfigFileError;
use eetile::coord::CoordError;
use eetile::overlay::{OverlayError, Unavailable};
use eetile::source::{HttpError, SourceError};

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Invalid tile or geographic coordinate
    Coordinate(CoordError),
    /// Failed to create the HTTP client
    HttpClient(HttpError),
    /// Failed to create the tile source
    SourceCreation(SourceError),
    /// Failed to create the overlay
    Overlay(OverlayError),
    /// Tile could not be loaded
    TileUnavailable(Unavailable),
    /// No outcome before the deadline
    Timeout(u64),
    /// Failed to write output file
    FileWrite { path: String, error: String },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::TileUnavailable(reason) if reason.is_auth() => {
                eprintln!();
                eprintln!("The tile server rejected the access token. Make sure:");
                eprintln!("  1. The token passed via --token or EETILE_TOKEN has not expired");
                eprintln!("  2. The account can read the requested map id");
            }
            CliError::SourceCreation(SourceError::MissingMapId) => {
                eprintln!();
                eprintln!("Pass --map-id or set map_id in the [source] section of config.ini");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Coordinate(e) => write!(f, "Invalid coordinate: {}", e),
            CliError::HttpClient(e) => write!(f, "Failed to create HTTP client: {}", e),
            CliError::SourceCreation(e) => write!(f, "Failed to create tile source: {}", e),
            CliError::Overlay(e) => write!(f, "Failed to create overlay: {}", e),
            CliError::TileUnavailable(reason) => write!(f, "Tile unavailable: {}", reason),
            CliError::Timeout(secs) => write!(f, "No tile received within {}s", secs),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Coordinate(e) => Some(e),
            CliError::HttpClient(e) => Some(e),
            CliError::SourceCreation(e) => Some(e),
            CliError::Overlay(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<CoordError> for CliError {
    fn from(e: CoordError) -> Self {
        CliError::Coordinate(e)
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        CliError::SourceCreation(e)
    }
}
