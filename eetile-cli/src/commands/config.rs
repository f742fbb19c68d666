//! Configuration management CLI commands.
//!
//! Provides `config init`, `config show`, and `config path` for creating and
//! inspecting `~/.eetile/config.ini`.

use clap::Subcommand;
use eetile::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write a config file with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { force } => run_init(force),
        ConfigCommands::Show => run_show(),
        ConfigCommands::Path => run_path(),
    }
}

/// Create the config file.
fn run_init(force: bool) -> Result<(), CliError> {
    let path = config_file_path();

    if path.exists() && !force {
        println!("Config file already exists: {}", path.display());
        println!("Use --force to overwrite it with defaults.");
        return Ok(());
    }

    ConfigFile::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Print the configuration in effect, defaults included.
fn run_show() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    print!("{}", render(&config));
    Ok(())
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

fn render(config: &ConfigFile) -> String {
    let not_set = "(not set)";
    let source = &config.source;
    let scheduler = &config.scheduler;

    let lines = [
        "[source]".to_string(),
        format!("  base_url = {}", source.base_url),
        format!("  map_id = {}", source.map_id.as_deref().unwrap_or(not_set)),
        format!(
            "  url_template = {}",
            source.url_template.as_deref().unwrap_or(not_set)
        ),
        format!("  max_zoom = {}", source.max_zoom),
        String::new(),
        "[scheduler]".to_string(),
        format!("  max_concurrent = {}", scheduler.max_concurrent),
        format!("  max_attempts = {}", scheduler.max_attempts),
        format!("  initial_delay_ms = {}", scheduler.initial_delay_ms),
        format!("  max_delay_ms = {}", scheduler.max_delay_ms),
        format!("  multiplier = {}", scheduler.multiplier),
        format!("  jitter = {}", scheduler.jitter),
        String::new(),
        "[http]".to_string(),
        format!("  timeout_secs = {}", config.http.timeout_secs),
        String::new(),
        "[logging]".to_string(),
        format!("  directory = {}", config.logging.directory.display()),
        format!("  file = {}", config.logging.file),
    ];

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
