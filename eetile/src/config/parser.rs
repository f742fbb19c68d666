//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::Ini;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::coord::MAX_ZOOM;
use crate::source::TileUrlTemplate;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI,
/// then checks constraints that span several keys.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [source] section
    if let Some(section) = ini.section(Some("source")) {
        if let Some(v) = section.get("base_url") {
            let v = v.trim();
            if !v.is_empty() {
                config.source.base_url = v.to_string();
            }
        }
        config.source.map_id = non_empty(section.get("map_id"));
        config.source.url_template = non_empty(section.get("url_template"));
        if let Some(v) = section.get("max_zoom") {
            let zoom: u8 = parse_value("source", "max_zoom", v, "must be an integer")?;
            if zoom > MAX_ZOOM {
                return Err(invalid(
                    "source",
                    "max_zoom",
                    v,
                    &format!("must be at most {}", MAX_ZOOM),
                ));
            }
            config.source.max_zoom = zoom;
        }
    }

    // [scheduler] section
    if let Some(section) = ini.section(Some("scheduler")) {
        if let Some(v) = section.get("max_concurrent") {
            config.scheduler.max_concurrent =
                parse_value("scheduler", "max_concurrent", v, "must be a positive integer")?;
        }
        if let Some(v) = section.get("max_attempts") {
            config.scheduler.max_attempts =
                parse_value("scheduler", "max_attempts", v, "must be a positive integer")?;
        }
        if let Some(v) = section.get("initial_delay_ms") {
            config.scheduler.initial_delay_ms = parse_value(
                "scheduler",
                "initial_delay_ms",
                v,
                "must be a non-negative integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("max_delay_ms") {
            config.scheduler.max_delay_ms = parse_value(
                "scheduler",
                "max_delay_ms",
                v,
                "must be a non-negative integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("multiplier") {
            config.scheduler.multiplier =
                parse_value("scheduler", "multiplier", v, "must be a number")?;
        }
        if let Some(v) = section.get("jitter") {
            config.scheduler.jitter = parse_value("scheduler", "jitter", v, "must be a number")?;
        }
    }

    // [http] section
    if let Some(section) = ini.section(Some("http")) {
        if let Some(v) = section.get("timeout_secs") {
            config.http.timeout_secs = parse_value(
                "http",
                "timeout_secs",
                v,
                "must be a positive integer (seconds)",
            )?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section.get("directory")) {
            config.logging.directory = expand_tilde(&v);
        }
        if let Some(v) = non_empty(section.get("file")) {
            config.logging.file = v;
        }
    }

    validate(&config)?;
    Ok(config)
}

/// Checks value ranges and cross-key constraints.
pub(super) fn validate(config: &ConfigFile) -> Result<(), ConfigFileError> {
    let scheduler = &config.scheduler;

    if scheduler.max_concurrent == 0 {
        return Err(invalid(
            "scheduler",
            "max_concurrent",
            "0",
            "must be at least 1",
        ));
    }
    if scheduler.max_attempts == 0 {
        return Err(invalid("scheduler", "max_attempts", "0", "must be at least 1"));
    }
    if !(0.0..1.0).contains(&scheduler.jitter) {
        return Err(invalid(
            "scheduler",
            "jitter",
            &scheduler.jitter.to_string(),
            "must be at least 0.0 and below 1.0",
        ));
    }
    // Keeps successive backoff delays strictly increasing even with full jitter
    if scheduler.multiplier <= 1.0 + scheduler.jitter {
        return Err(invalid(
            "scheduler",
            "multiplier",
            &scheduler.multiplier.to_string(),
            &format!("must be greater than 1 + jitter ({})", 1.0 + scheduler.jitter),
        ));
    }
    if scheduler.max_delay_ms < scheduler.initial_delay_ms {
        return Err(invalid(
            "scheduler",
            "max_delay_ms",
            &scheduler.max_delay_ms.to_string(),
            "must not be below initial_delay_ms",
        ));
    }
    if !scheduler.retry_policy().delays_strictly_increase() {
        return Err(invalid(
            "scheduler",
            "max_delay_ms",
            &scheduler.max_delay_ms.to_string(),
            &format!(
                "too low for {} attempts: later retry delays would be capped to the same value",
                scheduler.max_attempts
            ),
        ));
    }
    if config.http.timeout_secs == 0 {
        return Err(invalid("http", "timeout_secs", "0", "must be at least 1"));
    }

    if let Some(template) = &config.source.url_template {
        let map_id = config.source.map_id.as_deref().unwrap_or("placeholder");
        TileUrlTemplate::with_template(template, &config.source.base_url, map_id).map_err(
            |e| invalid("source", "url_template", template, &e.to_string()),
        )?;
    }

    Ok(())
}

fn parse_value<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
