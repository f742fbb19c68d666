//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let map_id = config.source.map_id.as_deref().unwrap_or("");
    let url_template = config.source.url_template.as_deref().unwrap_or("");

    format!(
        r#"[source]
; Endpoint prefix that tile URLs are built from
base_url = {}
; Map or asset id (can also be passed on the command line)
map_id = {}
; Optional URL layout. Placeholders: {{base}} {{map_id}} {{z}} {{x}} {{y}}
; If empty, defaults to {{base}}/{{map_id}}/tiles/{{z}}/{{x}}/{{y}}
url_template = {}
; Deepest zoom level requested from the service (0-31)
max_zoom = {}

[scheduler]
; Simultaneous tile fetches (default: 8)
max_concurrent = {}
; Attempts per tile including the first; 1 disables retry (default: 3)
max_attempts = {}
; Delay after the first failed attempt, in milliseconds (default: 200)
initial_delay_ms = {}
; Upper bound on any single backoff delay, in milliseconds (default: 10000)
max_delay_ms = {}
; Growth factor between successive delays; must exceed 1 + jitter (default: 2.0)
multiplier = {}
; Random extra added to each delay as a fraction of it, 0.0 to below 1.0 (default: 0.25)
jitter = {}

[http]
; Per-request timeout in seconds (default: 30)
timeout_secs = {}

[logging]
; Directory for the log file; ~ is expanded to the home directory
directory = {}
; Log file name (default: eetile.log)
file = {}
"#,
        config.source.base_url,
        map_id,
        url_template,
        config.source.max_zoom,
        config.scheduler.max_concurrent,
        config.scheduler.max_attempts,
        config.scheduler.initial_delay_ms,
        config.scheduler.max_delay_ms,
        format_float(config.scheduler.multiplier),
        format_float(config.scheduler.jitter),
        config.http.timeout_secs,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

/// Float formatting that always keeps a decimal point (`2` → `2.0`).
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// Convert path to string, replacing home directory with ~.
pub(super) fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
