//! Configuration file location, TOML loading and secret resolution
//!
//! Config file priority order:
//! 1. Command-line argument (highest priority)
//! 2. `SCORELINE_CONFIG` environment variable
//! 3. Platform config directory (`<config dir>/scoreline/scoreline.toml`)
//! 4. Built-in defaults (a missing file is not fatal)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SCORELINE_CONFIG";

/// Config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "scoreline.toml";

/// Logging section shared by every binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Locate the config file following the priority order above.
///
/// Returns `None` when neither an explicit path nor a platform default exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("scoreline").join(CONFIG_FILE_NAME))
        .filter(|p| p.exists())
}

/// Load a TOML config file, falling back to defaults when `path` is `None`
/// or points at a file that does not exist.
///
/// A file that exists but cannot be parsed is an error.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, using built-in defaults"
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Resolve a secret (bearer token) from 3-tier configuration
///
/// **Priority:** CLI → ENV → TOML
///
/// Warns when the secret is present in more than one source.
pub fn resolve_secret(
    name: &str,
    cli_value: Option<&str>,
    env_var: &str,
    toml_value: Option<&str>,
) -> Result<String> {
    let env_value = std::env::var(env_var).ok();

    let candidates = [
        ("command line", cli_value),
        ("environment", env_value.as_deref()),
        ("TOML", toml_value),
    ];

    let sources: Vec<&str> = candidates
        .iter()
        .filter(|(_, v)| v.is_some_and(is_valid_key))
        .map(|(source, _)| *source)
        .collect();

    if sources.len() > 1 {
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            name,
            sources.join(", "),
            sources[0]
        );
    }

    for (source, value) in candidates {
        if let Some(value) = value.filter(|v| is_valid_key(v)) {
            info!("{} loaded from {}", name, source);
            return Ok(value.trim().to_string());
        }
    }

    Err(Error::Config(format!(
        "{} not configured. Provide it with one of:\n\
         1. Command line flag\n\
         2. Environment: {}=your-token\n\
         3. TOML config file",
        name, env_var
    )))
}

/// Validate a secret (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
