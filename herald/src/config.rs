//! Locating and parsing the RON configuration file.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::controller::Herald;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "HERALD_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HERALD_CONFIG points to non-existent file: {}", .0.display())]
    MissingEnvPath(PathBuf),

    #[error(
        "No configuration file found. Tried:\n  - HERALD_CONFIG environment variable\n{}",
        format_paths(.0)
    )]
    NotFound(Vec<PathBuf>),

    #[error("Failed to read config from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| format!("  - {}", path.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The fallback locations, in order of precedence.
#[must_use]
pub fn default_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./herald.config.ron"),
        PathBuf::from("/etc/herald/herald.config.ron"),
    ]
}

/// Find the configuration file using the following precedence:
/// 1. `HERALD_CONFIG` environment variable
/// 2. ./herald.config.ron (current working directory)
/// 3. /etc/herald/herald.config.ron (system-wide config)
///
/// # Errors
///
/// Returns an error if `HERALD_CONFIG` names a missing file, or if none of
/// the default locations exist.
pub fn find_config_file() -> Result<PathBuf, ConfigError> {
    locate(std::env::var(CONFIG_ENV).ok(), &default_paths())
}

/// [`find_config_file`] with the environment value and fallbacks supplied.
///
/// # Errors
///
/// See [`find_config_file`].
pub fn locate(env_path: Option<String>, defaults: &[PathBuf]) -> Result<PathBuf, ConfigError> {
    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::MissingEnvPath(path));
    }

    defaults
        .iter()
        .find(|path| path.exists())
        .cloned()
        .ok_or_else(|| ConfigError::NotFound(defaults.to_vec()))
}

/// Parse a configuration document.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if `content` is not a valid configuration.
pub fn from_ron(content: &str) -> Result<Herald, ConfigError> {
    Ok(ron::from_str(content)?)
}

/// Read and parse the configuration file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn from_path(path: &Path) -> Result<Herald, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    from_ron(&content)
}

/// Locate, read and parse the configuration file.
///
/// # Errors
///
/// Returns an error if no file is found or it cannot be read or parsed.
pub fn load() -> Result<Herald, ConfigError> {
    from_path(&find_config_file()?)
}
