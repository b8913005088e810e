// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{AppSpec, ConfigFile};
use crate::config::validate::validate_config;
use crate::errors::{ProcwardenError, Result};

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV: &str = "PROCWARDEN_CONFIG";

/// Load a configuration file from a given path and return the raw `ConfigFile`.
///
/// This only performs TOML deserialization (which already rejects duplicate
/// keys, unknown `exec_mode`s and malformed sizes/durations); it does **not**
/// perform semantic validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        ProcwardenError::ConfigError(format!("reading config file at {:?}: {e}", path))
    })?;

    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file from path, resolve it and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Resolves `script`, `cwd` and the log paths against the absolute
///   directory that contains the config file.
/// - Validates the result (see [`validate_config`]).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Vec<AppSpec>> {
    let path = path.as_ref();
    let config = load_from_path(path)?;

    let base_dir = config_base_dir(path);
    let base_dir = if base_dir.is_absolute() {
        base_dir
    } else {
        std::env::current_dir()?.join(base_dir)
    };

    validate_config(&config, &base_dir)
}

/// Directory relative paths in the config are resolved against.
pub fn config_base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Helper to resolve a default config path.
///
/// `PROCWARDEN_CONFIG` if set, else `Procwarden.toml` in the current
/// working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Procwarden.toml"))
}
