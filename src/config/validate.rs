// src/config/validate.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::model::{AppSpec, ConfigFile, ExecMode};
use crate::errors::{ProcwardenError, Result};

static ENV_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env key regex is valid")
});

/// Resolve every `[app.<name>]` section against `base_dir` and validate the
/// result.
///
/// This checks:
/// - there is at least one app, and app names are non-empty
/// - `instances >= 1`, and `exec_mode = "fork"` means exactly one instance
/// - `max_restarts >= 1` and `memory_check_interval > 0`
/// - `max_memory_restart`, if set, is a positive byte quantity
/// - env keys are valid identifiers, and `*_PORT` values are valid ports
/// - no two log destinations (within or across apps) are the same file
///
/// Duplicate env keys never get this far: the TOML parser rejects them.
/// Writability of the log paths is checked when they are opened at startup.
pub fn validate_config(cfg: &ConfigFile, base_dir: &Path) -> Result<Vec<AppSpec>> {
    ensure_has_apps(cfg)?;

    let apps: Vec<AppSpec> = cfg
        .app
        .iter()
        .map(|(name, app)| app.to_spec(name, base_dir))
        .collect();

    validate_apps(&apps)?;
    Ok(apps)
}

/// Validate already-resolved apps. See [`validate_config`].
pub fn validate_apps(apps: &[AppSpec]) -> Result<()> {
    for app in apps {
        validate_app(app)?;
    }
    validate_log_paths(apps)
}

fn ensure_has_apps(cfg: &ConfigFile) -> Result<()> {
    if cfg.app.is_empty() {
        return Err(ProcwardenError::ConfigError(
            "config must contain at least one [app.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_app(app: &AppSpec) -> Result<()> {
    let err = |msg: String| Err(ProcwardenError::ConfigError(msg));

    if app.name.trim().is_empty() {
        return err("app name must not be empty".to_string());
    }

    if app.instances == 0 {
        return err(format!("app '{}': instances must be >= 1 (got 0)", app.name));
    }

    if app.exec_mode == ExecMode::Fork && app.instances != 1 {
        return err(format!(
            "app '{}': exec_mode \"fork\" runs exactly one process, but instances = {}",
            app.name, app.instances
        ));
    }

    if app.restart.max_restarts == 0 {
        return err(format!("app '{}': max_restarts must be >= 1 (got 0)", app.name));
    }

    if app.memory_check_interval.is_zero() {
        return err(format!(
            "app '{}': memory_check_interval must be greater than zero",
            app.name
        ));
    }

    if let Some(limit) = app.max_memory_restart {
        if limit.as_u64() == 0 {
            return err(format!(
                "app '{}': max_memory_restart must be a positive size",
                app.name
            ));
        }
    }

    for (key, value) in &app.env {
        if !ENV_KEY.is_match(key) {
            return err(format!(
                "app '{}': invalid env key '{}' (expected letters, digits and '_')",
                app.name, key
            ));
        }
        if is_port_key(key) {
            validate_port(&app.name, key, value)?;
        }
    }

    Ok(())
}

fn is_port_key(key: &str) -> bool {
    key == "PORT" || key.ends_with("_PORT")
}

fn validate_port(app: &str, key: &str, value: &str) -> Result<()> {
    match value.trim().parse::<u32>() {
        Ok(port) if (1..=u32::from(u16::MAX)).contains(&port) => Ok(()),
        _ => Err(ProcwardenError::ConfigError(format!(
            "app '{app}': env {key} = '{value}' is not a valid port (1-65535)"
        ))),
    }
}

fn validate_log_paths(apps: &[AppSpec]) -> Result<()> {
    let mut seen: HashMap<PathBuf, String> = HashMap::new();

    for app in apps {
        for index in 0..app.instances {
            let logs = app.logs_for(index);
            let labelled = [
                ("error_file", &logs.error),
                ("out_file", &logs.out),
                ("log_file", &logs.combined),
            ];

            for (field, path) in labelled {
                let owner = format!("app '{}' {}", app.name, field);
                if let Some(previous) = seen.insert(path.clone(), owner.clone()) {
                    return Err(ProcwardenError::ConfigError(format!(
                        "log path {} is used by both {} and {}",
                        path.display(),
                        previous,
                        owner
                    )));
                }
            }
        }
    }

    Ok(())
}
