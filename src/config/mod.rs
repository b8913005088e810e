// src/config/mod.rs

//! Configuration loading and validation for procwarden.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Parse sizes and durations (`units.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate the supervision contract (`validate.rs`).

pub mod loader;
pub mod model;
pub mod units;
pub mod validate;

pub use loader::{config_base_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{AppConfig, AppSpec, ConfigFile, EnvValue, ExecMode, LogPaths, RestartPolicy};
pub use units::{ByteSize, parse_byte_size, parse_duration};
pub use validate::{validate_apps, validate_config};
