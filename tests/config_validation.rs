// tests/config_validation.rs

mod common;
use crate::common::write_config;

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use procwarden::config::{ByteSize, ExecMode, load_and_validate, load_from_path};
use procwarden::errors::ProcwardenError;

type TestResult = Result<(), Box<dyn Error>>;

const UPLOADER: &str = r#"
[app.ai-uploader]
script = "./target/release/ai-uploader"
instances = 1
exec_mode = "fork"
error_file = "./logs/ai-uploader-error.log"
out_file = "./logs/ai-uploader-out.log"
log_file = "./logs/ai-uploader-combined.log"
time = true
max_memory_restart = "500M"

[app.ai-uploader.env]
NODE_ENV = "production"
AI_UPLOADER_PORT = 6001
COHERE_API_KEY = "not-a-real-key"
LOG_PATH_API0 = "/var/log/api0.log"
RUST_LOG = "debug"
"#;

fn expect_config_error(contents: &str, needle: &str) {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), contents);

    match load_and_validate(&path) {
        Err(ProcwardenError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "error {msg:?} should mention {needle:?}");
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn uploader_record_loads_with_all_fields() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(dir.path(), UPLOADER);

    let apps = load_and_validate(&path)?;
    assert_eq!(apps.len(), 1);

    let app = &apps[0];
    assert_eq!(app.name, "ai-uploader");
    assert_eq!(app.script, dir.path().join("target/release/ai-uploader"));
    assert_eq!(app.cwd, dir.path().to_path_buf());
    assert_eq!(app.exec_mode, ExecMode::Fork);
    assert_eq!(app.instances, 1);
    assert!(app.time);
    assert_eq!(app.max_memory_restart, Some(ByteSize(500 * 1024 * 1024)));

    assert_eq!(app.env.len(), 5);
    assert_eq!(app.env["AI_UPLOADER_PORT"], "6001");
    assert_eq!(app.env["NODE_ENV"], "production");
    assert_eq!(app.env["RUST_LOG"], "debug");

    assert_eq!(app.logs.error, dir.path().join("logs/ai-uploader-error.log"));
    assert_eq!(app.logs.out, dir.path().join("logs/ai-uploader-out.log"));
    assert_eq!(app.logs.combined, dir.path().join("logs/ai-uploader-combined.log"));

    // Defaults.
    assert!(app.restart.autorestart);
    assert_eq!(app.restart.max_restarts, 16);
    assert_eq!(app.restart.min_uptime, Duration::from_secs(1));
    assert_eq!(app.restart.restart_delay, Duration::ZERO);
    assert_eq!(app.kill_timeout, Duration::from_millis(1600));
    assert_eq!(app.memory_check_interval, Duration::from_secs(30));

    Ok(())
}

#[test]
fn log_paths_default_to_logs_dir() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(
        dir.path(),
        r#"
[app.api]
script = "/usr/bin/api"
"#,
    );

    let apps = load_and_validate(&path)?;
    let app = &apps[0];
    assert_eq!(app.script, PathBuf::from("/usr/bin/api"));
    assert_eq!(app.logs.out, dir.path().join("logs/api-out.log"));
    assert_eq!(app.logs.error, dir.path().join("logs/api-error.log"));
    assert_eq!(app.logs.combined, dir.path().join("logs/api-combined.log"));
    assert!(!app.time);
    assert!(app.max_memory_restart.is_none());

    Ok(())
}

#[test]
fn restart_settings_parse() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(
        dir.path(),
        r#"
[app.api]
script = "/usr/bin/api"
autorestart = false
max_restarts = 3
min_uptime = "5s"
restart_delay = "250ms"
exp_backoff_restart_delay = "100ms"
kill_timeout = "3s"
memory_check_interval = "1m"
max_memory_restart = 1048576
"#,
    );

    let apps = load_and_validate(&path)?;
    let app = &apps[0];
    assert!(!app.restart.autorestart);
    assert_eq!(app.restart.max_restarts, 3);
    assert_eq!(app.restart.min_uptime, Duration::from_secs(5));
    assert_eq!(app.restart.restart_delay, Duration::from_millis(250));
    assert_eq!(
        app.restart.exp_backoff_restart_delay,
        Some(Duration::from_millis(100))
    );
    assert_eq!(app.kill_timeout, Duration::from_secs(3));
    assert_eq!(app.memory_check_interval, Duration::from_secs(60));
    assert_eq!(app.max_memory_restart, Some(ByteSize(1024 * 1024)));

    Ok(())
}

#[test]
fn empty_config_is_rejected() {
    expect_config_error("", "at least one [app.<name>]");
}

#[test]
fn port_out_of_range_is_rejected() {
    expect_config_error(
        r#"
[app.api]
script = "/usr/bin/api"
env = { AI_UPLOADER_PORT = 70000 }
"#,
        "AI_UPLOADER_PORT",
    );
}

#[test]
fn port_zero_is_rejected() {
    expect_config_error(
        r#"
[app.api]
script = "/usr/bin/api"
env = { PORT = 0 }
"#,
        "not a valid port",
    );
}

#[test]
fn non_numeric_port_is_rejected() {
    expect_config_error(
        r#"
[app.api]
script = "/usr/bin/api"
env = { PORT = "http" }
"#,
        "not a valid port",
    );
}

#[test]
fn numeric_string_port_is_accepted() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(
        dir.path(),
        r#"
[app.api]
script = "/usr/bin/api"
env = { PORT = "8080" }
"#,
    );
    let apps = load_and_validate(&path)?;
    assert_eq!(apps[0].env["PORT"], "8080");
    Ok(())
}

#[test]
fn zero_memory_limit_is_rejected() {
    expect_config_error(
        r#"
[app.api]
script = "/usr/bin/api"
max_memory_restart = "0M"
"#,
        "max_memory_restart",
    );
}

#[test]
fn malformed_memory_limit_fails_to_parse() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[app.api]
script = "/usr/bin/api"
max_memory_restart = "500 furlongs"
"#,
    );

    match load_from_path(&path) {
        Err(ProcwardenError::TomlError(e)) => {
            assert!(e.to_string().contains("500 furlongs"));
        }
        other => panic!("Expected TomlError, got: {:?}", other.map(|_| ())),
    }
}

#[test]
fn shared_log_paths_are_rejected() {
    expect_config_error(
        r#"
[app.api]
script = "/usr/bin/api"
out_file = "logs/api.log"
log_file = "./logs/api.log"
"#,
        "logs/api.log",
    );
}

#[test]
fn log_paths_through_parent_dir_are_rejected() {
    expect_config_error(
        r#"
[app.api]
script = "/usr/bin/api"
error_file = "logs/a.log"
out_file = "logs/../logs/a.log"
"#,
        "used by both",
    );
}

#[test]
fn absolute_and_relative_spellings_of_one_log_are_rejected() -> TestResult {
    let dir = TempDir::new()?;
    // `current_dir` reports the canonical path, e.g. through /tmp symlinks.
    let root = dir.path().canonicalize()?;
    let absolute = root.join("logs/a.log");
    write_config(
        &root,
        &format!(
            r#"
[app.api]
script = "/usr/bin/api"
error_file = {absolute:?}
out_file = "logs/a.log"
"#
        ),
    );

    // Load through a relative config path, as the CLI default does.
    let previous = std::env::current_dir()?;
    std::env::set_current_dir(&root)?;
    let result = load_and_validate("Procwarden.toml");
    std::env::set_current_dir(previous)?;

    match result {
        Err(ProcwardenError::ConfigError(msg)) => assert!(msg.contains("used by both")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
    Ok(())
}

#[test]
fn log_paths_shared_across_apps_are_rejected() {
    expect_config_error(
        r#"
[app.a]
script = "/usr/bin/a"
error_file = "/var/log/shared.log"

[app.b]
script = "/usr/bin/b"
error_file = "/var/log/shared.log"
"#,
        "used by both",
    );
}

#[test]
fn duplicate_env_keys_are_rejected_by_the_parser() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[app.api]
script = "/usr/bin/api"

[app.api.env]
NODE_ENV = "production"
NODE_ENV = "development"
"#,
    );

    assert!(matches!(
        load_and_validate(&path),
        Err(ProcwardenError::TomlError(_))
    ));
}

#[test]
fn invalid_env_key_is_rejected() {
    expect_config_error(
        r#"
[app.api]
script = "/usr/bin/api"
env = { "BAD-KEY" = "x" }
"#,
        "invalid env key",
    );
}

#[test]
fn fork_mode_requires_single_instance() {
    expect_config_error(
        r#"
[app.api]
script = "/usr/bin/api"
exec_mode = "fork"
instances = 2
"#,
        "exactly one process",
    );
}

#[test]
fn zero_instances_is_rejected() {
    expect_config_error(
        r#"
[app.api]
script = "/usr/bin/api"
exec_mode = "cluster"
instances = 0
"#,
        "instances must be >= 1",
    );
}

#[test]
fn unknown_exec_mode_fails_to_parse() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[app.api]
script = "/usr/bin/api"
exec_mode = "swarm"
"#,
    );

    assert!(matches!(
        load_from_path(&path),
        Err(ProcwardenError::TomlError(_))
    ));
}

#[test]
fn cluster_instances_get_their_own_log_files() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(
        dir.path(),
        r#"
[app.workers]
script = "/usr/bin/worker"
exec_mode = "cluster"
instances = 2
out_file = "logs/workers-out.log"
"#,
    );

    let apps = load_and_validate(&path)?;
    let app = &apps[0];
    assert_eq!(app.logs_for(0).out, dir.path().join("logs/workers-out-0.log"));
    assert_eq!(app.logs_for(1).out, dir.path().join("logs/workers-out-1.log"));

    Ok(())
}

#[test]
fn zero_max_restarts_is_rejected() {
    expect_config_error(
        r#"
[app.api]
script = "/usr/bin/api"
max_restarts = 0
"#,
        "max_restarts",
    );
}

#[test]
fn missing_config_file_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let result = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(ProcwardenError::ConfigError(_))));
}

#[test]
fn demo_config_matches_the_uploader_record() -> TestResult {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/Procwarden.toml");
    let apps = load_and_validate(&path)?;
    assert_eq!(apps.len(), 1);

    let app = &apps[0];
    assert_eq!(app.name, "ai-uploader");
    let keys: Vec<&str> = app.env.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        [
            "AI_UPLOADER_PORT",
            "COHERE_API_KEY",
            "LOG_PATH_API0",
            "NODE_ENV",
            "RUST_LOG"
        ]
    );
    assert_eq!(app.env["RUST_LOG"], "debug");
    assert_eq!(app.env["LOG_PATH_API0"], "/var/log/api0.log");
    assert_eq!(app.max_memory_restart, Some(ByteSize(500 * 1024 * 1024)));

    Ok(())
}
