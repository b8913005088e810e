// src/config/model.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::config::units::{ByteSize, de_duration, de_opt_duration};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [app.ai-uploader]
/// script = "./target/release/ai-uploader"
/// instances = 1
/// exec_mode = "fork"
/// error_file = "./logs/ai-uploader-error.log"
/// out_file = "./logs/ai-uploader-out.log"
/// log_file = "./logs/ai-uploader-combined.log"
/// time = true
/// max_memory_restart = "500M"
///
/// [app.ai-uploader.env]
/// NODE_ENV = "production"
/// AI_UPLOADER_PORT = 6001
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// All applications from `[app.<name>]`.
    ///
    /// Keys are the *process names* (e.g. `"ai-uploader"`).
    #[serde(default)]
    pub app: BTreeMap<String, AppConfig>,
}

/// How instances of an app are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Exactly one OS process.
    #[default]
    Fork,
    /// `instances` independent OS processes, each supervised on its own.
    Cluster,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecMode::Fork => f.write_str("fork"),
            ExecMode::Cluster => f.write_str("cluster"),
        }
    }
}

/// A value in `[app.<name>.env]`. TOML lets these be strings, numbers or
/// booleans; they all reach the child as strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Bool(b) => write!(f, "{b}"),
            EnvValue::Integer(i) => write!(f, "{i}"),
            EnvValue::Float(x) => write!(f, "{x}"),
            EnvValue::String(s) => f.write_str(s),
        }
    }
}

/// `[app.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Executable to launch. Relative paths resolve against the config
    /// file's directory.
    pub script: PathBuf,

    /// Extra arguments passed to `script`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the child; defaults to the config directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default = "default_instances")]
    pub instances: u32,

    #[serde(default)]
    pub exec_mode: ExecMode,

    /// Environment injected on top of the supervisor's own environment.
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    /// stderr only. Defaults to `logs/<name>-error.log`.
    #[serde(default)]
    pub error_file: Option<PathBuf>,

    /// stdout only. Defaults to `logs/<name>-out.log`.
    #[serde(default)]
    pub out_file: Option<PathBuf>,

    /// stdout and stderr interleaved. Defaults to `logs/<name>-combined.log`.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Prefix every log line with a local timestamp.
    #[serde(default)]
    pub time: bool,

    /// Restart the process once its resident memory exceeds this.
    #[serde(default)]
    pub max_memory_restart: Option<ByteSize>,

    #[serde(default = "default_memory_check_interval", deserialize_with = "de_duration")]
    pub memory_check_interval: Duration,

    #[serde(default = "default_autorestart")]
    pub autorestart: bool,

    /// Consecutive unstable restarts tolerated before giving up.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// A run shorter than this counts as unstable.
    #[serde(default = "default_min_uptime", deserialize_with = "de_duration")]
    pub min_uptime: Duration,

    #[serde(default, deserialize_with = "de_duration")]
    pub restart_delay: Duration,

    /// If set, consecutive restarts back off exponentially from this value.
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub exp_backoff_restart_delay: Option<Duration>,

    /// Grace period between SIGTERM and SIGKILL.
    #[serde(default = "default_kill_timeout", deserialize_with = "de_duration")]
    pub kill_timeout: Duration,
}

fn default_instances() -> u32 {
    1
}

fn default_memory_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_autorestart() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    16
}

fn default_min_uptime() -> Duration {
    Duration::from_secs(1)
}

fn default_kill_timeout() -> Duration {
    Duration::from_millis(1600)
}

/// Where an app's output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub error: PathBuf,
    pub out: PathBuf,
    pub combined: PathBuf,
}

impl LogPaths {
    /// Paths for one cluster instance: `app-out.log` becomes `app-out-2.log`.
    pub fn for_instance(&self, index: u32) -> LogPaths {
        LogPaths {
            error: suffixed(&self.error, index),
            out: suffixed(&self.out, index),
            combined: suffixed(&self.combined, index),
        }
    }
}

fn suffixed(path: &Path, index: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{index}"),
    };
    path.with_file_name(name)
}

/// Restart behaviour of one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    pub autorestart: bool,
    pub max_restarts: u32,
    pub min_uptime: Duration,
    pub restart_delay: Duration,
    pub exp_backoff_restart_delay: Option<Duration>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            autorestart: default_autorestart(),
            max_restarts: default_max_restarts(),
            min_uptime: default_min_uptime(),
            restart_delay: Duration::ZERO,
            exp_backoff_restart_delay: None,
        }
    }
}

/// A validated app with every path resolved and every value typed.
///
/// This is what the runtime and the process backend work with.
#[derive(Debug, Clone)]
pub struct AppSpec {
    pub name: String,
    pub script: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub exec_mode: ExecMode,
    pub instances: u32,
    pub env: BTreeMap<String, String>,
    pub logs: LogPaths,
    pub time: bool,
    pub max_memory_restart: Option<ByteSize>,
    pub memory_check_interval: Duration,
    pub restart: RestartPolicy,
    pub kill_timeout: Duration,
}

impl AppSpec {
    /// Log paths for a given instance slot.
    pub fn logs_for(&self, index: u32) -> LogPaths {
        match self.exec_mode {
            ExecMode::Fork => self.logs.clone(),
            ExecMode::Cluster => self.logs.for_instance(index),
        }
    }
}

impl AppConfig {
    /// Turn the raw section into an [`AppSpec`], resolving relative paths
    /// against `base_dir`.
    ///
    /// No validation happens here; see [`crate::config::validate_config`].
    pub fn to_spec(&self, name: &str, base_dir: &Path) -> AppSpec {
        let default_log = |suffix: &str| PathBuf::from("logs").join(format!("{name}-{suffix}.log"));

        let logs = LogPaths {
            error: resolve(
                base_dir,
                self.error_file.clone().unwrap_or_else(|| default_log("error")),
            ),
            out: resolve(
                base_dir,
                self.out_file.clone().unwrap_or_else(|| default_log("out")),
            ),
            combined: resolve(
                base_dir,
                self.log_file.clone().unwrap_or_else(|| default_log("combined")),
            ),
        };

        AppSpec {
            name: name.to_string(),
            script: resolve(base_dir, self.script.clone()),
            args: self.args.clone(),
            cwd: resolve(base_dir, self.cwd.clone().unwrap_or_else(|| PathBuf::from("."))),
            exec_mode: self.exec_mode,
            instances: self.instances,
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
            logs,
            time: self.time,
            max_memory_restart: self.max_memory_restart,
            memory_check_interval: self.memory_check_interval,
            restart: RestartPolicy {
                autorestart: self.autorestart,
                max_restarts: self.max_restarts,
                min_uptime: self.min_uptime,
                restart_delay: self.restart_delay,
                exp_backoff_restart_delay: self.exp_backoff_restart_delay,
            },
            kill_timeout: self.kill_timeout,
        }
    }
}

/// Join `path` onto `base` unless it is already absolute, then normalize it
/// lexically: `.` is dropped and `..` removes the preceding component, so
/// `./logs/a.log`, `logs/a.log` and `logs/../logs/a.log` compare equal.
///
/// Symlinks are not followed.
pub(crate) fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    let joined = if path.is_absolute() {
        path
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`.
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}
