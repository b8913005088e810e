use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use procwarden::config::{AppSpec, ByteSize, ExecMode, LogPaths, RestartPolicy};

/// Builder for `AppSpec` to simplify runtime test setup.
pub struct AppSpecBuilder {
    spec: AppSpec,
}

impl AppSpecBuilder {
    pub fn new(name: &str) -> Self {
        let log_dir = PathBuf::from("/tmp/procwarden-test-logs");
        Self {
            spec: AppSpec {
                name: name.to_string(),
                script: PathBuf::from("/bin/true"),
                args: Vec::new(),
                cwd: PathBuf::from("/"),
                exec_mode: ExecMode::Fork,
                instances: 1,
                env: BTreeMap::new(),
                logs: LogPaths {
                    error: log_dir.join(format!("{name}-error.log")),
                    out: log_dir.join(format!("{name}-out.log")),
                    combined: log_dir.join(format!("{name}-combined.log")),
                },
                time: false,
                max_memory_restart: None,
                memory_check_interval: Duration::from_secs(30),
                restart: RestartPolicy::default(),
                kill_timeout: Duration::from_millis(1600),
            },
        }
    }

    pub fn shell(mut self, script: &str) -> Self {
        self.spec.script = PathBuf::from("/bin/sh");
        self.spec.args = vec!["-c".to_string(), script.to_string()];
        self
    }

    pub fn log_dir(mut self, dir: &Path) -> Self {
        let name = self.spec.name.clone();
        self.spec.logs = LogPaths {
            error: dir.join(format!("{name}-error.log")),
            out: dir.join(format!("{name}-out.log")),
            combined: dir.join(format!("{name}-combined.log")),
        };
        self
    }

    pub fn cluster(mut self, instances: u32) -> Self {
        self.spec.exec_mode = ExecMode::Cluster;
        self.spec.instances = instances;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.spec.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn time(mut self, on: bool) -> Self {
        self.spec.time = on;
        self
    }

    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.spec.max_memory_restart = Some(ByteSize(bytes));
        self
    }

    pub fn memory_check_interval(mut self, d: Duration) -> Self {
        self.spec.memory_check_interval = d;
        self
    }

    pub fn autorestart(mut self, on: bool) -> Self {
        self.spec.restart.autorestart = on;
        self
    }

    pub fn max_restarts(mut self, n: u32) -> Self {
        self.spec.restart.max_restarts = n;
        self
    }

    pub fn min_uptime(mut self, d: Duration) -> Self {
        self.spec.restart.min_uptime = d;
        self
    }

    pub fn restart_delay(mut self, d: Duration) -> Self {
        self.spec.restart.restart_delay = d;
        self
    }

    pub fn kill_timeout(mut self, d: Duration) -> Self {
        self.spec.kill_timeout = d;
        self
    }

    pub fn build(self) -> AppSpec {
        self.spec
    }
}
