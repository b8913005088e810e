// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::AppSpec;
use crate::engine::restart::{RestartDecision, RestartTracker};
use crate::errors::Result;
use crate::exec::ProcessBackend;

/// One managed process slot: an app plus its instance index.
///
/// Fork-mode apps only ever have index 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId {
    pub app: String,
    pub index: u32,
}

impl InstanceId {
    pub fn new(app: impl Into<String>, index: u32) -> Self {
        Self {
            app: app.into(),
            index,
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.app, self.index)
    }
}

/// How a managed process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited with this status code.
    Code(i32),
    /// Killed by this signal.
    Signal(i32),
    /// Never got going (spawn error, log files unusable, ...).
    SpawnFailed,
}

impl ExitOutcome {
    pub fn success(self) -> bool {
        matches!(self, ExitOutcome::Code(0))
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitOutcome::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitOutcome::Signal(sig);
            }
        }
        ExitOutcome::Code(-1)
    }
}

/// Events sent into the runtime from the process backend, memory watchers,
/// restart timers, or external signals.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    Started { id: InstanceId, pid: u32 },
    Exited { id: InstanceId, outcome: ExitOutcome },
    MemoryExceeded { id: InstanceId, pid: u32, rss: u64 },
    RestartDue { id: InstanceId },
    ShutdownRequested,
}

/// Lifecycle state of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Handed to the backend, not yet confirmed running.
    Starting,
    Online,
    /// Asked to stop (shutdown or memory limit), waiting for the exit.
    Stopping,
    /// Exited, restart timer pending.
    WaitingRestart,
    /// Exited and will not be restarted.
    Stopped,
    /// Gave up after too many unstable restarts.
    Errored,
}

impl InstanceStatus {
    fn is_terminal(self) -> bool {
        matches!(self, InstanceStatus::Stopped | InstanceStatus::Errored)
    }
}

/// Options that influence how the runtime behaves.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Run every instance once: never restart, exit when all have exited.
    pub once: bool,
}

/// Final state of an instance when the runtime returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceReport {
    pub id: InstanceId,
    pub status: InstanceStatus,
    pub restarts: u32,
    pub last_outcome: Option<ExitOutcome>,
}

struct InstanceState {
    app: Arc<AppSpec>,
    status: InstanceStatus,
    tracker: RestartTracker,
    pid: Option<u32>,
    started_at: Option<Instant>,
    /// Set when we are stopping the process because of its memory usage.
    memory_restart: bool,
    last_outcome: Option<ExitOutcome>,
}

/// The supervision runtime.
///
/// Responsibilities:
/// - Start every instance of every app through the `ProcessBackend`.
/// - Consume `RuntimeEvent`s from the backend, memory watchers, restart
///   timers and the signal handler.
/// - Apply the restart policy when an instance exits.
/// - Stop everything on shutdown and report the final state.
pub struct Runtime {
    instances: BTreeMap<InstanceId, InstanceState>,
    options: RuntimeOptions,
    shutting_down: bool,

    /// Unified event stream from all producers.
    events_rx: mpsc::Receiver<RuntimeEvent>,

    /// Used to schedule delayed restarts back into our own event stream.
    events_tx: mpsc::Sender<RuntimeEvent>,

    backend: Box<dyn ProcessBackend>,
}

impl Runtime {
    pub fn new(
        apps: Vec<AppSpec>,
        options: RuntimeOptions,
        events_tx: mpsc::Sender<RuntimeEvent>,
        events_rx: mpsc::Receiver<RuntimeEvent>,
        backend: Box<dyn ProcessBackend>,
    ) -> Self {
        let mut instances = BTreeMap::new();

        for app in apps {
            let app = Arc::new(app);
            for index in 0..app.instances {
                instances.insert(
                    InstanceId::new(app.name.clone(), index),
                    InstanceState {
                        app: Arc::clone(&app),
                        status: InstanceStatus::Stopped,
                        tracker: RestartTracker::new(app.restart.clone()),
                        pid: None,
                        started_at: None,
                        memory_restart: false,
                        last_outcome: None,
                    },
                );
            }
        }

        Self {
            instances,
            options,
            shutting_down: false,
            events_rx,
            events_tx,
            backend,
        }
    }

    /// Main event loop. Returns once every instance is stopped or errored,
    /// either because of a shutdown request or because nothing is left to
    /// supervise.
    pub async fn run(mut self) -> Result<Vec<InstanceReport>> {
        info!(instances = self.instances.len(), "procwarden runtime started");

        let ids: Vec<InstanceId> = self.instances.keys().cloned().collect();
        for id in ids {
            self.start_instance(&id).await?;
        }

        while !self.is_finished() {
            let Some(event) = self.events_rx.recv().await else {
                warn!("runtime event channel closed");
                break;
            };
            debug!(?event, "runtime received event");

            match event {
                RuntimeEvent::Started { id, pid } => self.handle_started(id, pid),
                RuntimeEvent::Exited { id, outcome } => self.handle_exited(id, outcome).await?,
                RuntimeEvent::MemoryExceeded { id, pid, rss } => {
                    self.handle_memory_exceeded(id, pid, rss).await?
                }
                RuntimeEvent::RestartDue { id } => self.handle_restart_due(id).await?,
                RuntimeEvent::ShutdownRequested => self.handle_shutdown().await?,
            }
        }

        info!("procwarden runtime exiting");
        Ok(self.report())
    }

    fn is_finished(&self) -> bool {
        self.instances.values().all(|s| s.status.is_terminal())
    }

    fn report(&self) -> Vec<InstanceReport> {
        self.instances
            .iter()
            .map(|(id, s)| InstanceReport {
                id: id.clone(),
                status: s.status,
                restarts: s.tracker.restarts(),
                last_outcome: s.last_outcome,
            })
            .collect()
    }

    async fn start_instance(&mut self, id: &InstanceId) -> Result<()> {
        let Some(state) = self.instances.get_mut(id) else {
            return Ok(());
        };

        state.status = InstanceStatus::Starting;
        state.memory_restart = false;
        let app = Arc::clone(&state.app);

        info!(app = %id.app, instance = id.index, script = %app.script.display(), "starting instance");
        self.backend.start(app, id.clone()).await
    }

    fn handle_started(&mut self, id: InstanceId, pid: u32) {
        let Some(state) = self.instances.get_mut(&id) else {
            return;
        };

        state.pid = Some(pid);
        state.started_at = Some(Instant::now());
        if state.status == InstanceStatus::Starting {
            state.status = InstanceStatus::Online;
        }
        info!(app = %id.app, instance = id.index, pid, "instance online");
    }

    async fn handle_exited(&mut self, id: InstanceId, outcome: ExitOutcome) -> Result<()> {
        let once = self.options.once;
        let shutting_down = self.shutting_down;

        let Some(state) = self.instances.get_mut(&id) else {
            return Ok(());
        };

        let uptime = state
            .started_at
            .take()
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        let pid = state.pid.take();
        state.last_outcome = Some(outcome);

        match outcome {
            ExitOutcome::Code(0) => {
                info!(app = %id.app, instance = id.index, ?pid, ?uptime, "instance exited cleanly")
            }
            ExitOutcome::Code(code) => warn!(
                app = %id.app, instance = id.index, ?pid, exit_code = code, ?uptime,
                "instance exited with error"
            ),
            ExitOutcome::Signal(sig) => warn!(
                app = %id.app, instance = id.index, ?pid, signal = sig, ?uptime,
                "instance killed by signal"
            ),
            ExitOutcome::SpawnFailed => {
                error!(app = %id.app, instance = id.index, "instance failed to start")
            }
        }

        if shutting_down {
            state.status = InstanceStatus::Stopped;
            return Ok(());
        }

        // The child may have crashed on its own while the memory stop was in
        // flight; only an exit by signal is the one we asked for.
        let stopped_for_memory =
            std::mem::take(&mut state.memory_restart) && matches!(outcome, ExitOutcome::Signal(_));

        let decision = if once {
            RestartDecision::Stop
        } else if stopped_for_memory {
            state.tracker.record_memory_restart()
        } else {
            state.tracker.record_exit(uptime)
        };

        match decision {
            RestartDecision::Stop => {
                info!(app = %id.app, instance = id.index, "instance stopped; not restarting");
                state.status = InstanceStatus::Stopped;
                Ok(())
            }
            RestartDecision::GiveUp { unstable_restarts } => {
                error!(
                    app = %id.app,
                    instance = id.index,
                    unstable_restarts,
                    min_uptime = ?state.app.restart.min_uptime,
                    "too many unstable restarts; giving up"
                );
                state.status = InstanceStatus::Errored;
                Ok(())
            }
            RestartDecision::Restart { delay } => {
                info!(
                    app = %id.app,
                    instance = id.index,
                    restarts = state.tracker.restarts(),
                    ?delay,
                    "restarting instance"
                );
                if delay.is_zero() {
                    self.start_instance(&id).await
                } else {
                    state.status = InstanceStatus::WaitingRestart;
                    self.schedule_restart(id, delay);
                    Ok(())
                }
            }
        }
    }

    async fn handle_memory_exceeded(&mut self, id: InstanceId, pid: u32, rss: u64) -> Result<()> {
        let Some(state) = self.instances.get_mut(&id) else {
            return Ok(());
        };

        // Stale sample from a previous process in this slot.
        if state.status != InstanceStatus::Online || state.pid != Some(pid) {
            debug!(app = %id.app, instance = id.index, pid, "ignoring stale memory event");
            return Ok(());
        }

        warn!(
            app = %id.app,
            instance = id.index,
            pid,
            rss,
            limit = ?state.app.max_memory_restart.map(|b| b.to_string()),
            "memory limit exceeded; restarting"
        );

        state.memory_restart = true;
        state.status = InstanceStatus::Stopping;
        self.backend.stop(id).await
    }

    async fn handle_restart_due(&mut self, id: InstanceId) -> Result<()> {
        let waiting = self
            .instances
            .get(&id)
            .is_some_and(|s| s.status == InstanceStatus::WaitingRestart);

        if waiting && !self.shutting_down {
            self.start_instance(&id).await?;
        }
        Ok(())
    }

    async fn handle_shutdown(&mut self) -> Result<()> {
        if self.shutting_down {
            debug!("shutdown already in progress");
            return Ok(());
        }
        info!("shutdown requested, stopping all instances");
        self.shutting_down = true;

        let mut to_stop = Vec::new();
        for (id, state) in self.instances.iter_mut() {
            match state.status {
                InstanceStatus::Starting | InstanceStatus::Online => {
                    state.status = InstanceStatus::Stopping;
                    to_stop.push(id.clone());
                }
                InstanceStatus::WaitingRestart => state.status = InstanceStatus::Stopped,
                InstanceStatus::Stopping | InstanceStatus::Stopped | InstanceStatus::Errored => {}
            }
        }

        for id in to_stop {
            self.backend.stop(id).await?;
        }
        Ok(())
    }

    fn schedule_restart(&self, id: InstanceId, delay: Duration) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(RuntimeEvent::RestartDue { id }).await;
        });
    }
}
