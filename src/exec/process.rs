// src/exec/process.rs

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::config::AppSpec;
use crate::engine::{ExitOutcome, InstanceId, RuntimeEvent};
use crate::errors::{ProcwardenError, Result};
use crate::exec::memory::{SysinfoProbe, spawn_memory_watcher};
use crate::exec::output::LogSinks;
use crate::exec::signal::terminate;

/// Name of the app, injected into every child's environment.
pub const APP_NAME_ENV: &str = "PROCWARDEN_APP_NAME";

/// Instance index, injected into every child's environment.
pub const INSTANCE_ID_ENV: &str = "PROCWARDEN_INSTANCE_ID";

/// How long to keep draining output after the child exits. A grandchild
/// that inherited the pipes could otherwise keep them open forever.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Run one instance to completion and report `Started`/`Exited`.
///
/// All errors are converted into an `Exited` event with
/// `ExitOutcome::SpawnFailed`; they are also logged via `tracing::error!`.
pub(crate) async fn supervise_child(
    app: Arc<AppSpec>,
    id: InstanceId,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    stop_rx: oneshot::Receiver<()>,
) {
    let outcome = match run_child(&app, &id, &runtime_tx, stop_rx).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(app = %id.app, instance = id.index, error = %err, "instance execution error");
            ExitOutcome::SpawnFailed
        }
    };

    let _ = runtime_tx.send(RuntimeEvent::Exited { id, outcome }).await;
}

async fn run_child(
    app: &AppSpec,
    id: &InstanceId,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    stop_rx: oneshot::Receiver<()>,
) -> Result<ExitOutcome> {
    let sinks = LogSinks::open(&app.logs_for(id.index), app.time).await?;

    let mut child = build_command(app, id.index)
        .spawn()
        .map_err(|source| ProcwardenError::Spawn {
            app: app.name.clone(),
            script: app.script.clone(),
            source,
        })?;

    let pid = child.id().unwrap_or_default();
    info!(app = %id.app, instance = id.index, pid, "spawned process");

    runtime_tx
        .send(RuntimeEvent::Started {
            id: id.clone(),
            pid,
        })
        .await
        .map_err(|e| ProcwardenError::BackendClosed(e.to_string()))?;

    let pumps = sinks.attach(child.stdout.take(), child.stderr.take());

    let watcher = app.max_memory_restart.map(|limit| {
        spawn_memory_watcher(
            id.clone(),
            pid,
            limit.as_u64(),
            app.memory_check_interval,
            Box::new(SysinfoProbe::new()),
            runtime_tx.clone(),
        )
    });

    let exited = tokio::select! {
        status = child.wait() => Some(status?),
        _ = stop_rx => None,
    };
    let status = match exited {
        Some(status) => status,
        None => {
            info!(app = %id.app, instance = id.index, pid, "stopping process");
            terminate(&mut child, app.kill_timeout).await?
        }
    };

    if let Some(watcher) = watcher {
        watcher.abort();
    }

    for pump in pumps {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, pump).await.is_err() {
            debug!(app = %id.app, instance = id.index, "output still open after exit; detaching");
        }
    }

    Ok(ExitOutcome::from(status))
}

/// Build the command for one instance: `script args...` in `cwd`, with the
/// supervisor's environment plus the app's `env` and the instance markers.
pub fn build_command(app: &AppSpec, index: u32) -> Command {
    let mut cmd = Command::new(&app.script);
    cmd.args(&app.args)
        .current_dir(&app.cwd)
        .envs(&app.env)
        .env(APP_NAME_ENV, &app.name)
        .env(INSTANCE_ID_ENV, index.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}
