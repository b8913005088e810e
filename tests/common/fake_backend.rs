use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use procwarden::config::AppSpec;
use procwarden::engine::{ExitOutcome, InstanceId, RuntimeEvent};
use procwarden::errors::{ProcwardenError, Result};
use procwarden::exec::ProcessBackend;

/// What a fake process does once "started".
#[derive(Debug, Clone, Copy)]
pub enum FakeRun {
    /// Exit on its own after the given time.
    ExitAfter(Duration, ExitOutcome),
    /// Keep running until the runtime asks to stop it (exits with SIGTERM).
    UntilStopped,
    /// Keep running and ignore stop requests; the test sends `Exited` itself.
    IgnoresStop,
}

type Script = Arc<dyn Fn(&InstanceId, usize) -> FakeRun + Send + Sync>;

/// A fake backend that:
/// - records which instances were started / stopped
/// - hands out pids starting at 1000
/// - emits `Started` / `Exited` according to a script keyed on the start
///   number (0 for the first start of the whole backend, 1 for the next, ...).
pub struct FakeBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    script: Script,
    started: Arc<Mutex<Vec<(InstanceId, u32)>>>,
    stopped: Arc<Mutex<Vec<InstanceId>>>,
    runs: Arc<Mutex<HashMap<InstanceId, FakeRun>>>,
}

impl FakeBackend {
    pub fn new<F>(runtime_tx: mpsc::Sender<RuntimeEvent>, script: F) -> Self
    where
        F: Fn(&InstanceId, usize) -> FakeRun + Send + Sync + 'static,
    {
        Self {
            runtime_tx,
            script: Arc::new(script),
            started: Arc::new(Mutex::new(Vec::new())),
            stopped: Arc::new(Mutex::new(Vec::new())),
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Shared handles onto what this backend records, usable after the
    /// backend itself has been moved into the runtime.
    pub fn recorded(&self) -> Recorded {
        Recorded {
            started: Arc::clone(&self.started),
            stopped: Arc::clone(&self.stopped),
        }
    }
}

/// What a [`FakeBackend`] has been asked to do so far.
#[derive(Clone)]
pub struct Recorded {
    pub started: Arc<Mutex<Vec<(InstanceId, u32)>>>,
    pub stopped: Arc<Mutex<Vec<InstanceId>>>,
}

impl ProcessBackend for FakeBackend {
    fn start(
        &mut self,
        _app: Arc<AppSpec>,
        id: InstanceId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let started = Arc::clone(&self.started);
        let script = Arc::clone(&self.script);
        let runs = Arc::clone(&self.runs);

        Box::pin(async move {
            let n = started.lock().unwrap().len();
            let pid = 1000 + n as u32;

            tx.send(RuntimeEvent::Started {
                id: id.clone(),
                pid,
            })
            .await
            .map_err(|e| ProcwardenError::BackendClosed(e.to_string()))?;

            // Recorded after `Started` is queued, so a test that waits on the
            // count knows the runtime will see `Started` first.
            started.lock().unwrap().push((id.clone(), pid));

            let run = script(&id, n);
            runs.lock().unwrap().insert(id.clone(), run);

            if let FakeRun::ExitAfter(after, outcome) = run {
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = tx.send(RuntimeEvent::Exited { id, outcome }).await;
                });
            }
            Ok(())
        })
    }

    fn stop(&mut self, id: InstanceId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let stopped = Arc::clone(&self.stopped);
        let runs = Arc::clone(&self.runs);

        Box::pin(async move {
            stopped.lock().unwrap().push(id.clone());
            if matches!(runs.lock().unwrap().get(&id), Some(FakeRun::IgnoresStop)) {
                return Ok(());
            }
            tokio::spawn(async move {
                let _ = tx
                    .send(RuntimeEvent::Exited {
                        id,
                        outcome: ExitOutcome::Signal(15),
                    })
                    .await;
            });
            Ok(())
        })
    }
}

/// Poll `cond` until it holds or `limit` passes.
pub async fn wait_until<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
