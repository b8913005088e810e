// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The runtime talks to a `ProcessBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake backend in tests while
//! keeping the production implementation in [`process`](super::process).
//!
//! - `RealProcessBackend` spawns OS processes, one Tokio task per running
//!   instance, and reports `Started` / `Exited` through the runtime channel.
//! - Tests can provide their own `ProcessBackend` that, for example, records
//!   which instances were started and emits `Exited` events on cue.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::AppSpec;
use crate::engine::{InstanceId, RuntimeEvent};
use crate::errors::Result;

use super::process::supervise_child;

/// Trait abstracting how instances are started and stopped.
pub trait ProcessBackend: Send {
    /// Launch one instance of `app`.
    ///
    /// The backend must eventually send `RuntimeEvent::Exited` for `id`, even
    /// when the process could not be spawned at all.
    fn start(
        &mut self,
        app: Arc<AppSpec>,
        id: InstanceId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask a running instance to stop. The matching `Exited` event arrives
    /// through the runtime channel once the process is gone.
    fn stop(&mut self, id: InstanceId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Backend used in production.
pub struct RealProcessBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    stop_handles: HashMap<InstanceId, oneshot::Sender<()>>,
}

impl RealProcessBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            stop_handles: HashMap::new(),
        }
    }
}

impl ProcessBackend for RealProcessBackend {
    fn start(
        &mut self,
        app: Arc<AppSpec>,
        id: InstanceId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let (stop_tx, stop_rx) = oneshot::channel();
            self.stop_handles.insert(id.clone(), stop_tx);

            let runtime_tx = self.runtime_tx.clone();
            tokio::spawn(async move {
                supervise_child(app, id, runtime_tx, stop_rx).await;
            });
            Ok(())
        })
    }

    fn stop(&mut self, id: InstanceId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            match self.stop_handles.remove(&id) {
                Some(tx) => {
                    // The instance may have exited on its own in the meantime.
                    if tx.send(()).is_err() {
                        debug!(instance = %id, "stop requested for an instance that already exited");
                    }
                }
                None => debug!(instance = %id, "stop requested for unknown instance"),
            }
            Ok(())
        })
    }
}
