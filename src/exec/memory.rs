// src/exec/memory.rs

//! Resident-memory sampling for the `max_memory_restart` limit.

use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::engine::{InstanceId, RuntimeEvent};

/// Source of resident-set-size readings.
pub trait MemoryProbe: Send {
    /// RSS of `pid` in bytes, or `None` if the process is gone.
    fn rss(&mut self, pid: u32) -> Option<u64>;
}

/// `sysinfo`-backed probe.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn rss(&mut self, pid: u32) -> Option<u64> {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(|p| p.memory())
    }
}

/// Sample `pid` every `interval` and send a single
/// `RuntimeEvent::MemoryExceeded` once its RSS goes above `limit`.
///
/// The task ends after reporting, or when the process disappears. Callers
/// abort it when the child exits.
pub fn spawn_memory_watcher(
    id: InstanceId,
    pid: u32,
    limit: u64,
    interval: Duration,
    mut probe: Box<dyn MemoryProbe>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; give the process one interval first.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(rss) = probe.rss(pid) else {
                debug!(instance = %id, pid, "process gone; memory watcher stopping");
                return;
            };
            trace!(instance = %id, pid, rss, limit, "memory sample");

            if rss > limit {
                warn!(instance = %id, pid, rss, limit, "resident memory above limit");
                let _ = runtime_tx
                    .send(RuntimeEvent::MemoryExceeded { id, pid, rss })
                    .await;
                return;
            }
        }
    })
}
