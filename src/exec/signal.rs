// src/exec/signal.rs

//! Stopping a child: polite first, forceful after `kill_timeout`.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

/// Send SIGTERM, wait up to `kill_timeout`, then SIGKILL.
///
/// On non-unix platforms the child is killed immediately.
pub async fn terminate(child: &mut Child, kill_timeout: Duration) -> io::Result<ExitStatus> {
    if send_sigterm(child) {
        match tokio::time::timeout(kill_timeout, child.wait()).await {
            Ok(status) => return status,
            Err(_) => warn!(
                pid = ?child.id(),
                ?kill_timeout,
                "process did not exit after SIGTERM; sending SIGKILL"
            ),
        }
    }

    child.start_kill()?;
    child.wait().await
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // Already reaped.
        return false;
    };

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => {
            debug!(pid, "sent SIGTERM");
            true
        }
        Err(e) => {
            warn!(pid, error = %e, "failed to send SIGTERM");
            false
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}
