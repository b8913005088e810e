// src/engine/restart.rs

use std::time::Duration;

use tracing::debug;

use crate::config::RestartPolicy;

/// Upper bound for exponential backoff between restarts.
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(15);

/// What to do after an instance exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Start the instance again after `delay`.
    Restart { delay: Duration },
    /// Too many unstable restarts in a row; leave the instance errored.
    GiveUp { unstable_restarts: u32 },
    /// Restarting is disabled; leave the instance stopped.
    Stop,
}

/// Per-instance restart bookkeeping.
///
/// Semantics:
/// - A run shorter than `min_uptime` is *unstable*. Unstable exits are
///   counted; once the count reaches `max_restarts` the tracker gives up.
/// - A run of at least `min_uptime` is *stable* and resets both the unstable
///   counter and the exponential backoff.
/// - With `exp_backoff_restart_delay = d` the delays go `d, 2d, 4d, ...`,
///   capped at [`MAX_BACKOFF_DELAY`]. Without it every restart waits
///   `restart_delay`.
/// - Restarts caused by the memory limit are deliberate: they always happen
///   (after `restart_delay`) and never count as unstable.
#[derive(Debug, Clone)]
pub struct RestartTracker {
    policy: RestartPolicy,
    unstable_restarts: u32,
    current_backoff: Option<Duration>,
    restarts: u32,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            unstable_restarts: 0,
            current_backoff: None,
            restarts: 0,
        }
    }

    /// Total restarts granted so far.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Unstable exits since the last stable run.
    pub fn unstable_restarts(&self) -> u32 {
        self.unstable_restarts
    }

    /// Decide what to do after the process exited on its own after running
    /// for `uptime`.
    pub fn record_exit(&mut self, uptime: Duration) -> RestartDecision {
        if !self.policy.autorestart {
            return RestartDecision::Stop;
        }

        if uptime >= self.policy.min_uptime {
            if self.unstable_restarts > 0 || self.current_backoff.is_some() {
                debug!(
                    ?uptime,
                    "stable run; resetting unstable counter and backoff"
                );
            }
            self.unstable_restarts = 0;
            self.current_backoff = None;
        } else {
            self.unstable_restarts += 1;
            debug!(
                ?uptime,
                unstable = self.unstable_restarts,
                max = self.policy.max_restarts,
                "unstable exit"
            );
            if self.unstable_restarts >= self.policy.max_restarts {
                return RestartDecision::GiveUp {
                    unstable_restarts: self.unstable_restarts,
                };
            }
        }

        let delay = self.next_delay();
        self.restarts += 1;
        RestartDecision::Restart { delay }
    }

    /// Decide what to do after the supervisor stopped the process because it
    /// went over its memory limit.
    pub fn record_memory_restart(&mut self) -> RestartDecision {
        self.restarts += 1;
        RestartDecision::Restart {
            delay: self.policy.restart_delay,
        }
    }

    fn next_delay(&mut self) -> Duration {
        match self.policy.exp_backoff_restart_delay {
            None => self.policy.restart_delay,
            Some(base) => {
                let next = match self.current_backoff {
                    None => base,
                    Some(prev) => prev.saturating_mul(2),
                }
                .min(MAX_BACKOFF_DELAY);
                self.current_backoff = Some(next);
                next
            }
        }
    }
}
