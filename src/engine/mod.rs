// src/engine/mod.rs

//! Supervision engine for procwarden.
//!
//! This module ties together:
//! - the restart policy (when, and how soon, a dead instance comes back)
//! - the main runtime event loop that reacts to:
//!   - process start / exit events from the backend
//!   - memory-limit events from the watchers
//!   - delayed restart timers
//!   - shutdown signals

pub mod restart;
pub mod runtime;

pub use restart::{MAX_BACKOFF_DELAY, RestartDecision, RestartTracker};
pub use runtime::{
    ExitOutcome, InstanceId, InstanceReport, InstanceStatus, Runtime, RuntimeEvent,
    RuntimeOptions,
};
