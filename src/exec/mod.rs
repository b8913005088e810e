// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the configured apps,
//! using `tokio::process::Command`, and reporting back to the supervision
//! runtime via `RuntimeEvent`s.
//!
//! - [`backend`] provides the `ProcessBackend` trait and the
//!   `RealProcessBackend` the runtime uses in production.
//! - [`process`] spawns one instance and waits for it.
//! - [`output`] copies stdout/stderr into the out/error/combined log files.
//! - [`memory`] samples resident memory against `max_memory_restart`.
//! - [`signal`] handles SIGTERM-then-SIGKILL stopping.

pub mod backend;
pub mod memory;
pub mod output;
pub mod process;
pub mod signal;

pub use backend::{ProcessBackend, RealProcessBackend};
pub use memory::{MemoryProbe, SysinfoProbe, spawn_memory_watcher};
pub use output::{LogSinks, check_writable};
pub use process::{APP_NAME_ENV, INSTANCE_ID_ENV, build_command};
