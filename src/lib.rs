// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;

use std::path::Path;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::cli::CliArgs;
use crate::config::{AppSpec, default_config_path, load_and_validate};
use crate::engine::{InstanceReport, InstanceStatus, Runtime, RuntimeEvent, RuntimeOptions};
use crate::errors::{ProcwardenError, Result};
use crate::exec::{RealProcessBackend, check_writable};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading + validation
/// - log file preparation
/// - the process backend and the supervision runtime
/// - Ctrl-C / SIGTERM handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let apps = load_and_validate(&config_path)?;

    if args.check {
        print_check(&config_path, &apps);
        return Ok(());
    }

    for app in &apps {
        for index in 0..app.instances {
            check_writable(&app.logs_for(index)).await?;
        }
    }

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let backend = RealProcessBackend::new(rt_tx.clone());

    spawn_shutdown_listener(rt_tx.clone());

    let options = RuntimeOptions { once: args.once };
    let runtime = Runtime::new(apps, options, rt_tx, rt_rx, Box::new(backend));
    let reports = runtime.run().await?;

    log_summary(&reports);

    let errored: Vec<String> = reports
        .iter()
        .filter(|r| r.status == InstanceStatus::Errored)
        .map(|r| r.id.to_string())
        .collect();
    if !errored.is_empty() {
        return Err(ProcwardenError::Other(anyhow!(
            "instances gave up after too many unstable restarts: {}",
            errored.join(", ")
        )));
    }

    Ok(())
}

/// Ctrl-C (and SIGTERM on unix) → graceful shutdown.
fn spawn_shutdown_listener(tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "failed to listen for shutdown signals");
            return;
        }
        let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

fn log_summary(reports: &[InstanceReport]) {
    for r in reports {
        match r.status {
            InstanceStatus::Errored => warn!(
                app = %r.id.app,
                instance = r.id.index,
                restarts = r.restarts,
                last_outcome = ?r.last_outcome,
                "instance errored"
            ),
            status => info!(
                app = %r.id.app,
                instance = r.id.index,
                restarts = r.restarts,
                ?status,
                last_outcome = ?r.last_outcome,
                "instance final state"
            ),
        }
    }
}

/// `--check` output: print every resolved app.
fn print_check(config_path: &Path, apps: &[AppSpec]) {
    println!("procwarden check: {}", config_path.display());
    println!();

    println!("apps ({}):", apps.len());
    for app in apps {
        println!("  - {}", app.name);
        println!("      script: {}", app.script.display());
        if !app.args.is_empty() {
            println!("      args: {:?}", app.args);
        }
        println!("      cwd: {}", app.cwd.display());
        println!("      exec_mode: {} x{}", app.exec_mode, app.instances);
        if !app.env.is_empty() {
            let keys: Vec<&str> = app.env.keys().map(String::as_str).collect();
            // Values may be credentials; only keys are printed.
            println!("      env: {}", keys.join(", "));
        }
        println!("      out_file: {}", app.logs.out.display());
        println!("      error_file: {}", app.logs.error.display());
        println!("      log_file: {}", app.logs.combined.display());
        if app.time {
            println!("      time: true");
        }
        if let Some(limit) = app.max_memory_restart {
            println!(
                "      max_memory_restart: {limit} (checked every {:?})",
                app.memory_check_interval
            );
        }
        println!(
            "      restart: autorestart={} max_restarts={} min_uptime={:?} restart_delay={:?}",
            app.restart.autorestart,
            app.restart.max_restarts,
            app.restart.min_uptime,
            app.restart.restart_delay
        );
        if let Some(backoff) = app.restart.exp_backoff_restart_delay {
            println!("      exp_backoff_restart_delay: {backoff:?}");
        }
        println!("      kill_timeout: {:?}", app.kill_timeout);
    }
}
