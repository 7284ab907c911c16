// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod tasks;
pub mod types;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, ConfigFile};
use crate::engine::{CoreOptions, CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use crate::exec::{ProcessBackend, WorkerTemplate};
use crate::fs::RealFileSystem;
use crate::tasks::TaskEntry;
use crate::types::FailurePolicy;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading + CLI overrides
/// - core runtime / process backend / runtime shell
/// - Ctrl-C and SIGTERM handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_and_validate(&args.config)?;
    apply_overrides(&mut cfg, &args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let backend = ProcessBackend::new(rt_tx.clone());
    spawn_shutdown_listener(rt_tx.clone());

    let runtime = Runtime::new(
        build_core(&cfg),
        rt_rx,
        backend,
        Box::new(RealFileSystem),
        RuntimeOptions {
            grace_period: cfg.settings.grace_period,
        },
    );

    let report = runtime.run().await?;
    info!(
        tasks = report.completed.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "all tasks succeeded"
    );
    Ok(())
}

/// Build the pure core for a validated config.
pub fn build_core(cfg: &ConfigFile) -> CoreRuntime {
    CoreRuntime::new(
        cfg.tasks.clone(),
        CoreOptions {
            capacity: cfg.settings.capacity,
            policy: cfg.settings.policy,
        },
        WorkerTemplate::from_config(cfg),
    )
}

/// Apply command-line overrides on top of the file config.
pub fn apply_overrides(cfg: &mut ConfigFile, args: &CliArgs) -> errors::Result<()> {
    if let Some(jobs) = args.jobs {
        if jobs == 0 {
            return Err(errors::ForkrunError::ConfigError(
                "--jobs must be >= 1 (got 0)".to_string(),
            ));
        }
        cfg.settings.capacity = jobs;
    }

    if let Some(fail_fast) = args.fail_fast_override() {
        cfg.settings.policy = FailurePolicy::from_fail_fast(fail_fast);
    }

    if let Some(root) = &args.output_root {
        cfg.settings.output_root = root.clone();
    }

    let tasks = args.task_list();
    if !tasks.is_empty() {
        let entries: Vec<TaskEntry> = tasks.into_iter().map(TaskEntry::from).collect();
        config::validate::validate_tasks(&entries)?;
        cfg.tasks = entries;
    }

    Ok(())
}

/// Deliver Ctrl-C (and SIGTERM on unix) to the runtime as a shutdown request.
fn spawn_shutdown_listener(tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = wait_for_shutdown_signal().await {
                eprintln!("failed to listen for shutdown signals: {e}");
                return;
            }
            if tx.send(RuntimeEvent::ShutdownRequested).await.is_err() {
                return;
            }
        }
    });
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("Ctrl+C received");
            }
            _ = terminate.recv() => {
                info!("SIGTERM received");
            }
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Ctrl+C received");
        Ok(())
    }
}

/// Dry-run output: settings plus every task's worker, without side effects.
fn print_dry_run(cfg: &ConfigFile) {
    let template = WorkerTemplate::from_config(cfg);

    println!("forkrun dry-run");
    println!("  capacity     = {}", cfg.settings.capacity);
    println!("  policy       = {}", cfg.settings.policy);
    println!("  output_root  = {}", cfg.settings.output_root.display());
    println!("  isolation    = {}", cfg.settings.isolation_var);
    println!("  grace_period = {:?}", cfg.settings.grace_period);
    if let Some(setup) = &cfg.worker.setup {
        println!("  setup        = {setup}");
    }
    println!();

    println!("tasks ({}):", cfg.tasks.len());
    for (index, entry) in cfg.tasks.iter().enumerate() {
        let spec = template.worker_spec(entry.resolve(), index as u64 + 1);
        println!("  - {} ({})", spec.task.display_name, spec.task.id);
        println!("      output: {}", spec.output_dir.display());
        println!("      argv:   {:?}", spec.command.argv());
    }

    debug!("dry-run complete (no execution)");
}
