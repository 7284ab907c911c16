// tests/process_backend.rs
//
// End-to-end runs against real `sh` processes.
#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use forkrun::build_core;
use forkrun::config::ConfigFile;
use forkrun::engine::{RunFailure, RunReport, Runtime, RuntimeEvent, RuntimeOptions};
use forkrun::errors::{ForkrunError, Result as ForkrunResult};
use forkrun::exec::{ProcessBackend, WorkerBackend, WorkerTemplate};
use forkrun::fs::RealFileSystem;
use forkrun_test_utils::builders::ConfigFileBuilder;
use forkrun_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn runtime_for(cfg: &ConfigFile) -> Runtime<ProcessBackend> {
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    Runtime::new(
        build_core(cfg),
        rx,
        ProcessBackend::new(tx),
        Box::new(RealFileSystem),
        RuntimeOptions {
            grace_period: cfg.settings.grace_period,
        },
    )
}

async fn run(cfg: &ConfigFile) -> ForkrunResult<RunReport> {
    with_timeout(runtime_for(cfg).run()).await
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path.as_ref())
        .unwrap_or_else(|e| panic!("reading {:?}: {e}", path.as_ref()))
}

#[tokio::test]
async fn captures_output_per_worker_and_sets_isolation_index() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("build");

    let cfg = ConfigFileBuilder::new()
        .with_command("first", "echo \"env=$TEST_ENV_NUMBER\"; echo oops >&2")
        .with_command("second", "echo \"env=$TEST_ENV_NUMBER\"")
        .capacity(2)
        .output_root(&root)
        .build();

    let report = run(&cfg).await?;
    assert_eq!(report.completed.len(), 2);

    assert_eq!(read(root.join("first_1/stdout")), "env=1\n");
    assert_eq!(read(root.join("first_1/stderr")), "oops\n");
    assert_eq!(read(root.join("second_2/stdout")), "env=2\n");
    assert_eq!(read(root.join("second_2/stderr")), "");
    Ok(())
}

#[tokio::test]
async fn output_root_is_wiped_before_the_run() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("build");
    fs::create_dir_all(root.join("stale_7"))?;
    fs::write(root.join("stale_7/stdout"), "old")?;

    let cfg = ConfigFileBuilder::new()
        .with_command("only", "true")
        .output_root(&root)
        .build();
    run(&cfg).await?;

    assert!(!root.join("stale_7").exists());
    assert!(root.join("only_1").is_dir());
    Ok(())
}

#[tokio::test]
async fn collect_all_with_invoke_template() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("build");

    // `$0` is the task identifier; build:b fails.
    let cfg = ConfigFileBuilder::new()
        .with_tasks(["build:a", "build:b", "build:c"])
        .invoke(&["sh", "-c", "echo running $0; test \"$0\" != build:b", "{task}"])
        .capacity(2)
        .fail_fast(false)
        .output_root(&root)
        .build();

    match run(&cfg).await {
        Err(ForkrunError::Run(RunFailure::AggregatedFailure { failed, rerun })) => {
            assert_eq!(failed, vec!["build:b"]);
            assert_eq!(rerun.to_string(), "build:b");
        }
        other => panic!("expected aggregated failure, got {other:?}"),
    }

    assert_eq!(read(root.join("build_a_1/stdout")), "running build:a\n");
    assert_eq!(read(root.join("build_b_2/stdout")), "running build:b\n");
    assert_eq!(read(root.join("build_c_3/stdout")), "running build:c\n");
    Ok(())
}

#[tokio::test]
async fn fail_fast_leaves_queued_tasks_untouched() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("build");

    let cfg = ConfigFileBuilder::new()
        .with_command("x", "exit 1")
        .with_command("y", "echo y")
        .with_command("z", "echo z")
        .capacity(1)
        .fail_fast(true)
        .output_root(&root)
        .build();

    match run(&cfg).await {
        Err(ForkrunError::Run(RunFailure::Aborted { failed, rerun })) => {
            assert_eq!(failed, "x");
            assert_eq!(rerun.to_string(), "x y z");
        }
        other => panic!("expected abort, got {other:?}"),
    }

    assert!(root.join("x_1").is_dir());
    assert!(!root.join("y_2").exists());
    assert!(!root.join("z_3").exists());
    Ok(())
}

#[tokio::test]
async fn setup_hook_runs_inside_the_worker_first() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("build");

    let cfg = ConfigFileBuilder::new()
        .with_command("task", "echo task")
        .setup("echo \"setup $TEST_ENV_NUMBER\"")
        .output_root(&root)
        .build();
    run(&cfg).await?;

    assert_eq!(read(root.join("task_1/stdout")), "setup 1\ntask\n");
    Ok(())
}

#[tokio::test]
async fn failing_setup_hook_fails_the_task() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("build");

    let cfg = ConfigFileBuilder::new()
        .with_command("task", "echo task")
        .setup("echo preparing; exit 3")
        .fail_fast(false)
        .output_root(&root)
        .build();

    let mut runtime = runtime_for(&cfg);
    let result = with_timeout(runtime.run_to_end()).await;
    match result {
        Err(ForkrunError::Run(RunFailure::AggregatedFailure { failed, .. })) => {
            assert_eq!(failed, vec!["task"]);
        }
        other => panic!("expected aggregated failure, got {other:?}"),
    }

    assert_eq!(read(root.join("task_1/stdout")), "preparing\n");
    assert!(runtime.escalations().is_empty());
    Ok(())
}

#[tokio::test]
async fn fail_fast_interrupts_then_kills_stubborn_workers() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("build");

    let cfg = ConfigFileBuilder::new()
        .with_command("broken", "sleep 0.3; exit 1")
        .with_command("polite", "sleep 30")
        .with_command("stubborn", "trap '' INT; sleep 30")
        .capacity(3)
        .fail_fast(true)
        .grace_period("1s")
        .output_root(&root)
        .build();

    let started = Instant::now();
    let mut runtime = runtime_for(&cfg);
    let result = with_timeout(runtime.run_to_end()).await;

    match result {
        Err(ForkrunError::Run(RunFailure::Aborted { failed, rerun })) => {
            assert_eq!(failed, "broken");
            assert_eq!(rerun.to_string(), "broken polite stubborn");
        }
        other => panic!("expected abort, got {other:?}"),
    }

    let escalations = runtime.escalations();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].interrupted, vec![2, 3]);
    assert_eq!(escalations[0].exited, vec![2]);
    assert_eq!(escalations[0].killed, vec![3]);

    assert!(started.elapsed() < Duration::from_secs(8));
    Ok(())
}

#[tokio::test]
async fn external_shutdown_stops_running_workers() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("build");

    let cfg = ConfigFileBuilder::new()
        .with_command("long", "sleep 30")
        .with_command("later", "echo later")
        .capacity(1)
        .grace_period("2s")
        .output_root(&root)
        .build();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let mut runtime = Runtime::new(
        build_core(&cfg),
        rx,
        ProcessBackend::new(tx.clone()),
        Box::new(RealFileSystem),
        RuntimeOptions {
            grace_period: cfg.settings.grace_period,
        },
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
    });

    match with_timeout(runtime.run_to_end()).await {
        Err(ForkrunError::Run(RunFailure::Interrupted { rerun })) => {
            assert_eq!(rerun.to_string(), "long later");
        }
        other => panic!("expected interruption, got {other:?}"),
    }

    assert_eq!(runtime.escalations()[0].exited, vec![1]);
    assert!(!root.join("later_2").exists());
    Ok(())
}

#[tokio::test]
async fn interrupt_during_stagger_cancels_before_the_process_exists() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("build");

    let cfg = ConfigFileBuilder::new()
        .with_command("delayed", "echo should-not-run")
        .stagger("2s")
        .grace_period("1s")
        .output_root(&root)
        .build();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let mut runtime = Runtime::new(
        build_core(&cfg),
        rx,
        ProcessBackend::new(tx.clone()),
        Box::new(RealFileSystem),
        RuntimeOptions {
            grace_period: cfg.settings.grace_period,
        },
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
    });

    let started = Instant::now();
    match with_timeout(runtime.run_to_end()).await {
        Err(ForkrunError::Run(RunFailure::Interrupted { rerun })) => {
            assert_eq!(rerun.to_string(), "delayed");
        }
        other => panic!("expected interruption, got {other:?}"),
    }

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(runtime.escalations()[0].exited, vec![1]);
    assert!(root.is_dir());
    assert!(!root.join("delayed_1").exists());
    Ok(())
}

#[test]
fn dropping_the_backend_kills_surviving_process_groups() -> TestResult {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    init_tracing();
    let tmp = tempfile::tempdir()?;
    let pid_file = tmp.path().join("grandchild.pid");

    // The backgrounded sleep is a grandchild in the worker's process group;
    // once killed it is reaped by init, so its pid disappears for real.
    let cfg = ConfigFileBuilder::new()
        .with_command(
            "sleeper",
            &format!("sleep 30 & echo $! > '{}'; wait", pid_file.display()),
        )
        .output_root(tmp.path().join("build"))
        .build();
    let spec = WorkerTemplate::from_config(&cfg).worker_spec(cfg.tasks[0].resolve(), 1);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(8);
    let mut backend = ProcessBackend::new(tx);

    let grandchild: i32 = rt.block_on(async {
        backend.spawn_workers(vec![spec]).await?;
        match with_timeout(rx.recv()).await {
            Some(RuntimeEvent::WorkerStarted { id: 1, pid: Some(_) }) => {}
            other => panic!("expected worker start, got {other:?}"),
        }
        with_timeout(async {
            loop {
                if let Ok(raw) = fs::read_to_string(&pid_file) {
                    if let Ok(pid) = raw.trim().parse::<i32>() {
                        return Ok::<i32, Box<dyn Error>>(pid);
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
    })?;

    // The runtime is idle here, so only the backend's teardown can act.
    drop(backend);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match kill(Pid::from_raw(grandchild), None) {
            Err(Errno::ESRCH) => break,
            Ok(()) if is_zombie(grandchild) => break,
            _ if Instant::now() > deadline => panic!("pid {grandchild} survived teardown"),
            _ => std::thread::sleep(Duration::from_millis(20)),
        }
    }

    drop(rt);
    Ok(())
}

/// Dead but not yet reaped (only detectable where `/proc` exists).
fn is_zombie(pid: i32) -> bool {
    fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let after_comm = stat.rsplit_once(')')?.1;
            after_comm.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}
