// tests/config_files.rs

use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use forkrun::config::{load_and_validate, ConfigFile};
use forkrun::errors::ForkrunError;
use forkrun::tasks::TaskEntry;
use forkrun::types::FailurePolicy;

type TestResult = Result<(), Box<dyn Error>>;

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn load_str(contents: &str) -> Result<ConfigFile, ForkrunError> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    load_and_validate(file.path())
}

#[test]
fn demo_config_loads_with_mixed_task_forms() -> TestResult {
    let cfg = load_and_validate(demo("Forkrun.toml"))?;

    assert_eq!(cfg.settings.capacity, 2);
    assert_eq!(cfg.settings.policy, FailurePolicy::CollectAll);
    assert_eq!(cfg.settings.output_root, PathBuf::from("tmp/build"));
    assert_eq!(cfg.settings.grace_period, Duration::from_secs(5));
    assert_eq!(cfg.settings.stagger, Duration::from_millis(100));
    assert!(cfg.worker.setup.is_some());

    let resolved: Vec<(String, String)> = cfg
        .tasks
        .iter()
        .map(|t| {
            let spec = t.resolve();
            (spec.id, spec.display_name)
        })
        .collect();
    assert_eq!(
        resolved,
        vec![
            ("spec:models".to_string(), "spec:models".to_string()),
            ("spec:controllers".to_string(), "spec:controllers".to_string()),
            ("spec:features".to_string(), "features".to_string()),
            ("lint".to_string(), "style".to_string()),
        ]
    );
    assert!(matches!(&cfg.tasks[3], TaskEntry::Detailed { cmd: Some(_), .. }));
    Ok(())
}

#[test]
fn fail_fast_demo_uses_policy_key() -> TestResult {
    let cfg = load_and_validate(demo("fail-fast.toml"))?;
    assert_eq!(cfg.settings.policy, FailurePolicy::FailFast);
    assert_eq!(cfg.settings.stagger, Duration::ZERO);
    assert_eq!(cfg.tasks.len(), 3);
    Ok(())
}

#[test]
fn empty_file_is_an_empty_run_with_defaults() -> TestResult {
    let cfg = load_str("")?;
    assert!(cfg.tasks.is_empty());
    assert_eq!(cfg.settings.isolation_var, "TEST_ENV_NUMBER");
    assert_eq!(cfg.worker.invoke, vec!["sh", "-c", "{task}"]);
    Ok(())
}

#[test]
fn rejects_zero_capacity() {
    let err = load_str("[config]\ncapacity = 0\n").unwrap_err();
    assert!(matches!(err, ForkrunError::ConfigError(ref m) if m.contains("capacity")), "{err}");
}

#[test]
fn rejects_unknown_keys() {
    let err = load_str("[config]\nworkers = 3\n").unwrap_err();
    assert!(matches!(err, ForkrunError::TomlError(_)), "{err}");
}

#[test]
fn rejects_bad_durations() {
    let err = load_str("[config]\ngrace_period = \"soon\"\n").unwrap_err();
    assert!(matches!(err, ForkrunError::ConfigError(ref m) if m.contains("grace_period")), "{err}");
}

#[test]
fn rejects_contradicting_policy() {
    let err = load_str("[config]\nfail_fast = true\npolicy = \"collect_all\"\n").unwrap_err();
    assert!(matches!(err, ForkrunError::ConfigError(_)), "{err}");
}

#[test]
fn rejects_task_ids_with_whitespace() {
    let err = load_str("tasks = [\"spec models\"]\n").unwrap_err();
    assert!(matches!(err, ForkrunError::ConfigError(ref m) if m.contains("whitespace")), "{err}");
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Forkrun.toml").unwrap_err();
    assert!(matches!(err, ForkrunError::IoError(_)), "{err}");
}
