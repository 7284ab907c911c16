// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::tasks::TaskEntry;
use crate::types::FailurePolicy;

/// Top-level configuration as read from `Forkrun.toml`.
///
/// ```toml
/// tasks = ["spec:models", "spec:features%features"]
///
/// [config]
/// capacity = 4
/// fail_fast = true
///
/// [worker]
/// setup = "bin/rake db:create db:test:prepare"
/// invoke = ["bundle", "exec", "rake", "{task}"]
/// ```
///
/// Everything is optional; an empty file is a valid (empty) run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,

    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub worker: WorkerSection,
}

/// `[config]` section, unvalidated.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Number of concurrent workers.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Shorthand for `policy = "fail_fast"`.
    #[serde(default)]
    pub fail_fast: Option<bool>,

    #[serde(default)]
    pub policy: Option<FailurePolicy>,

    /// Wiped and recreated at the start of every run.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Environment variable carrying the isolation index into each worker.
    #[serde(default = "default_isolation_var")]
    pub isolation_var: String,

    /// How long interrupted workers get before they are killed.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    /// Start-up delay per isolation index.
    #[serde(default = "default_stagger")]
    pub stagger: String,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_capacity() -> usize {
    2
}

fn default_output_root() -> PathBuf {
    PathBuf::from("tmp").join("build")
}

fn default_isolation_var() -> String {
    "TEST_ENV_NUMBER".to_string()
}

fn default_grace_period() -> String {
    "5s".to_string()
}

fn default_stagger() -> String {
    "100ms".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            fail_fast: None,
            policy: None,
            output_root: default_output_root(),
            isolation_var: default_isolation_var(),
            grace_period: default_grace_period(),
            stagger: default_stagger(),
            working_dir: None,
        }
    }
}

/// `[worker]` section: how a worker turns a task into a process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSection {
    /// Shell snippet run inside the worker before the task.
    #[serde(default)]
    pub setup: Option<String>,

    /// Argv template; `{task}`, `{name}` and `{index}` are substituted.
    #[serde(default = "default_invoke")]
    pub invoke: Vec<String>,
}

fn default_invoke() -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), "{task}".to_string()]
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            setup: None,
            invoke: default_invoke(),
        }
    }
}

/// Validated run settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub capacity: usize,
    pub policy: FailurePolicy,
    pub output_root: PathBuf,
    pub isolation_var: String,
    pub grace_period: Duration,
    pub stagger: Duration,
    pub working_dir: Option<PathBuf>,
}

/// Validated configuration. Build one with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub tasks: Vec<TaskEntry>,
    pub settings: RunSettings,
    pub worker: WorkerSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        tasks: Vec<TaskEntry>,
        settings: RunSettings,
        worker: WorkerSection,
    ) -> Self {
        Self {
            tasks,
            settings,
            worker,
        }
    }
}
