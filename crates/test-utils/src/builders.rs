#![allow(dead_code)]

use std::path::{Path, PathBuf};

use forkrun::config::{ConfigFile, RawConfigFile};
use forkrun::engine::{CoreOptions, CoreRuntime};
use forkrun::exec::WorkerTemplate;
use forkrun::tasks::TaskEntry;
use forkrun::types::FailurePolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.config.stagger = "0ms".to_string();
        Self { config }
    }

    pub fn with_task(mut self, entry: impl Into<TaskEntry>) -> Self {
        self.config.tasks.push(entry.into());
        self
    }

    pub fn with_tasks<I, E>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<TaskEntry>,
    {
        self.config.tasks.extend(entries.into_iter().map(Into::into));
        self
    }

    /// A task with an explicit shell command.
    pub fn with_command(mut self, id: &str, cmd: &str) -> Self {
        self.config.tasks.push(TaskEntry::Detailed {
            id: id.to_string(),
            name: None,
            cmd: Some(cmd.to_string()),
        });
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.config.capacity = capacity;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.config.config.fail_fast = Some(fail_fast);
        self
    }

    pub fn output_root(mut self, root: impl AsRef<Path>) -> Self {
        self.config.config.output_root = root.as_ref().to_path_buf();
        self
    }

    pub fn grace_period(mut self, grace: &str) -> Self {
        self.config.config.grace_period = grace.to_string();
        self
    }

    pub fn stagger(mut self, stagger: &str) -> Self {
        self.config.config.stagger = stagger.to_string();
        self
    }

    pub fn setup(mut self, setup: &str) -> Self {
        self.config.worker.setup = Some(setup.to_string());
        self
    }

    pub fn invoke(mut self, argv: &[&str]) -> Self {
        self.config.worker.invoke = argv.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A core over plain task strings with a throwaway output root.
pub fn core_for(tasks: &[&str], capacity: usize, policy: FailurePolicy) -> CoreRuntime {
    CoreRuntime::new(
        tasks.iter().map(|t| TaskEntry::from(*t)).collect(),
        CoreOptions { capacity, policy },
        WorkerTemplate {
            output_root: PathBuf::from("out"),
            isolation_var: "TEST_ENV_NUMBER".to_string(),
            invoke: vec!["sh".to_string(), "-c".to_string(), "{task}".to_string()],
            setup: None,
            working_dir: None,
            stagger: std::time::Duration::ZERO,
        },
    )
}
