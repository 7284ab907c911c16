// src/exec/command.rs

//! Turning a task into a self-contained worker description.
//!
//! A [`WorkerSpec`] carries everything the supervisor needs to start the
//! worker process (argv, environment overrides, working directory, output
//! directory, start-up delay) so nothing is captured from orchestrator state
//! after dispatch.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::config::ConfigFile;
use crate::engine::WorkerId;
use crate::tasks::TaskSpec;

/// File inside each worker's output directory receiving stdout.
pub const STDOUT_FILE: &str = "stdout";
/// File inside each worker's output directory receiving stderr.
pub const STDERR_FILE: &str = "stderr";

static UNSAFE_PATH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex"));

/// Program + arguments + environment for one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Full argv, program first.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Everything needed to start one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Isolation index; doubles as the worker's identity for this run.
    pub id: WorkerId,
    pub task: TaskSpec,
    pub output_dir: PathBuf,
    pub command: CommandSpec,
    /// Delay before the process is created.
    pub stagger: Duration,
}

impl WorkerSpec {
    pub fn stdout_path(&self) -> PathBuf {
        self.output_dir.join(STDOUT_FILE)
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.output_dir.join(STDERR_FILE)
    }
}

/// Run-wide recipe for building [`WorkerSpec`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTemplate {
    pub output_root: PathBuf,
    pub isolation_var: String,
    /// Argv template with `{task}`, `{name}` and `{index}` placeholders.
    pub invoke: Vec<String>,
    /// Setup hook run by the worker's shell before the task.
    pub setup: Option<String>,
    pub working_dir: Option<PathBuf>,
    /// Per-index start-up delay.
    pub stagger: Duration,
}

impl WorkerTemplate {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            output_root: cfg.settings.output_root.clone(),
            isolation_var: cfg.settings.isolation_var.clone(),
            invoke: cfg.worker.invoke.clone(),
            setup: cfg.worker.setup.clone(),
            working_dir: cfg.settings.working_dir.clone(),
            stagger: cfg.settings.stagger,
        }
    }

    /// Build the worker for `task` at isolation index `index`.
    pub fn worker_spec(&self, task: TaskSpec, index: WorkerId) -> WorkerSpec {
        let output_dir = output_dir_for(&self.output_root, &task.display_name, index);
        let command = self.command_for(&task, index);
        let stagger = self
            .stagger
            .saturating_mul(u32::try_from(index).unwrap_or(u32::MAX));

        WorkerSpec {
            id: index,
            task,
            output_dir,
            command,
            stagger,
        }
    }

    fn command_for(&self, task: &TaskSpec, index: WorkerId) -> CommandSpec {
        let task_argv: Vec<String> = match &task.command {
            Some(cmd) => vec!["sh".to_string(), "-c".to_string(), cmd.clone()],
            None => self
                .invoke
                .iter()
                .map(|part| substitute(part, task, index))
                .collect(),
        };

        // With a setup hook, hook and task share one shell process so the
        // hook's exit status is the worker's exit status when it fails.
        let argv = match &self.setup {
            Some(setup) => {
                let script = format!("{setup}\nstatus=$?\n[ \"$status\" -eq 0 ] || exit \"$status\"\nexec \"$@\"");
                let mut argv = vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    script,
                    "sh".to_string(),
                ];
                argv.extend(task_argv);
                argv
            }
            None => task_argv,
        };

        let mut argv = argv.into_iter();
        let program = argv.next().unwrap_or_else(|| "sh".to_string());

        CommandSpec {
            program,
            args: argv.collect(),
            env: vec![(self.isolation_var.clone(), index.to_string())],
            cwd: self.working_dir.clone(),
        }
    }
}

/// `<root>/<sanitized display name>_<index>`.
///
/// The index keeps directories distinct even when display names collide.
pub fn output_dir_for(root: &Path, display_name: &str, index: WorkerId) -> PathBuf {
    root.join(format!("{}_{}", sanitize_name(display_name), index))
}

/// Replace runs of characters that are unsafe in a directory name with `_`.
pub fn sanitize_name(name: &str) -> String {
    let cleaned = UNSAFE_PATH_CHARS.replace_all(name, "_");
    match cleaned.as_ref() {
        "" | "." | ".." => "task".to_string(),
        other => other.to_string(),
    }
}

fn substitute(part: &str, task: &TaskSpec, index: WorkerId) -> String {
    part.replace("{task}", &task.id)
        .replace("{name}", &task.display_name)
        .replace("{index}", &index.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskEntry;

    fn template() -> WorkerTemplate {
        WorkerTemplate {
            output_root: PathBuf::from("tmp/build"),
            isolation_var: "TEST_ENV_NUMBER".into(),
            invoke: vec!["rake".into(), "{task}".into()],
            setup: None,
            working_dir: None,
            stagger: Duration::from_millis(100),
        }
    }

    #[test]
    fn sanitizes_separators() {
        assert_eq!(sanitize_name("spec:models"), "spec_models");
        assert_eq!(sanitize_name("a b/c::d"), "a_b_c_d");
        assert_eq!(sanitize_name(".."), "task");
        assert_eq!(sanitize_name("build-1.2"), "build-1.2");
    }

    #[test]
    fn output_dirs_differ_for_duplicate_names() {
        let root = Path::new("out");
        assert_ne!(output_dir_for(root, "x", 1), output_dir_for(root, "x", 2));
        assert_eq!(output_dir_for(root, "build:a", 3), root.join("build_a_3"));
    }

    #[test]
    fn invoke_template_is_substituted() {
        let task = TaskEntry::from("spec:models[fast]%models").resolve();
        let spec = template().worker_spec(task, 3);

        assert_eq!(spec.command.argv(), vec!["rake", "spec:models[fast]"]);
        assert_eq!(
            spec.command.env,
            vec![("TEST_ENV_NUMBER".to_string(), "3".to_string())]
        );
        assert_eq!(spec.output_dir, PathBuf::from("tmp/build/models_3"));
        assert_eq!(spec.stagger, Duration::from_millis(300));
        assert_eq!(spec.stdout_path(), PathBuf::from("tmp/build/models_3/stdout"));
    }

    #[test]
    fn explicit_command_overrides_invoke() {
        let task = TaskEntry::Detailed {
            id: "lint".into(),
            name: None,
            cmd: Some("cargo clippy".into()),
        }
        .resolve();
        let spec = template().worker_spec(task, 1);
        assert_eq!(spec.command.argv(), vec!["sh", "-c", "cargo clippy"]);
    }

    #[test]
    fn setup_hook_wraps_task_argv() {
        let mut tpl = template();
        tpl.setup = Some("rake db:create".into());
        let spec = tpl.worker_spec(TaskEntry::from("spec").resolve(), 1);

        let argv = spec.command.argv();
        assert_eq!(argv[0], "sh");
        assert_eq!(argv[1], "-c");
        assert!(argv[2].starts_with("rake db:create\n"));
        assert!(argv[2].ends_with("exec \"$@\""));
        assert_eq!(&argv[3..], &["sh", "rake", "spec"]);
    }
}
