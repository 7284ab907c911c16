// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `forkrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "forkrun",
    version,
    about = "Run independent tasks across a bounded pool of worker processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Number of concurrent workers (overrides `[config].capacity`).
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Abort the whole run on the first failing task.
    #[arg(long, conflicts_with = "keep_going")]
    pub fail_fast: bool,

    /// Run every task and report all failures at the end.
    #[arg(long)]
    pub keep_going: bool,

    /// Directory receiving per-worker output (wiped at start).
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FORKRUN_LOG` or `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the plan (tasks, output dirs, commands) without running anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Tasks to run instead of the configured list.
    ///
    /// Each argument may itself hold several whitespace-separated tasks, so a
    /// printed rerun hint can be passed back as a single quoted argument.
    #[arg(value_name = "TASK")]
    pub tasks: Vec<String>,
}

impl CliArgs {
    /// Positional tasks split on whitespace; empty when none were given.
    pub fn task_list(&self) -> Vec<String> {
        self.tasks
            .iter()
            .flat_map(|t| t.split_whitespace())
            .map(str::to_string)
            .collect()
    }

    /// Policy override from `--fail-fast` / `--keep-going`.
    pub fn fail_fast_override(&self) -> Option<bool> {
        match (self.fail_fast, self.keep_going) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_tasks_are_split_on_whitespace() {
        let args = CliArgs::parse_from(["forkrun", "-j", "3", "a b", "c%C"]);
        assert_eq!(args.jobs, Some(3));
        assert_eq!(args.task_list(), vec!["a", "b", "c%C"]);
        assert_eq!(args.fail_fast_override(), None);
        assert_eq!(args.config, PathBuf::from("Forkrun.toml"));
    }

    #[test]
    fn policy_flags_conflict() {
        assert!(CliArgs::try_parse_from(["forkrun", "--fail-fast", "--keep-going"]).is_err());
        let args = CliArgs::try_parse_from(["forkrun", "--keep-going"]).unwrap();
        assert_eq!(args.fail_fast_override(), Some(false));
    }
}
