// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, ConfigSection, RawConfigFile, RunSettings, WorkerSection};
use crate::errors::{ForkrunError, Result};
use crate::tasks::TaskEntry;
use crate::types::FailurePolicy;

/// Upper bound for `grace_period` and `stagger`.
pub const MAX_CONFIG_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ForkrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_tasks(&raw.tasks)?;
        validate_worker(&raw.worker)?;
        let settings = resolve_settings(&raw.config)?;
        Ok(ConfigFile::new_unchecked(raw.tasks, settings, raw.worker))
    }
}

/// Task identifiers end up in whitespace-separated rerun hints, so they must
/// be non-empty and contain no whitespace.
pub fn validate_tasks(tasks: &[TaskEntry]) -> Result<()> {
    for entry in tasks {
        let id = entry.id();
        if id.is_empty() {
            return Err(config_error(format!("task entry {entry:?} has an empty id")));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(config_error(format!(
                "task id '{id}' must not contain whitespace"
            )));
        }
        if let TaskEntry::Detailed { cmd: Some(cmd), .. } = entry {
            if cmd.trim().is_empty() {
                return Err(config_error(format!("task '{id}' has an empty `cmd`")));
            }
        }
    }
    Ok(())
}

fn validate_worker(worker: &WorkerSection) -> Result<()> {
    match worker.invoke.first() {
        None => {
            return Err(config_error("[worker].invoke must not be empty".to_string()));
        }
        Some(program) if program.trim().is_empty() => {
            return Err(config_error(
                "[worker].invoke must start with a program name".to_string(),
            ));
        }
        Some(_) => {}
    }

    if let Some(setup) = &worker.setup {
        if setup.trim().is_empty() {
            return Err(config_error(
                "[worker].setup must not be blank (omit it instead)".to_string(),
            ));
        }
    }
    Ok(())
}

fn resolve_settings(cfg: &ConfigSection) -> Result<RunSettings> {
    if cfg.capacity == 0 {
        return Err(config_error(
            "[config].capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    let var = cfg.isolation_var.as_str();
    if var.is_empty() || var.contains('=') || var.contains('\0') {
        return Err(config_error(format!(
            "[config].isolation_var '{var}' is not a valid environment variable name"
        )));
    }

    let policy = match (cfg.fail_fast, cfg.policy) {
        (Some(fail_fast), Some(policy)) if policy.is_fail_fast() != fail_fast => {
            return Err(config_error(format!(
                "[config].fail_fast = {fail_fast} contradicts policy = \"{policy}\""
            )));
        }
        (_, Some(policy)) => policy,
        (Some(fail_fast), None) => FailurePolicy::from_fail_fast(fail_fast),
        (None, None) => FailurePolicy::default(),
    };

    let grace_period = bounded_duration("grace_period", &cfg.grace_period)?;
    let stagger = bounded_duration("stagger", &cfg.stagger)?;

    Ok(RunSettings {
        capacity: cfg.capacity,
        policy,
        output_root: cfg.output_root.clone(),
        isolation_var: cfg.isolation_var.clone(),
        grace_period,
        stagger,
        working_dir: cfg.working_dir.clone(),
    })
}

fn bounded_duration(key: &str, raw: &str) -> Result<Duration> {
    let value =
        parse_duration(raw).map_err(|e| config_error(format!("[config].{key}: {e}")))?;
    if value > MAX_CONFIG_DURATION {
        return Err(config_error(format!(
            "[config].{key} = \"{raw}\" exceeds the maximum of 24h"
        )));
    }
    Ok(value)
}

fn config_error(msg: String) -> ForkrunError {
    ForkrunError::ConfigError(msg)
}
