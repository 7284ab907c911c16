// src/tasks/mod.rs

//! Task descriptors as they come in from config or the command line.
//!
//! - [`TaskEntry`] is the raw, still-unsplit form (`"id"`, `"id%display"`,
//!   or a table with an explicit command).
//! - [`TaskSpec`] is the resolved descriptor handed to a worker.
//! - [`queue`] holds the FIFO of entries awaiting dispatch.

pub mod queue;

pub use queue::TaskQueue;

use serde::Deserialize;

/// Identifier of a task, as it appears in rerun hints.
pub type TaskId = String;

/// Raw task entry, immutable once enqueued.
///
/// In TOML both forms can be mixed in a single array:
///
/// ```toml
/// tasks = ["spec:models", "spec:features%features", { id = "lint", cmd = "cargo clippy" }]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TaskEntry {
    /// `"id"` or `"id%displayName"`.
    Plain(String),
    /// Structured record with an optional explicit command.
    Detailed {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        cmd: Option<String>,
    },
}

impl TaskEntry {
    /// The identifier without any `%display` alias.
    pub fn id(&self) -> &str {
        match self {
            TaskEntry::Plain(raw) => split_alias(raw).0,
            TaskEntry::Detailed { id, .. } => id,
        }
    }

    /// Resolve into a [`TaskSpec`], splitting a `%` alias if present.
    pub fn resolve(&self) -> TaskSpec {
        match self {
            TaskEntry::Plain(raw) => {
                let (id, display) = split_alias(raw);
                TaskSpec {
                    id: id.to_string(),
                    display_name: display.unwrap_or(id).to_string(),
                    command: None,
                }
            }
            TaskEntry::Detailed { id, name, cmd } => TaskSpec {
                id: id.clone(),
                display_name: name
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(id)
                    .to_string(),
                command: cmd.clone(),
            },
        }
    }
}

impl From<&str> for TaskEntry {
    fn from(raw: &str) -> Self {
        TaskEntry::Plain(raw.to_string())
    }
}

impl From<String> for TaskEntry {
    fn from(raw: String) -> Self {
        TaskEntry::Plain(raw)
    }
}

/// Resolved task descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: TaskId,
    /// Human-readable name used in logs and output directory names.
    pub display_name: String,
    /// Explicit shell command overriding the configured invocation.
    pub command: Option<String>,
}

/// Split `"id%display"` into its parts.
///
/// Anything after a second `%` is dropped, and an empty display part counts
/// as absent.
fn split_alias(raw: &str) -> (&str, Option<&str>) {
    let mut parts = raw.split('%');
    let id = parts.next().unwrap_or_default();
    let display = parts.next().filter(|d| !d.is_empty());
    (id, display)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_entry_defaults_display_to_id() {
        let spec = TaskEntry::from("spec:models").resolve();
        assert_eq!(spec.id, "spec:models");
        assert_eq!(spec.display_name, "spec:models");
        assert_eq!(spec.command, None);
    }

    #[test]
    fn alias_is_split_on_percent() {
        let spec = TaskEntry::from("spec:features[fast]%features").resolve();
        assert_eq!(spec.id, "spec:features[fast]");
        assert_eq!(spec.display_name, "features");
    }

    #[test]
    fn empty_or_extra_alias_parts() {
        assert_eq!(TaskEntry::from("a%").resolve().display_name, "a");
        assert_eq!(TaskEntry::from("a%b%c").resolve().display_name, "b");
        assert_eq!(TaskEntry::from("a%b%c").id(), "a");
    }

    #[test]
    fn detailed_entry_keeps_command() {
        let entry = TaskEntry::Detailed {
            id: "lint".into(),
            name: None,
            cmd: Some("cargo clippy".into()),
        };
        let spec = entry.resolve();
        assert_eq!(spec.display_name, "lint");
        assert_eq!(spec.command.as_deref(), Some("cargo clippy"));
    }
}
