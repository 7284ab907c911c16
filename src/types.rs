use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// What the run does when a worker exits non-zero.
///
/// - `FailFast`: stop dispatching, interrupt every live worker and abort.
/// - `CollectAll`: keep dispatching until the queue is drained, then report
///   every failed task at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    FailFast,
    CollectAll,
}

impl FailurePolicy {
    pub fn from_fail_fast(fail_fast: bool) -> Self {
        if fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::CollectAll
        }
    }

    pub fn is_fail_fast(self) -> bool {
        matches!(self, FailurePolicy::FailFast)
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::CollectAll
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailFast => f.write_str("fail_fast"),
            FailurePolicy::CollectAll => f.write_str("collect_all"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(FailurePolicy::FailFast),
            "collect_all" => Ok(FailurePolicy::CollectAll),
            other => Err(format!(
                "invalid failure policy: {other} (expected \"fail_fast\" or \"collect_all\")"
            )),
        }
    }
}
