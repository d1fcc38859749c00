//! Task lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// TaskState はタスクのライフサイクル
///
/// State transitions:
/// - Created -> Running -> Completed (bounded policy exhausted)
/// - Created -> Running -> Stopped (graceful or immediate stop)
/// - Created -> Running -> Failed (target returned an error or panicked)
/// - Completed | Stopped | Failed -> Running (restart)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Built but never started.
    Created,

    /// A worker context is executing the loop.
    Running,

    /// Bounded policy ran to the end.
    Completed,

    /// Cancelled by the controller.
    Stopped,

    /// The target failed; the detail lives next to the results.
    Failed,
}

impl TaskState {
    /// Is this a state a run ends in?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Stopped | TaskState::Failed
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Created => "created",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Stopped => "stopped",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}
