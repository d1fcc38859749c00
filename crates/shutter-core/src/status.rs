use serde::{Deserialize, Serialize};

use crate::domain::{ExecutionPolicy, RunId, TaskId, TaskState};
use crate::error::TargetFailure;

/// Point-in-time view of a `Task`, for logs and kiosk status pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: TaskId,
    pub name: String,
    pub policy: ExecutionPolicy,
    pub state: TaskState,
    pub alive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,

    pub runs: usize,
    pub invocations: u64,

    /// Results currently held (drained results are not counted).
    pub pending_results: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<TargetFailure>,
}
