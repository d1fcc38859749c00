//! RunRecord - one execution context's bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RunId;
use super::state::TaskState;

/// History entry for a single `start()`.
///
/// Written by both sides of the boundary: the controller opens it, the worker
/// counts invocations and closes it (or the controller closes it after a
/// forced stop).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Target invocations that returned a value during this run.
    pub invocations: u64,

    /// Terminal state of this run, `None` while it is live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TaskState>,
}

impl RunRecord {
    pub fn open(run_id: RunId) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            invocations: 0,
            outcome: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.outcome.is_none()
    }

    /// Close the record. Only the first close wins.
    pub fn close(&mut self, outcome: TaskState) -> bool {
        if !self.is_open() {
            return false;
        }
        self.finished_at = Some(Utc::now());
        self.outcome = Some(outcome);
        true
    }
}
