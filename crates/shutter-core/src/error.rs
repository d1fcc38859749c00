use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned to the controller by `Task` lifecycle calls.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task is already running; stop or restart it first")]
    AlreadyRunning,

    #[error("no tokio runtime is available to spawn the worker")]
    NoRuntime,

    #[error("worker did not exit within {0:?}")]
    StopTimeout(Duration),

    #[error("invalid task config: {0}")]
    Config(String),
}

/// What a target returns when an invocation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("{0}")]
    Failed(String),
}

impl From<String> for TargetError {
    fn from(message: String) -> Self {
        TargetError::Failed(message)
    }
}

impl From<&str> for TargetError {
    fn from(message: &str) -> Self {
        TargetError::Failed(message.to_string())
    }
}

/// Why a worker context ended in `TaskState::Failed`.
///
/// Recorded in the shared channel so the controller can read it after the
/// worker is gone.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum TargetFailure {
    #[error("target raised: {0}")]
    Raised(String),

    #[error("target panicked: {0}")]
    Panicked(String),
}

impl TargetFailure {
    pub fn message(&self) -> &str {
        match self {
            TargetFailure::Raised(m) | TargetFailure::Panicked(m) => m,
        }
    }
}
