//! TaskConfig - serde-loadable task settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ExecutionPolicy, ResultsOnRestart};
use crate::error::TaskError;

/// Interval at which `stop_graceful` checks whether the worker has exited.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Settings for one `Task`.
///
/// Every field has a default, so `{}` is a valid (unbounded, manual start)
/// config.
///
/// ```ignore
/// let config = TaskConfig::from_json(r#"{ "name": "countdown", "executions": 3 }"#)?;
/// let task = Task::from_config(target, &config)?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Raw execution count; anything but a positive integer means unbounded.
    pub executions: ExecutionPolicy,

    pub autostart: bool,

    pub results_on_restart: ResultsOnRestart,

    pub poll_interval_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: None,
            executions: ExecutionPolicy::Unbounded,
            autostart: false,
            results_on_restart: ResultsOnRestart::Keep,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl TaskConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, TaskError> {
        let config: TaskConfig =
            serde_json::from_str(raw).map_err(|e| TaskError::Config(format!("json decode: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        if self.poll_interval_ms == 0 {
            return Err(TaskError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
