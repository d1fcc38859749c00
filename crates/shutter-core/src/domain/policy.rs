//! Execution policies: how many times a worker invokes its target, and what a
//! restart does with results gathered by earlier runs.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How many times the worker loop invokes the target.
///
/// - `Bounded(n)`: exactly `n` invocations, then the run completes on its own.
/// - `Unbounded`: invoke until the cancel flag is observed.
///
/// Any count that is not a positive integer (zero, negative, fractional,
/// missing) normalizes to `Unbounded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionPolicy {
    Bounded(NonZeroU64),
    #[default]
    Unbounded,
}

impl ExecutionPolicy {
    /// Build a policy from a signed execution count.
    pub fn from_count(executions: i64) -> Self {
        u64::try_from(executions)
            .ok()
            .map_or(Self::Unbounded, Self::bounded)
    }

    /// `bounded(0)` is `Unbounded`.
    pub fn bounded(executions: u64) -> Self {
        NonZeroU64::new(executions).map_or(Self::Unbounded, Self::Bounded)
    }

    /// Build a policy from an untyped JSON value.
    ///
    /// Only integral numbers can produce `Bounded`; `3.0`, `"3"`, `null`
    /// and friends are `Unbounded`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        if let Some(n) = value.as_u64() {
            return Self::bounded(n);
        }
        value.as_i64().map_or(Self::Unbounded, Self::from_count)
    }

    /// Invocation limit, `None` when unbounded.
    pub fn limit(&self) -> Option<u64> {
        match self {
            Self::Bounded(n) => Some(n.get()),
            Self::Unbounded => None,
        }
    }
}

impl fmt::Display for ExecutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(n) => write!(f, "bounded({n})"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

// 設定ファイル上は「回数」そのもので表現する（0 = unbounded）
impl Serialize for ExecutionPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.limit().unwrap_or(0))
    }
}

impl<'de> Deserialize<'de> for ExecutionPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(raw.map_or(Self::Unbounded, |value| Self::from_json(&value)))
    }
}

/// What `restart()` does with results accumulated by previous runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultsOnRestart {
    /// Keep appending to the existing sequence.
    #[default]
    Keep,
    /// Start each restarted run with an empty sequence.
    Clear,
}
