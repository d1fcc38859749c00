//! SharedChannel - the only state both sides of the worker boundary see.
//!
//! Anything the controller reads back after (or while) a worker runs goes
//! through here: results, lifecycle state, failure detail and run history.
//! A value the target writes anywhere else is not part of the contract.
//!
//! # 実装詳細
//! - `Arc<Mutex<..>>` で controller と worker が同じ領域を共有
//! - append / snapshot は 1 回のロックで完結（ロック跨ぎ await しない）
//! - poison は回復する（append-only なので途中状態は壊れない）

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::{RunId, RunRecord, TaskState};
use crate::error::TargetFailure;

struct ChannelState<T> {
    results: Vec<T>,
    state: TaskState,
    failure: Option<TargetFailure>,
    invocations: u64,
    runs: Vec<RunRecord>,
}

/// Mutex-guarded region shared between a `Task` and its worker context.
pub struct SharedChannel<T> {
    inner: Arc<Mutex<ChannelState<T>>>,
}

impl<T> Clone for SharedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SharedChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedChannel<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelState {
                results: Vec::new(),
                state: TaskState::Created,
                failure: None,
                invocations: 0,
                runs: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one result from the worker side.
    pub(crate) fn push(&self, value: T) {
        let mut guard = self.lock();
        guard.results.push(value);
        guard.invocations += 1;
        if let Some(run) = guard.runs.last_mut() {
            run.invocations += 1;
        }
    }

    /// Open a new run; the previous failure (if any) belongs to the old run.
    pub(crate) fn begin_run(&self, run_id: RunId) {
        let mut guard = self.lock();
        guard.state = TaskState::Running;
        guard.failure = None;
        guard.runs.push(RunRecord::open(run_id));
    }

    /// Close `run_id` with `outcome`.
    ///
    /// Returns false when the run was already closed, e.g. a worker that
    /// completed right before the controller aborted it.
    pub(crate) fn finish(&self, run_id: RunId, outcome: TaskState) -> bool {
        self.close(run_id, outcome, None)
    }

    pub(crate) fn fail(&self, run_id: RunId, failure: TargetFailure) -> bool {
        self.close(run_id, TaskState::Failed, Some(failure))
    }

    fn close(&self, run_id: RunId, outcome: TaskState, failure: Option<TargetFailure>) -> bool {
        let mut guard = self.lock();
        let Some(run) = guard.runs.iter_mut().rev().find(|r| r.run_id == run_id) else {
            return false;
        };
        if !run.close(outcome) {
            return false;
        }
        guard.state = outcome;
        guard.failure = failure;
        true
    }

    pub(crate) fn clear(&self) {
        self.lock().results.clear();
    }

    /// Remove and return everything appended so far, in order.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut self.lock().results)
    }

    pub fn len(&self) -> usize {
        self.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    pub fn failure(&self) -> Option<TargetFailure> {
        self.lock().failure.clone()
    }

    /// Successful invocations across every run, including drained results.
    pub fn invocations(&self) -> u64 {
        self.lock().invocations
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.lock().runs.clone()
    }
}

impl<T: Clone> SharedChannel<T> {
    /// Copy of the current results, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().results.clone()
    }
}
