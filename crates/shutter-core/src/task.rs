//! Task - owns one recurring or one-shot unit of background work.
//!
//! # ライフサイクル
//! `created → running → (completed | stopped | failed) → [restart → running]`
//!
//! # 実行コンテキスト
//! - worker は tokio runtime 上の独立したタスクとして spawn する
//! - controller が持つのは `JoinHandle` と cancel フラグ（`watch::Sender<bool>`）だけ
//! - 結果・状態はすべて `SharedChannel` 経由で読み戻す
//!
//! # 停止
//! - `stop_graceful`: フラグを立てて worker が次のイテレーション先頭で抜けるのを待つ
//! - `stop_immediately`: `JoinHandle::abort()` で強制終了し、終了を確認してから返る
//!
//! abort が効くのは target が `.await` で止まっている地点だけ。スレッドを同期的に
//! ブロックする処理は [`CommandTarget`](crate::command::CommandTarget) で子プロセスに
//! 出す。子プロセスは abort 時に SIGKILL されるので、syscall の途中でも止まる。
//!
//! Bounded policy の worker はフラグを見ない。bounded task を途中で止めるには
//! `stop_immediately` を使う。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::channel::SharedChannel;
use crate::config::{DEFAULT_POLL_INTERVAL, TaskConfig};
use crate::domain::{ExecutionPolicy, ResultsOnRestart, RunId, RunRecord, TaskId, TaskState};
use crate::error::{TargetFailure, TaskError};
use crate::status::TaskStatus;
use crate::target::Target;

/// A managed background worker around a [`Target`].
///
/// # 使用例
/// ```ignore
/// let mut attract = Task::new(from_fn(|| async { blink("shutter_rdy").await }), 0);
/// attract.start()?;
/// // ... capture button pressed
/// attract.stop_immediately().await?;
/// ```
///
/// Dropping a `Task` aborts its live worker, if any.
pub struct Task<G: Target> {
    id: TaskId,
    name: String,
    target: Arc<G>,
    policy: ExecutionPolicy,
    results_on_restart: ResultsOnRestart,
    poll_interval: Duration,
    channel: SharedChannel<G::Output>,
    cancel_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
    run_id: Option<RunId>,
}

impl<G: Target> Task<G> {
    /// Build a task that is not started yet.
    ///
    /// `executions <= 0` means unbounded.
    pub fn new(target: G, executions: i64) -> Self {
        Self::builder(target).executions(executions).assemble()
    }

    pub fn builder(target: G) -> TaskBuilder<G> {
        TaskBuilder::new(target)
    }

    /// Build from a loaded config, starting right away when `autostart` is set.
    pub fn from_config(target: G, config: &TaskConfig) -> Result<Self, TaskError> {
        config.validate()?;
        Self::builder(target).config(config).build()
    }

    /// Spawn a fresh worker context.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), TaskError> {
        if self.is_alive() {
            return Err(TaskError::AlreadyRunning);
        }
        let runtime = Handle::try_current().map_err(|_| TaskError::NoRuntime)?;
        self.reap();

        // フラグは run ごとに作り直す（前回の stop の影響を持ち越さない）
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let run_id = RunId::generate();
        self.channel.begin_run(run_id);

        let worker = Worker {
            task_name: self.name.clone(),
            run_id,
            target: Arc::clone(&self.target),
            policy: self.policy,
            channel: self.channel.clone(),
            cancel_rx,
        };
        self.handle = Some(runtime.spawn(worker.run()));
        self.cancel_tx = Some(cancel_tx);
        self.run_id = Some(run_id);

        info!(task = %self.name, run = %run_id, policy = %self.policy, "task started");
        Ok(())
    }

    /// Ask the worker to stop at its next iteration boundary and wait for it.
    ///
    /// Polls every `poll_interval` until the worker has exited. There is no
    /// timeout: a target that never returns blocks this call forever. Use
    /// [`stop_graceful_timeout`](Self::stop_graceful_timeout) to bound it.
    ///
    /// A bounded worker does not look at the flag, so this waits for it to
    /// finish all of its invocations.
    pub async fn stop_graceful(&mut self) -> Result<(), TaskError> {
        if self.handle.is_none() {
            return Ok(());
        }
        self.signal_cancel();
        self.wait_for_exit().await;
        self.release().await;

        info!(task = %self.name, state = %self.state(), "task stopped gracefully");
        Ok(())
    }

    /// Like [`stop_graceful`](Self::stop_graceful) but gives up after `timeout`.
    ///
    /// On timeout the flag stays set and the worker is still owned by this
    /// task, so the caller can escalate to `stop_immediately`.
    pub async fn stop_graceful_timeout(&mut self, timeout: Duration) -> Result<(), TaskError> {
        if self.handle.is_none() {
            return Ok(());
        }
        self.signal_cancel();
        if tokio::time::timeout(timeout, self.wait_for_exit()).await.is_err() {
            warn!(task = %self.name, ?timeout, "worker did not reach a stop point in time");
            return Err(TaskError::StopTimeout(timeout));
        }
        self.release().await;

        info!(task = %self.name, state = %self.state(), "task stopped gracefully");
        Ok(())
    }

    /// Terminate the worker without waiting for an iteration boundary.
    ///
    /// The in-flight invocation is dropped wherever it is suspended; whatever
    /// side effect it had started is left as is. Results appended before the
    /// abort are kept. The worker is gone when this returns.
    ///
    /// A [`CommandTarget`](crate::command::CommandTarget) child is killed along
    /// with the worker, even while it is blocked in a syscall. An in-process
    /// target that blocks its thread without awaiting delays this call until
    /// the blocking section returns.
    pub async fn stop_immediately(&mut self) -> Result<(), TaskError> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        handle.abort();
        self.signal_cancel();
        self.release().await;

        info!(task = %self.name, state = %self.state(), "task stopped immediately");
        Ok(())
    }

    /// Stop (immediately) if running, then start a fresh run with the same
    /// target and policy.
    pub async fn restart(&mut self) -> Result<(), TaskError> {
        if self.handle.is_some() {
            self.stop_immediately().await?;
        }
        if self.results_on_restart == ResultsOnRestart::Clear {
            self.channel.clear();
        }
        debug!(task = %self.name, results_on_restart = ?self.results_on_restart, "restarting task");
        self.start()
    }

    /// Wait for the current run to end on its own and return its final state.
    ///
    /// An unbounded run only ends on its own by failing, so this is mostly
    /// useful for bounded tasks.
    pub async fn wait(&mut self) -> TaskState {
        if let Some(handle) = self.handle.as_mut() {
            let joined = handle.await;
            self.handle = None;
            self.cancel_tx = None;
            self.settle(joined);
        }
        self.state()
    }

    /// Whether a worker context is live right now. Never blocks.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn state(&self) -> TaskState {
        self.channel.state()
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    pub fn results_on_restart(&self) -> ResultsOnRestart {
        self.results_on_restart
    }

    /// Id of the latest run, `None` before the first start.
    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    /// Detail of the failure that ended the latest run.
    pub fn failure(&self) -> Option<TargetFailure> {
        self.channel.failure()
    }

    pub fn invocations(&self) -> u64 {
        self.channel.invocations()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.channel.runs()
    }

    pub fn result_count(&self) -> usize {
        self.channel.len()
    }

    /// Take every result gathered so far, oldest first.
    pub fn drain(&self) -> Vec<G::Output> {
        self.channel.drain()
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            id: self.id,
            name: self.name.clone(),
            policy: self.policy,
            state: self.state(),
            alive: self.is_alive(),
            run_id: self.run_id,
            runs: self.channel.runs().len(),
            invocations: self.invocations(),
            pending_results: self.result_count(),
            failure: self.failure(),
        }
    }

    fn signal_cancel(&self) {
        if let Some(tx) = &self.cancel_tx {
            // ignore send error: the worker may already be gone
            let _ = tx.send(true);
        }
    }

    async fn wait_for_exit(&self) {
        while self.is_alive() {
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Drop a handle whose worker already ended on its own.
    fn reap(&mut self) {
        if self.handle.as_ref().is_some_and(JoinHandle::is_finished) {
            self.handle = None;
            self.cancel_tx = None;
        }
    }

    /// Join the worker and close its run record.
    async fn release(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.cancel_tx = None;
        let joined = handle.await;
        self.settle(joined);
    }

    fn settle(&mut self, joined: Result<(), JoinError>) {
        let Some(run_id) = self.run_id else {
            return;
        };
        match joined {
            Ok(()) => {
                // worker が自分で閉じていなければ（abort が間に合った場合など）ここで閉じる
                self.channel.finish(run_id, TaskState::Stopped);
            }
            Err(err) if err.is_cancelled() => {
                self.channel.finish(run_id, TaskState::Stopped);
            }
            Err(err) => {
                warn!(task = %self.name, run = %run_id, error = %err, "worker context ended abnormally");
                self.channel
                    .fail(run_id, TargetFailure::Panicked(err.to_string()));
            }
        }
    }
}

impl<G: Target> Task<G>
where
    G::Output: Clone,
{
    /// Snapshot of the results gathered so far, oldest first.
    ///
    /// Safe to call while the worker is appending.
    pub fn results(&self) -> Vec<G::Output> {
        self.channel.snapshot()
    }
}

impl<G: Target> Drop for Task<G> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(task = %self.name, "task dropped, worker aborted");
        }
    }
}

/// TaskBuilder は Task を構築
///
/// # 使用例
/// ```ignore
/// let task = Task::builder(target)
///     .name("countdown")
///     .executions(3)
///     .autostart(true)
///     .build()?;
/// ```
pub struct TaskBuilder<G: Target> {
    target: G,
    name: Option<String>,
    policy: ExecutionPolicy,
    autostart: bool,
    results_on_restart: ResultsOnRestart,
    poll_interval: Duration,
}

impl<G: Target> TaskBuilder<G> {
    pub fn new(target: G) -> Self {
        Self {
            target,
            name: None,
            policy: ExecutionPolicy::Unbounded,
            autostart: false,
            results_on_restart: ResultsOnRestart::Keep,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// `executions <= 0` means unbounded.
    pub fn executions(mut self, executions: i64) -> Self {
        self.policy = ExecutionPolicy::from_count(executions);
        self
    }

    pub fn policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    pub fn results_on_restart(mut self, results_on_restart: ResultsOnRestart) -> Self {
        self.results_on_restart = results_on_restart;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Apply every setting from `config`.
    pub fn config(mut self, config: &TaskConfig) -> Self {
        if let Some(name) = &config.name {
            self.name = Some(name.clone());
        }
        self.policy = config.executions;
        self.autostart = config.autostart;
        self.results_on_restart = config.results_on_restart;
        self.poll_interval = config.poll_interval();
        self
    }

    /// Build the task, starting it when `autostart` is set.
    pub fn build(self) -> Result<Task<G>, TaskError> {
        if self.poll_interval.is_zero() {
            return Err(TaskError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        let autostart = self.autostart;
        let mut task = self.assemble();
        if autostart {
            task.start()?;
        }
        Ok(task)
    }

    fn assemble(self) -> Task<G> {
        let id = TaskId::generate();
        Task {
            id,
            name: self.name.unwrap_or_else(|| id.to_string()),
            target: Arc::new(self.target),
            policy: self.policy,
            results_on_restart: self.results_on_restart,
            poll_interval: self.poll_interval,
            channel: SharedChannel::new(),
            cancel_tx: None,
            handle: None,
            run_id: None,
        }
    }
}

/// Everything the worker context owns. Only `channel` is shared back.
struct Worker<G: Target> {
    task_name: String,
    run_id: RunId,
    target: Arc<G>,
    policy: ExecutionPolicy,
    channel: SharedChannel<G::Output>,
    cancel_rx: watch::Receiver<bool>,
}

impl<G: Target> Worker<G> {
    async fn run(self) {
        let outcome = match self.policy {
            ExecutionPolicy::Bounded(limit) => self.run_bounded(limit.get()).await,
            ExecutionPolicy::Unbounded => self.run_unbounded().await,
        };

        match outcome {
            Ok(state) => {
                self.channel.finish(self.run_id, state);
                info!(task = %self.task_name, run = %self.run_id, %state, "worker exited");
            }
            Err(failure) => {
                warn!(task = %self.task_name, run = %self.run_id, error = %failure, "worker failed");
                self.channel.fail(self.run_id, failure);
            }
        }
    }

    // cancel フラグは見ない（bounded は最後まで走る）
    async fn run_bounded(&self, limit: u64) -> Result<TaskState, TargetFailure> {
        for _ in 0..limit {
            self.invoke_once().await?;
            tokio::task::yield_now().await;
        }
        Ok(TaskState::Completed)
    }

    async fn run_unbounded(&self) -> Result<TaskState, TargetFailure> {
        loop {
            if *self.cancel_rx.borrow() {
                return Ok(TaskState::Stopped);
            }
            self.invoke_once().await?;
            // target が即座に返す場合でも controller や abort に順番を回す
            tokio::task::yield_now().await;
        }
    }

    async fn invoke_once(&self) -> Result<(), TargetFailure> {
        let value = AssertUnwindSafe(self.target.invoke())
            .catch_unwind()
            .await
            .map_err(|payload| TargetFailure::Panicked(panic_message(payload.as_ref())))?
            .map_err(|e| TargetFailure::Raised(e.to_string()))?;
        self.channel.push(value);
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    use tokio::time::{Instant, sleep, timeout};

    use super::*;
    use crate::error::TargetError;
    use crate::target::from_fn;

    /// Returns 1, 2, 3, ... and counts calls.
    fn counter() -> (Arc<AtomicU64>, impl Target<Output = u64>) {
        let calls = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&calls);
        let target = from_fn(move || {
            let seen = Arc::clone(&seen);
            async move { Ok::<_, TargetError>(seen.fetch_add(1, Ordering::SeqCst) + 1) }
        });
        (calls, target)
    }

    /// Like `counter`, but each call takes `period`.
    fn slow_counter(period: Duration) -> (Arc<AtomicU64>, impl Target<Output = u64>) {
        let calls = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&calls);
        let target = from_fn(move || {
            let seen = Arc::clone(&seen);
            async move {
                sleep(period).await;
                Ok::<_, TargetError>(seen.fetch_add(1, Ordering::SeqCst) + 1)
            }
        });
        (calls, target)
    }

    fn sleeper(period: Duration) -> impl Target<Output = ()> {
        from_fn(move || async move {
            sleep(period).await;
            Ok::<_, TargetError>(())
        })
    }

    fn explode() -> Result<u8, TargetError> {
        panic!("led strip unplugged")
    }

    #[tokio::test]
    async fn bounded_task_completes_after_exhausting_count() {
        let (calls, target) = counter();
        let mut task = Task::new(target, 3);
        assert_eq!(task.policy(), ExecutionPolicy::bounded(3));

        task.start().unwrap();

        assert_eq!(task.wait().await, TaskState::Completed);
        assert_eq!(task.results(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!task.is_alive());
    }

    #[tokio::test]
    async fn unbounded_task_stops_gracefully() {
        let mut task = Task::new(from_fn(|| async { Ok::<_, TargetError>(()) }), 0);
        assert_eq!(task.policy(), ExecutionPolicy::Unbounded);

        task.start().unwrap();
        sleep(Duration::from_millis(20)).await;
        task.stop_graceful().await.unwrap();

        assert!(!task.is_alive());
        assert_eq!(task.state(), TaskState::Stopped);

        let settled = task.result_count();
        assert!(settled > 0);
        sleep(Duration::from_millis(20)).await;
        assert_eq!(task.result_count(), settled);
    }

    #[tokio::test]
    async fn graceful_stop_lets_current_iteration_finish() {
        let (_, target) = slow_counter(Duration::from_millis(40));
        let mut task = Task::new(target, -1);

        task.start().unwrap();
        sleep(Duration::from_millis(10)).await;
        task.stop_graceful().await.unwrap();

        assert_eq!(task.results(), vec![1]);
        assert_eq!(task.state(), TaskState::Stopped);
    }

    #[tokio::test]
    async fn bounded_task_ignores_graceful_cancel() {
        let (calls, target) = slow_counter(Duration::from_millis(5));
        let mut task = Task::new(target, 3);

        task.start().unwrap();
        task.stop_graceful().await.unwrap();

        assert_eq!(task.results(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn restart_reruns_bounded_policy() {
        let (calls, target) = counter();
        let mut task = Task::new(target, 2);

        task.start().unwrap();
        assert_eq!(task.wait().await, TaskState::Completed);
        let first_run = task.run_id();

        task.restart().await.unwrap();
        assert_eq!(task.wait().await, TaskState::Completed);

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(task.results(), vec![1, 2, 3, 4]);
        assert_ne!(task.run_id(), first_run);

        let runs = task.runs();
        assert_eq!(runs.len(), 2);
        assert!(
            runs.iter()
                .all(|r| r.invocations == 2 && r.outcome == Some(TaskState::Completed))
        );
    }

    #[tokio::test]
    async fn restart_can_clear_previous_results() {
        let (_, target) = counter();
        let mut task = Task::builder(target)
            .executions(2)
            .results_on_restart(ResultsOnRestart::Clear)
            .build()
            .unwrap();
        assert_eq!(task.results_on_restart(), ResultsOnRestart::Clear);

        task.start().unwrap();
        task.wait().await;
        task.restart().await.unwrap();
        task.wait().await;

        assert_eq!(task.results(), vec![3, 4]);
        assert_eq!(task.invocations(), 4);
    }

    #[tokio::test]
    async fn restart_interrupts_a_running_task() {
        let mut task = Task::new(sleeper(Duration::from_secs(30)), 0);
        task.start().unwrap();
        let first_run = task.run_id();

        task.restart().await.unwrap();

        assert!(task.is_alive());
        assert_eq!(task.state(), TaskState::Running);
        assert_ne!(task.run_id(), first_run);

        let runs = task.runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].outcome, Some(TaskState::Stopped));
        assert!(runs[1].is_open());

        task.stop_immediately().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_immediately_does_not_wait_for_slow_target() {
        let mut task = Task::new(sleeper(Duration::from_secs(30)), 0);
        task.start().unwrap();
        sleep(Duration::from_millis(20)).await;

        let begun = Instant::now();
        task.stop_immediately().await.unwrap();

        assert!(begun.elapsed() < Duration::from_millis(50));
        assert!(!task.is_alive());
        assert_eq!(task.state(), TaskState::Stopped);
        assert_eq!(task.result_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_immediately_kills_blocking_child_process() {
        use crate::command::CommandTarget;

        // the child blocks in sleep(1) and would leave a marker file behind
        let marker = std::env::temp_dir().join(format!("shutter-{}.done", TaskId::generate()));
        let target = CommandTarget::new("sh")
            .args(["-c", "sleep 1; touch \"$0\""])
            .arg(&marker);
        let mut task = Task::new(target, 0);
        task.start().unwrap();
        sleep(Duration::from_millis(100)).await;

        let begun = Instant::now();
        task.stop_immediately().await.unwrap();

        assert!(begun.elapsed() < Duration::from_millis(50));
        assert!(!task.is_alive());
        assert_eq!(task.state(), TaskState::Stopped);
        assert_eq!(task.result_count(), 0);

        sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "child outlived stop_immediately");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_results_cross_the_process_boundary() {
        use crate::command::CommandTarget;

        let mut task = Task::new(CommandTarget::new("sh").args(["-c", "echo $$"]), 3);
        task.start().unwrap();
        assert_eq!(task.wait().await, TaskState::Completed);

        let pids: HashSet<u32> = task
            .results()
            .iter()
            .map(|output| output.stdout.trim().parse().unwrap())
            .collect();
        assert_eq!(pids.len(), 3);
        assert!(!pids.contains(&std::process::id()));
    }

    #[tokio::test]
    async fn stop_immediately_interrupts_bounded_task() {
        let (_, target) = slow_counter(Duration::from_millis(20));
        let mut task = Task::new(target, 100);

        task.start().unwrap();
        sleep(Duration::from_millis(50)).await;
        task.stop_immediately().await.unwrap();

        let kept = task.result_count();
        assert!(kept < 100);
        assert_eq!(task.state(), TaskState::Stopped);
        assert_eq!(task.runs()[0].invocations, kept as u64);
    }

    #[tokio::test]
    async fn graceful_stop_with_timeout_reports_stuck_worker() {
        let mut task = Task::new(sleeper(Duration::from_secs(30)), 0);
        task.start().unwrap();
        sleep(Duration::from_millis(10)).await;

        let err = task
            .stop_graceful_timeout(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::StopTimeout(_)));
        assert!(task.is_alive());

        task.stop_immediately().await.unwrap();
        assert!(!task.is_alive());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let mut task = Task::new(sleeper(Duration::from_secs(30)), 0);
        task.start().unwrap();
        let run = task.run_id();

        assert!(matches!(task.start(), Err(TaskError::AlreadyRunning)));
        assert!(task.is_alive());
        assert_eq!(task.run_id(), run);
        assert_eq!(task.runs().len(), 1);

        task.stop_immediately().await.unwrap();
    }

    #[tokio::test]
    async fn results_are_visible_once_worker_is_gone() {
        let frames = Arc::new(AtomicU64::new(0));
        let target = from_fn(move || {
            let frames = Arc::clone(&frames);
            async move {
                let n = frames.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, TargetError>(format!("frame-{n}"))
            }
        });
        let mut task = Task::new(target, 5);
        task.start().unwrap();

        timeout(Duration::from_secs(1), async {
            while task.is_alive() {
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        let results = task.results();
        assert_eq!(results.len(), 5);
        assert_eq!(results.iter().collect::<HashSet<_>>().len(), 5);
        assert_eq!(results[0], "frame-1");
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn results_snapshots_only_grow_while_worker_runs() {
        let (_, target) = slow_counter(Duration::from_millis(3));
        let mut task = Task::new(target, 25);
        task.start().unwrap();

        let mut snapshots: Vec<Vec<u64>> = Vec::new();
        while task.is_alive() {
            let snapshot = task.results();
            if let Some(previous) = snapshots.last() {
                assert!(snapshot.len() >= previous.len());
            }
            snapshots.push(snapshot);
            sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(task.wait().await, TaskState::Completed);

        let last = task.results();
        assert_eq!(last, (1..=25).collect::<Vec<u64>>());
        assert!(snapshots.iter().any(|s| !s.is_empty() && s.len() < last.len()));
        for snapshot in &snapshots {
            assert_eq!(snapshot[..], last[..snapshot.len()]);
        }
    }

    #[tokio::test]
    async fn failing_target_ends_only_the_worker() {
        let calls = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&calls);
        let target = from_fn(move || {
            let seen = Arc::clone(&seen);
            async move {
                match seen.fetch_add(1, Ordering::SeqCst) {
                    0 => Ok(1),
                    _ => Err(TargetError::from("camera not ready")),
                }
            }
        });
        let mut task = Task::new(target, 5);
        task.start().unwrap();

        assert_eq!(task.wait().await, TaskState::Failed);
        assert!(!task.is_alive());
        assert_eq!(task.results(), vec![1]);
        assert_eq!(
            task.failure(),
            Some(TargetFailure::Raised("camera not ready".to_string()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_target_is_recorded_as_failure() {
        let mut task = Task::new(from_fn(|| async { explode() }), 0);
        task.start().unwrap();

        assert_eq!(task.wait().await, TaskState::Failed);
        assert_eq!(
            task.failure(),
            Some(TargetFailure::Panicked("led strip unplugged".to_string()))
        );

        // the controller survives and can try again
        task.restart().await.unwrap();
        assert_eq!(task.wait().await, TaskState::Failed);
        assert_eq!(task.runs().len(), 2);
    }

    #[tokio::test]
    async fn fresh_task_is_not_alive() {
        let (_, target) = counter();
        let mut task = Task::new(target, 1);

        assert!(!task.is_alive());
        assert_eq!(task.state(), TaskState::Created);
        assert!(task.run_id().is_none());

        task.stop_graceful().await.unwrap();
        task.stop_immediately().await.unwrap();
        assert_eq!(task.state(), TaskState::Created);
    }

    #[test]
    fn start_outside_runtime_fails() {
        let (_, target) = counter();
        let mut task = Task::new(target, 1);

        assert!(matches!(task.start(), Err(TaskError::NoRuntime)));
        assert_eq!(task.state(), TaskState::Created);
        assert!(task.runs().is_empty());
    }

    #[tokio::test]
    async fn autostart_from_config() {
        let config = TaskConfig::from_json(
            r#"{"name": "countdown", "executions": 3, "autostart": true}"#,
        )
        .unwrap();
        let (_, target) = counter();
        let mut task = Task::from_config(target, &config).unwrap();

        assert_eq!(task.name(), "countdown");
        assert_eq!(task.policy(), ExecutionPolicy::bounded(3));
        assert!(task.run_id().is_some());
        assert_eq!(task.wait().await, TaskState::Completed);
    }

    #[test]
    fn builder_rejects_zero_poll_interval() {
        let (_, target) = counter();
        let built = Task::builder(target).poll_interval(Duration::ZERO).build();
        assert!(matches!(built, Err(TaskError::Config(_))));
    }

    #[tokio::test]
    async fn drain_hands_over_results_in_order() {
        let (_, target) = counter();
        let mut task = Task::new(target, 4);
        task.start().unwrap();
        task.wait().await;

        assert_eq!(task.drain(), vec![1, 2, 3, 4]);
        assert!(task.results().is_empty());
        assert_eq!(task.invocations(), 4);
    }

    #[tokio::test]
    async fn status_snapshot_serializes() {
        let (_, target) = counter();
        let mut task = Task::builder(target).name("flash").executions(2).build().unwrap();
        task.start().unwrap();
        task.wait().await;

        let status = task.status();
        assert_eq!(status.id, task.id());
        assert_eq!(status.name, "flash");
        assert_eq!(status.state, TaskState::Completed);
        assert!(!status.alive);
        assert_eq!(status.runs, 1);
        assert_eq!(status.pending_results, 2);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "completed");
        assert_eq!(json["policy"], 2);
        assert!(json.get("failure").is_none());
    }

    #[tokio::test]
    async fn dropping_task_aborts_worker() {
        let (calls, target) = slow_counter(Duration::from_millis(1));
        {
            let mut task = Task::new(target, 0);
            task.start().unwrap();
            sleep(Duration::from_millis(10)).await;
        }
        sleep(Duration::from_millis(5)).await;

        let after_drop = calls.load(Ordering::SeqCst);
        sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }
}
