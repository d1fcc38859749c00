//! shutter-core
//!
//! Managed background tasks for the photobooth controller.
//!
//! # モジュール構成
//! - **task**: `Task` 本体（start / stop_graceful / stop_immediately / restart / results）
//! - **channel**: worker と controller が共有する結果・状態領域
//! - **target**: worker が呼び出す処理の trait とクロージャ用アダプタ
//! - **command**: 子プロセスで動く target（stop_immediately で kill できる）
//! - **domain**: ids, execution policy, lifecycle state, run history
//! - **config**: serde で読み込むタスク設定
//! - **status**: 観測用のスナップショット
//! - **error**: エラー型

pub mod channel;
pub mod command;
pub mod config;
pub mod domain;
pub mod error;
pub mod status;
pub mod target;
pub mod task;

pub use channel::SharedChannel;
pub use command::{CommandOutput, CommandTarget};
pub use config::TaskConfig;
pub use domain::{ExecutionPolicy, ResultsOnRestart, RunId, RunRecord, TaskId, TaskState};
pub use error::{TargetError, TargetFailure, TaskError};
pub use status::TaskStatus;
pub use target::{BoundTarget, FnTarget, Target, bind, from_fn};
pub use task::{Task, TaskBuilder};
