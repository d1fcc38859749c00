//! Domain model (ids, execution policy, lifecycle state, run history).

pub mod ids;
pub mod policy;
pub mod run;
pub mod state;

pub use ids::{RunId, TaskId};
pub use policy::{ExecutionPolicy, ResultsOnRestart};
pub use run::RunRecord;
pub use state::TaskState;
