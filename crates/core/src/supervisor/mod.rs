//! Run supervisor.
//!
//! The [`Supervisor`] owns every worker (and, through them, every tool server
//! connection) for one run and drives the fetch → test → cleanup → report sequence.
//! Cleanup of an item always follows its test step and precedes its report step, and
//! every worker is closed exactly once before [`Supervisor::run`] returns.

mod runner;
mod shutdown;
mod tasks;
mod types;

pub use runner::Supervisor;
pub use shutdown::ShutdownHandle;
pub use tasks::{fetch_task, report_task, test_task};
pub use types::{
    ItemOutcome, ItemStage, RunError, RunEvent, RunEventCallback, RunPhase, RunSummary,
    StepStatus,
};
