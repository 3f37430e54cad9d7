//! Worker error types.

use thiserror::Error;

use crate::llm::LlmError;
use crate::workspace::WorkspaceError;

/// A `perform` call did not produce a result.
///
/// The supervisor treats every variant as "this step failed"; only
/// [`Cancelled`](WorkerError::Cancelled) changes control flow.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker ran but could not complete the task.
    #[error("worker '{worker}' failed: {message}")]
    Failed { worker: String, message: String },

    /// The reasoning engine returned an error.
    #[error("worker '{worker}' engine error: {source}")]
    Engine {
        worker: String,
        #[source]
        source: LlmError,
    },

    /// The engine kept calling tools past the step limit.
    #[error("worker '{worker}' gave no answer within {max_steps} steps")]
    StepLimit { worker: String, max_steps: u32 },

    /// The call exceeded the supervisor's step timeout.
    #[error("worker '{worker}' timed out after {secs}s")]
    Timeout { worker: String, secs: u64 },

    /// The call was abandoned because the run was interrupted.
    #[error("worker '{worker}' call cancelled")]
    Cancelled { worker: String },

    /// The worker was already closed.
    #[error("worker '{worker}' is closed")]
    Closed { worker: String },
}

impl WorkerError {
    pub fn failed(worker: impl Into<String>, message: impl ToString) -> Self {
        Self::Failed {
            worker: worker.into(),
            message: message.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// A local tool call failed. The message is fed back to the engine.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("missing argument '{0}'")]
    MissingArgument(&'static str),

    #[error("argument '{name}' is invalid: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("refused: {0}")]
    Refused(String),

    #[error("item '{requested}' is out of scope; this task works on item '{current}'")]
    OutOfScope { requested: String, current: String },

    #[error("command '{program}' could not run: {reason}")]
    CommandFailed { program: String, reason: String },

    #[error("command '{program}' timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
}
