//! Worker trait definition.

use async_trait::async_trait;

use super::error::WorkerError;

/// Which of a worker's tool servers came up in [`Worker::start`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    pub connected: Vec<String>,
    /// Servers that failed to open. The worker keeps running without them.
    pub degraded: Vec<String>,
}

impl StartReport {
    /// True when the worker has servers but none of them opened.
    pub fn is_unavailable(&self) -> bool {
        self.connected.is_empty() && !self.degraded.is_empty()
    }
}

/// A named capability unit the supervisor delegates tasks to.
///
/// The supervisor drives every worker through this interface; only construction
/// differs between roles. Workers own their tool connections exclusively.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Role name (e.g. "fetch").
    fn name(&self) -> &str;

    /// Open the worker's tool connections.
    ///
    /// Connection failures do not fail the call; they are reported as degraded.
    async fn start(&self) -> StartReport;

    /// Execute one natural-language task and return the final answer.
    async fn perform(&self, task: &str) -> Result<String, WorkerError>;

    /// Execute a task on behalf of one work item.
    ///
    /// Workers with item-scoped tools restrict them to `item_id` for the call.
    async fn perform_item(&self, _item_id: &str, task: &str) -> Result<String, WorkerError> {
        self.perform(task).await
    }

    /// Release every connection. Idempotent; never fails.
    async fn close(&self);
}
