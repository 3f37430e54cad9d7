//! Supervisor types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::item::ItemError;
use crate::worker::WorkerError;

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Initializing,
    Fetching,
    ProcessingItem,
    Finalizing,
    Closed,
}

/// Stage of one item within `ProcessingItem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    TestingConfig,
    Cleaning,
    Reporting,
    Done,
}

/// A state machine transition, delivered to the event callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Phase(RunPhase),
    Item { item_id: String, stage: ItemStage },
}

/// Callback for run transitions.
pub type RunEventCallback = Arc<dyn Fn(&RunEvent) + Send + Sync>;

/// How one worker step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed(String),
    /// Not run: the run was interrupted, or the item was rejected before its test step.
    Skipped,
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "ok"),
            Self::Failed(reason) => write!(f, "failed ({})", reason),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of processing one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub item_id: String,
    pub title: String,
    pub test: StepStatus,
    /// Transient paths removed by the inline cleanup.
    pub cleaned: usize,
    pub cleanup_warnings: Vec<String>,
    pub report: StepStatus,
}

/// Summary of a completed (or interrupted) run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Items returned by the fetch worker, before the `max_items` bound.
    pub fetched: usize,
    pub items: Vec<ItemOutcome>,
    /// Workspaces re-cleaned by the final sweep.
    pub swept: Vec<String>,
    pub interrupted: bool,
    /// Tool servers that failed to open, as `worker:server`.
    pub degraded: Vec<String>,
}

impl RunSummary {
    pub(crate) fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            started_at: now,
            finished_at: now,
            fetched: 0,
            items: Vec::new(),
            swept: Vec::new(),
            interrupted: false,
            degraded: Vec::new(),
        }
    }

    pub fn processed(&self) -> usize {
        self.items.len()
    }

    /// Items whose test and report steps both succeeded.
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.test.is_success() && i.report.is_success())
            .count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.finished_at - self.started_at;
        writeln!(
            f,
            "Triage run {} {} in {}s",
            self.run_id,
            if self.interrupted {
                "interrupted"
            } else {
                "completed"
            },
            elapsed.num_seconds()
        )?;
        writeln!(
            f,
            "Fetched {} item(s), processed {}, fully succeeded {}",
            self.fetched,
            self.processed(),
            self.succeeded()
        )?;

        for item in &self.items {
            writeln!(
                f,
                "  #{} {}: test {}, cleanup removed {}{}, report {}",
                item.item_id,
                item.title,
                item.test,
                item.cleaned,
                if item.cleanup_warnings.is_empty() {
                    String::new()
                } else {
                    format!(" ({} warning(s))", item.cleanup_warnings.len())
                },
                item.report
            )?;
        }

        if !self.swept.is_empty() {
            writeln!(f, "Final sweep cleaned: {}", self.swept.join(", "))?;
        }
        if !self.degraded.is_empty() {
            writeln!(f, "Degraded tool servers: {}", self.degraded.join(", "))?;
        }
        Ok(())
    }
}

/// Errors that halt a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("fetch worker unavailable: no tool server could be opened ({})", .servers.join(", "))]
    FetchUnavailable { servers: Vec<String> },

    #[error("fetching items failed: {0}")]
    Fetch(#[source] WorkerError),

    #[error("could not decode fetched items: {0}")]
    ItemDecode(#[from] ItemError),
}

impl RunError {
    /// Process exit code for this error.
    ///
    /// Only failures before any work starts are non-zero; a run that reached the fetch
    /// stage counts as completed.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Initialization(_) => 1,
            Self::FetchUnavailable { .. } | Self::Fetch(_) | Self::ItemDecode(_) => 0,
        }
    }
}
