//! Mock worker for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::worker::{StartReport, Worker, WorkerError};

/// Callback run at the start of every `perform`, with the task text.
pub type PerformHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Scriptable [`Worker`].
///
/// Provides controllable behavior for testing:
/// - queue results for successive `perform` calls (default: `"<name> ok"`)
/// - record every task
/// - count starts and closes
/// - simulate slow starts, slow calls and unavailable tool servers
#[derive(Clone)]
pub struct MockWorker {
    name: String,
    results: Arc<RwLock<VecDeque<Result<String, WorkerError>>>>,
    tasks: Arc<RwLock<Vec<String>>>,
    start_report: Arc<RwLock<StartReport>>,
    delay: Arc<RwLock<Option<Duration>>>,
    start_delay: Arc<RwLock<Option<Duration>>>,
    on_perform: Arc<RwLock<Option<PerformHook>>>,
    starts: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl MockWorker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: Arc::new(RwLock::new(VecDeque::new())),
            tasks: Arc::new(RwLock::new(Vec::new())),
            start_report: Arc::new(RwLock::new(StartReport::default())),
            delay: Arc::new(RwLock::new(None)),
            start_delay: Arc::new(RwLock::new(None)),
            on_perform: Arc::new(RwLock::new(None)),
            starts: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a successful result.
    pub async fn push_result(&self, output: impl Into<String>) {
        self.results.write().await.push_back(Ok(output.into()));
    }

    /// Queue a failure.
    pub async fn push_error(&self, message: impl ToString) {
        let error = WorkerError::failed(&self.name, message);
        self.results.write().await.push_back(Err(error));
    }

    /// Report these servers as failed on `start`.
    pub async fn set_degraded(&self, servers: &[&str]) {
        self.start_report.write().await.degraded = servers.iter().map(|s| s.to_string()).collect();
    }

    /// Make every `perform` take at least `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Make `start` take `delay`, like a tool server slow to come up.
    pub async fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.write().await = Some(delay);
    }

    pub async fn set_on_perform(&self, hook: PerformHook) {
        *self.on_perform.write().await = Some(hook);
    }

    /// Get all recorded tasks.
    pub async fn recorded_tasks(&self) -> Vec<String> {
        self.tasks.read().await.clone()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of `close` calls, including repeated ones.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for MockWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> StartReport {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.start_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.start_report.read().await.clone()
    }

    async fn perform(&self, task: &str) -> Result<String, WorkerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WorkerError::Closed {
                worker: self.name.clone(),
            });
        }

        self.tasks.write().await.push(task.to_string());

        let hook = self.on_perform.read().await.clone();
        if let Some(hook) = hook {
            hook(task);
        }

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.results.write().await.pop_front();
        next.unwrap_or_else(|| Ok(format!("{} ok", self.name)))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MockWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockWorker")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
