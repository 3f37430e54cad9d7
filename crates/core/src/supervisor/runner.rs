//! Supervisor implementation.
//!
//! Drives one run through the state machine:
//! - Initializing: start every worker (opens their tool servers)
//! - Fetching: one call to the fetch worker, bounded to `max_items`
//! - ProcessingItem: test, then cleanup, then report, per item in fetch order; an item
//!   whose id cannot name a workspace fails on its own without touching the filesystem
//! - Finalizing: close every worker once, then sweep leftover workspaces
//!
//! Finalizing runs on every exit path, including errors and interrupts.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::item::{parse_work_items, ItemError, ItemIds, WorkItem};
use crate::worker::{StartReport, Worker, WorkerError, WorkerSet};
use crate::workspace::WorkItemCleaner;

use super::shutdown::ShutdownHandle;
use super::tasks;
use super::types::{
    ItemOutcome, ItemStage, RunError, RunEvent, RunEventCallback, RunPhase, RunSummary,
    StepStatus,
};

/// Owns the workers of one triage run.
pub struct Supervisor {
    config: RunConfig,
    workers: WorkerSet,
    cleaner: WorkItemCleaner,
    shutdown: ShutdownHandle,
    on_event: Option<RunEventCallback>,
    run_id: Uuid,
}

impl Supervisor {
    pub fn new(config: RunConfig, workers: WorkerSet) -> Self {
        let cleaner = WorkItemCleaner::new(config.workspace.clone());
        Self {
            config,
            workers,
            cleaner,
            shutdown: ShutdownHandle::new(),
            on_event: None,
            run_id: Uuid::new_v4(),
        }
    }

    /// Build the production worker set for `config`.
    pub fn from_config(config: RunConfig) -> Result<Self, RunError> {
        let workers = WorkerSet::from_config(&config)
            .map_err(|e| RunError::Initialization(e.to_string()))?;
        Ok(Self::new(config, workers))
    }

    /// Register a callback for phase and item-stage transitions.
    pub fn with_event_callback(mut self, callback: RunEventCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    /// Handle that interrupts this run when triggered.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Execute the run. Every worker is closed before this returns.
    pub async fn run(self) -> Result<RunSummary, RunError> {
        let span = info_span!("run", run_id = %self.run_id);
        async move {
            let mut summary = RunSummary::new(self.run_id);
            self.emit(RunEvent::Phase(RunPhase::Idle));
            info!(
                repository = %self.config.tracker.repository,
                max_items = self.config.tracker.max_items,
                root = %self.config.workspace.root.display(),
                "Starting triage run"
            );

            let result = self.drive(&mut summary).await;
            if let Err(e) = &result {
                error!(error = %e, "Run halted");
            }

            self.emit(RunEvent::Phase(RunPhase::Finalizing));
            self.finalize(&mut summary).await;
            self.emit(RunEvent::Phase(RunPhase::Closed));

            summary.finished_at = Utc::now();
            info!(
                processed = summary.processed(),
                succeeded = summary.succeeded(),
                interrupted = summary.interrupted,
                "Triage run finished"
            );
            result.map(|()| summary)
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, summary: &mut RunSummary) -> Result<(), RunError> {
        self.emit(RunEvent::Phase(RunPhase::Initializing));
        self.initialize(summary).await?;

        if self.interrupted(summary) {
            return Ok(());
        }

        self.emit(RunEvent::Phase(RunPhase::Fetching));
        let Some(items) = self.fetch(summary).await? else {
            return Ok(());
        };

        let bound = self.config.tracker.max_items;
        if items.len() > bound {
            info!(fetched = items.len(), bound, "Limiting items to max_items");
        }

        let mut ids = ItemIds::new();
        for item in items.into_iter().take(bound) {
            if self.interrupted(summary) {
                break;
            }
            self.emit(RunEvent::Phase(RunPhase::ProcessingItem));
            let outcome = match ids.admit(&item) {
                Ok(()) => self.process_item(&item).await,
                Err(e) => reject_item(&item, e),
            };
            summary.items.push(outcome);
            if self.interrupted(summary) {
                break;
            }
        }

        Ok(())
    }

    async fn initialize(&self, summary: &mut RunSummary) -> Result<(), RunError> {
        let Some(fetch) = self.start(&self.workers.fetch, summary).await else {
            return Ok(());
        };
        summary
            .degraded
            .extend(fetch.degraded.iter().map(|s| format!("fetch:{}", s)));
        if fetch.is_unavailable() {
            return Err(RunError::FetchUnavailable {
                servers: fetch.degraded,
            });
        }

        for worker in [&self.workers.test, &self.workers.report] {
            let Some(report) = self.start(worker, summary).await else {
                return Ok(());
            };
            summary
                .degraded
                .extend(report.degraded.iter().map(|s| format!("{}:{}", worker.name(), s)));
        }

        if !summary.degraded.is_empty() {
            warn!(degraded = ?summary.degraded, "Running with degraded tool servers");
        }
        Ok(())
    }

    /// Start one worker. `None` when the run was interrupted first.
    async fn start(
        &self,
        worker: &Arc<dyn Worker>,
        summary: &mut RunSummary,
    ) -> Option<StartReport> {
        if self.interrupted(summary) {
            return None;
        }
        tokio::select! {
            report = worker.start() => Some(report),
            _ = self.shutdown.triggered() => {
                warn!(worker = %worker.name(), "Abandoning worker start on interrupt");
                summary.interrupted = true;
                None
            }
        }
    }

    /// `Ok(None)` when the fetch call was interrupted.
    async fn fetch(&self, summary: &mut RunSummary) -> Result<Option<Vec<WorkItem>>, RunError> {
        let task = tasks::fetch_task(&self.config.tracker, Utc::now());
        let output = match self.call(&self.workers.fetch, None, &task).await {
            Ok(output) => output,
            Err(e) if e.is_cancelled() => {
                summary.interrupted = true;
                return Ok(None);
            }
            Err(e) => return Err(RunError::Fetch(e)),
        };

        let items = parse_work_items(&output)?;
        summary.fetched = items.len();
        info!(fetched = items.len(), "Fetched work items");
        Ok(Some(items))
    }

    async fn process_item(&self, item: &WorkItem) -> ItemOutcome {
        let span = info_span!("item", item_id = %item.id);
        async move {
            info!(title = %item.title, "Processing item");

            self.emit_stage(item, ItemStage::TestingConfig);
            let test_task = tasks::test_task(item, &self.config.workspace);
            let test = self
                .call(&self.workers.test, Some(item.id.as_str()), &test_task)
                .await;
            match &test {
                Ok(_) => debug!("Test step succeeded"),
                Err(e) => warn!(error = %e, "Test step failed"),
            }

            self.emit_stage(item, ItemStage::Cleaning);
            let cleanup = self.cleaner.clean(&item.id).await;

            let mut outcome = ItemOutcome {
                item_id: item.id.clone(),
                title: item.title.clone(),
                test: step_status(&test),
                cleaned: cleanup.removed.len(),
                cleanup_warnings: cleanup.warnings.iter().map(|w| w.to_string()).collect(),
                report: StepStatus::Skipped,
            };

            if outcome.test == StepStatus::Skipped {
                info!("Interrupted during test step; skipping report");
                return outcome;
            }

            self.emit_stage(item, ItemStage::Reporting);
            let report_task = tasks::report_task(item, &test, &cleanup);
            let report = self
                .call(&self.workers.report, Some(item.id.as_str()), &report_task)
                .await;
            if let Err(e) = &report {
                warn!(error = %e, "Report step failed");
            }
            outcome.report = step_status(&report);

            if outcome.report != StepStatus::Skipped {
                self.emit_stage(item, ItemStage::Done);
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn finalize(&self, summary: &mut RunSummary) {
        join_all(self.workers.all().into_iter().map(|w| w.close())).await;
        debug!("All workers closed");

        if self.config.supervisor.final_sweep {
            summary.swept = self
                .cleaner
                .sweep()
                .await
                .into_iter()
                .map(|report| report.item_id)
                .collect();
        }
    }

    /// One worker call, abandoned on interrupt or step timeout.
    async fn call(
        &self,
        worker: &Arc<dyn Worker>,
        item_id: Option<&str>,
        task: &str,
    ) -> Result<String, WorkerError> {
        let name = worker.name().to_string();
        if self.shutdown.is_triggered() {
            return Err(WorkerError::Cancelled { worker: name });
        }

        let perform = async {
            match item_id {
                Some(id) => worker.perform_item(id, task).await,
                None => worker.perform(task).await,
            }
        };
        let timeout = self.config.supervisor.step_timeout_secs;
        let step = async {
            match timeout {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), perform)
                    .await
                    .unwrap_or_else(|_| {
                        Err(WorkerError::Timeout {
                            worker: name.clone(),
                            secs,
                        })
                    }),
                None => perform.await,
            }
        };

        tokio::select! {
            result = step => result,
            _ = self.shutdown.triggered() => {
                warn!(worker = %name, "Abandoning worker call on interrupt");
                Err(WorkerError::Cancelled { worker: name.clone() })
            }
        }
    }

    fn interrupted(&self, summary: &mut RunSummary) -> bool {
        if self.shutdown.is_triggered() {
            info!("Interrupt received; not starting new work");
            summary.interrupted = true;
        }
        summary.interrupted
    }

    fn emit(&self, event: RunEvent) {
        if let RunEvent::Phase(phase) = &event {
            debug!(?phase, "Run phase");
        }
        if let Some(callback) = &self.on_event {
            callback(&event);
        }
    }

    fn emit_stage(&self, item: &WorkItem, stage: ItemStage) {
        self.emit(RunEvent::Item {
            item_id: item.id.clone(),
            stage,
        });
    }
}

/// Outcome for an item whose id cannot be given a workspace.
fn reject_item(item: &WorkItem, error: ItemError) -> ItemOutcome {
    warn!(item_id = %item.id, error = %error, "Skipping item");
    ItemOutcome {
        item_id: item.id.clone(),
        title: item.title.clone(),
        test: StepStatus::Failed(error.to_string()),
        cleaned: 0,
        cleanup_warnings: Vec::new(),
        report: StepStatus::Skipped,
    }
}

fn step_status(result: &Result<String, WorkerError>) -> StepStatus {
    match result {
        Ok(_) => StepStatus::Succeeded,
        Err(e) if e.is_cancelled() => StepStatus::Skipped,
        Err(e) => StepStatus::Failed(e.to_string()),
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("run_id", &self.run_id)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockWorker};
    use crate::workspace::WorkspaceLayout;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Fixture {
        fetch: MockWorker,
        test: MockWorker,
        report: MockWorker,
        _temp: TempDir,
        config: RunConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let config = RunConfig {
                workspace: WorkspaceLayout::with_root(temp.path()),
                ..Default::default()
            };
            Self {
                fetch: MockWorker::new("fetch"),
                test: MockWorker::new("test"),
                report: MockWorker::new("report"),
                _temp: temp,
                config,
            }
        }

        fn supervisor(&self) -> Supervisor {
            Supervisor::new(
                self.config.clone(),
                WorkerSet::new(
                    Arc::new(self.fetch.clone()),
                    Arc::new(self.test.clone()),
                    Arc::new(self.report.clone()),
                ),
            )
        }

        fn assert_closed_once(&self) {
            assert_eq!(self.fetch.close_count(), 1);
            assert_eq!(self.test.close_count(), 1);
            assert_eq!(self.report.close_count(), 1);
        }
    }

    fn recorder() -> (RunEventCallback, Arc<Mutex<Vec<RunEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: RunEventCallback = Arc::new(move |event: &RunEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (callback, events)
    }

    #[tokio::test]
    async fn test_empty_fetch_completes() {
        let fx = Fixture::new();
        fx.fetch.push_result("[]").await;

        let summary = fx.supervisor().run().await.unwrap();
        assert_eq!(summary.fetched, 0);
        assert!(summary.items.is_empty());
        assert!(fx.test.recorded_tasks().await.is_empty());
        fx.assert_closed_once();
    }

    #[tokio::test]
    async fn test_phase_sequence() {
        let fx = Fixture::new();
        fx.fetch
            .push_result(fixtures::items_json(&fixtures::work_items(1)))
            .await;
        let (callback, events) = recorder();

        fx.supervisor().with_event_callback(callback).run().await.unwrap();

        let phases: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                RunEvent::Phase(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            [
                RunPhase::Idle,
                RunPhase::Initializing,
                RunPhase::Fetching,
                RunPhase::ProcessingItem,
                RunPhase::Finalizing,
                RunPhase::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_finalizes() {
        let fx = Fixture::new();
        fx.fetch.push_error("rate limited").await;

        let err = fx.supervisor().run().await.unwrap_err();
        assert!(matches!(err, RunError::Fetch(_)));
        assert_eq!(err.exit_code(), 0);
        fx.assert_closed_once();
    }

    #[tokio::test]
    async fn test_undecodable_items_finalize() {
        let fx = Fixture::new();
        fx.fetch.push_result("I could not find any issues.").await;

        let err = fx.supervisor().run().await.unwrap_err();
        assert!(matches!(err, RunError::ItemDecode(_)));
        fx.assert_closed_once();
    }

    #[tokio::test]
    async fn test_fetch_unavailable() {
        let fx = Fixture::new();
        fx.fetch.set_degraded(&["github"]).await;

        let err = fx.supervisor().run().await.unwrap_err();
        assert!(matches!(err, RunError::FetchUnavailable { servers } if servers == ["github"]));
        assert_eq!(fx.test.start_count(), 0);
        assert!(fx.fetch.recorded_tasks().await.is_empty());
        fx.assert_closed_once();
    }

    #[tokio::test]
    async fn test_degraded_test_worker_still_runs() {
        let fx = Fixture::new();
        fx.test.set_degraded(&["terraform"]).await;
        fx.fetch
            .push_result(fixtures::items_json(&fixtures::work_items(1)))
            .await;

        let summary = fx.supervisor().run().await.unwrap();
        assert_eq!(summary.degraded, ["test:terraform"]);
        assert_eq!(summary.processed(), 1);
    }

    #[tokio::test]
    async fn test_report_failure_is_contained() {
        let mut fx = Fixture::new();
        fx.config.tracker.max_items = 2;
        fx.fetch
            .push_result(fixtures::items_json(&fixtures::work_items(2)))
            .await;
        fx.report.push_error("model overloaded").await;

        let summary = fx.supervisor().run().await.unwrap();
        assert_eq!(summary.processed(), 2);
        assert!(matches!(summary.items[0].report, StepStatus::Failed(_)));
        assert_eq!(summary.items[1].report, StepStatus::Succeeded);
        assert_eq!(summary.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_step_timeout_fails_item_only() {
        let mut fx = Fixture::new();
        fx.config.supervisor.step_timeout_secs = Some(1);
        fx.fetch
            .push_result(fixtures::items_json(&fixtures::work_items(1)))
            .await;
        fx.test.set_delay(Duration::from_secs(5)).await;

        let summary = fx.supervisor().run().await.unwrap();
        let item = &summary.items[0];
        assert!(matches!(&item.test, StepStatus::Failed(msg) if msg.contains("timed out")));
        assert_eq!(item.report, StepStatus::Succeeded);
        assert!(!summary.interrupted);
    }

    #[tokio::test]
    async fn test_interrupt_before_run() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor();
        supervisor.shutdown_handle().trigger();

        let summary = supervisor.run().await.unwrap();
        assert!(summary.interrupted);
        assert!(fx.fetch.recorded_tasks().await.is_empty());
        fx.assert_closed_once();
    }

    #[tokio::test]
    async fn test_report_task_mentions_test_failure() {
        let fx = Fixture::new();
        fx.fetch
            .push_result(fixtures::items_json(&fixtures::work_items(1)))
            .await;
        fx.test.push_error("terraform init exited 1").await;

        fx.supervisor().run().await.unwrap();

        let tasks = fx.report.recorded_tasks().await;
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].contains("terraform init exited 1"));
    }
}
