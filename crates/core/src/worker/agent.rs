//! LLM-driven worker with tool access.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::error::WorkerError;
use super::local_tools::{bind_item, LocalTool};
use super::protocol::{
    parse_tool_call, system_prompt, tool_result_message, CatalogEntry, ToolCall, LOCAL_SERVER,
};
use super::traits::{StartReport, Worker};
use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::tool_client::{ToolClientHandle, ToolRequest};

/// Worker that runs a bounded engine/tool loop over its own tool connections.
pub struct AgentWorker {
    name: String,
    instructions: String,
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    max_tokens: u32,
    max_steps: u32,
    handles: Vec<ToolClientHandle>,
    local_tools: Vec<Arc<dyn LocalTool>>,
    catalog: RwLock<Vec<CatalogEntry>>,
    closed: AtomicBool,
}

impl AgentWorker {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            llm,
            temperature: 0.3,
            max_tokens: 4096,
            max_steps: 12,
            handles: Vec::new(),
            local_tools: Vec::new(),
            catalog: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_handle(mut self, handle: ToolClientHandle) -> Self {
        self.handles.push(handle);
        self
    }

    pub fn with_local_tool(mut self, tool: Arc<dyn LocalTool>) -> Self {
        self.local_tools.push(tool);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn handles(&self) -> &[ToolClientHandle] {
        &self.handles
    }

    /// Run one tool call. Local tools only see `item` when the task is item-scoped.
    async fn dispatch(&self, call: &ToolCall, item: Option<&str>) -> Result<String, String> {
        if call.server == LOCAL_SERVER {
            let tool = self
                .local_tools
                .iter()
                .find(|t| t.name() == call.tool)
                .ok_or_else(|| format!("unknown tool '{}'", call.qualified_name()))?;
            let arguments = match item {
                Some(id) => bind_item(&call.arguments, id).map_err(|e| e.to_string())?,
                None => call.arguments.clone(),
            };
            return tool.call(&arguments).await.map_err(|e| e.to_string());
        }

        let handle = self
            .handles
            .iter()
            .find(|h| h.server() == call.server)
            .ok_or_else(|| format!("unknown tool server '{}'", call.server))?;

        let output = handle
            .invoke(ToolRequest::new(&call.tool, call.arguments.clone()))
            .await
            .map_err(|e| e.to_string())?;

        if output.is_error {
            Err(output.text)
        } else {
            Ok(output.text)
        }
    }

    async fn run_task(&self, task: &str, item: Option<&str>) -> Result<String, WorkerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WorkerError::Closed {
                worker: self.name.clone(),
            });
        }

        let system = system_prompt(&self.instructions, &self.catalog.read().await);
        let mut transcript = vec![ChatMessage::user(task)];

        for step in 1..=self.max_steps {
            let request = CompletionRequest::new(transcript.clone())
                .with_system(system.clone())
                .with_max_tokens(self.max_tokens)
                .with_temperature(self.temperature);

            let response =
                self.llm
                    .complete(request)
                    .await
                    .map_err(|source| WorkerError::Engine {
                        worker: self.name.clone(),
                        source,
                    })?;

            let Some(call) = parse_tool_call(&response.text) else {
                debug!(worker = %self.name, step, "Engine returned final answer");
                return Ok(response.text);
            };

            debug!(worker = %self.name, step, tool = %call.qualified_name(), "Engine requested tool");
            let result = self.dispatch(&call, item).await;
            if let Err(e) = &result {
                warn!(worker = %self.name, tool = %call.qualified_name(), error = %e, "Tool call failed");
            }

            transcript.push(ChatMessage::assistant(response.text));
            transcript.push(ChatMessage::user(tool_result_message(&call, result)));
        }

        Err(WorkerError::StepLimit {
            worker: self.name.clone(),
            max_steps: self.max_steps,
        })
    }
}

#[async_trait]
impl Worker for AgentWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> StartReport {
        let mut report = StartReport::default();
        let mut catalog = Vec::new();

        for handle in &self.handles {
            if let Err(e) = handle.open().await {
                warn!(worker = %self.name, server = handle.server(), error = %e, "Tool server unavailable");
                report.degraded.push(handle.server().to_string());
                continue;
            }

            match handle.list_tools().await {
                Ok(tools) => {
                    debug!(worker = %self.name, server = handle.server(), count = tools.len(), "Listed tools");
                    catalog.extend(
                        tools
                            .into_iter()
                            .map(|tool| CatalogEntry::new(handle.server(), tool)),
                    );
                }
                Err(e) => {
                    warn!(worker = %self.name, server = handle.server(), error = %e, "Failed to list tools");
                }
            }
            report.connected.push(handle.server().to_string());
        }

        catalog.extend(
            self.local_tools
                .iter()
                .map(|tool| CatalogEntry::new(LOCAL_SERVER, tool.descriptor())),
        );

        info!(
            worker = %self.name,
            connected = report.connected.len(),
            degraded = report.degraded.len(),
            tools = catalog.len(),
            "Worker started"
        );

        *self.catalog.write().await = catalog;
        report
    }

    async fn perform(&self, task: &str) -> Result<String, WorkerError> {
        self.run_task(task, None).await
    }

    async fn perform_item(&self, item_id: &str, task: &str) -> Result<String, WorkerError> {
        self.run_task(task, Some(item_id)).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        join_all(self.handles.iter().map(|h| h.close())).await;
        debug!(worker = %self.name, "Worker closed");
    }
}

impl std::fmt::Debug for AgentWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentWorker")
            .field("name", &self.name)
            .field("model", &self.llm.model())
            .field("handles", &self.handles)
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockLlmClient, MockToolServer};
    use crate::tool_client::{HandleState, ToolDescriptor, ToolOutput};
    use crate::worker::local_tools::WriteReport;
    use crate::workspace::{ReportWriter, WorkspaceLayout};
    use tempfile::TempDir;

    fn handle(server: &MockToolServer) -> ToolClientHandle {
        ToolClientHandle::new(Arc::new(server.clone()))
    }

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let llm = MockLlmClient::new();
        llm.push_response("All good.").await;
        let worker = AgentWorker::new("report", "Summarize.", Arc::new(llm.clone()));

        worker.start().await;
        assert_eq!(worker.perform("summarize item 1").await.unwrap(), "All good.");

        let requests = llm.recorded_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages, vec![ChatMessage::user("summarize item 1")]);
        assert!(requests[0].system.as_deref().unwrap().starts_with("Summarize."));
    }

    #[tokio::test]
    async fn test_tool_loop_invokes_server() {
        let server = MockToolServer::new("github")
            .with_tool(ToolDescriptor::new("search_issues", "Search issues"));
        server
            .set_response("search_issues", ToolOutput::text(r#"[{"number": 7}]"#))
            .await;

        let llm = MockLlmClient::new();
        llm.push_response(r#"{"tool": "github.search_issues", "arguments": {"q": "is:open"}}"#)
            .await;
        llm.push_response(r#"[{"id": "7"}]"#).await;

        let worker = AgentWorker::new("fetch", "Fetch issues.", Arc::new(llm.clone()))
            .with_handle(handle(&server));
        let report = worker.start().await;
        assert_eq!(report.connected, vec!["github".to_string()]);

        let answer = worker.perform("find issues").await.unwrap();
        assert_eq!(answer, r#"[{"id": "7"}]"#);

        let calls = server.recorded_calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "search_issues");

        let requests = llm.recorded_requests().await;
        assert!(requests[0]
            .system
            .as_deref()
            .unwrap()
            .contains("`github.search_issues`"));
        let last = requests[1].messages.last().unwrap();
        assert!(last.content.starts_with("Tool `github.search_issues` returned:"));
    }

    #[tokio::test]
    async fn test_tool_error_is_fed_back() {
        let server = MockToolServer::new("terraform");
        server.set_next_error("connection reset").await;

        let llm = MockLlmClient::new();
        llm.push_response(r#"{"tool": "terraform.plan"}"#).await;
        llm.push_response("Plan could not run.").await;

        let worker = AgentWorker::new("test", "Test.", Arc::new(llm.clone()))
            .with_handle(handle(&server));
        worker.start().await;

        let answer = worker.perform("test item 3").await.unwrap();
        assert_eq!(answer, "Plan could not run.");

        let requests = llm.recorded_requests().await;
        let feedback = &requests[1].messages.last().unwrap().content;
        assert!(feedback.contains("failed"));
        assert!(feedback.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let llm = MockLlmClient::new();
        llm.push_response(r#"{"tool": "jira.search"}"#).await;
        llm.push_response("done").await;

        let worker = AgentWorker::new("fetch", "Fetch.", Arc::new(llm.clone()));
        worker.start().await;
        worker.perform("x").await.unwrap();

        let requests = llm.recorded_requests().await;
        assert!(requests[1]
            .messages
            .last()
            .unwrap()
            .content
            .contains("unknown tool server 'jira'"));
    }

    #[tokio::test]
    async fn test_local_tool_dispatch() {
        let temp = TempDir::new().unwrap();
        let writer = ReportWriter::new(WorkspaceLayout::with_root(temp.path()));

        let llm = MockLlmClient::new();
        llm.push_response(
            r##"{"tool": "local.write_report", "arguments": {"item_id": "4", "content": "# Report"}}"##,
        )
        .await;
        llm.push_response("Report written.").await;

        let worker = AgentWorker::new("report", "Report.", Arc::new(llm))
            .with_local_tool(Arc::new(WriteReport::new(writer)));
        worker.start().await;
        worker.perform("write report for 4").await.unwrap();

        let content = std::fs::read_to_string(temp.path().join("report_4.md")).unwrap();
        assert_eq!(content, "# Report");
    }

    #[tokio::test]
    async fn test_item_task_keeps_tools_on_its_item() {
        let temp = TempDir::new().unwrap();
        let writer = ReportWriter::new(WorkspaceLayout::with_root(temp.path()));

        let llm = MockLlmClient::new();
        llm.push_response(
            r#"{"tool": "local.write_report", "arguments": {"item_id": "5", "content": "wrong"}}"#,
        )
        .await;
        llm.push_response(r#"{"tool": "local.write_report", "arguments": {"content": "right"}}"#)
            .await;
        llm.push_response("Report written.").await;

        let worker = AgentWorker::new("report", "Report.", Arc::new(llm.clone()))
            .with_local_tool(Arc::new(WriteReport::new(writer)));
        worker.start().await;
        worker.perform_item("4", "write report for 4").await.unwrap();

        assert!(!temp.path().join("report_5.md").exists());
        let content = std::fs::read_to_string(temp.path().join("report_4.md")).unwrap();
        assert_eq!(content, "right");

        let requests = llm.recorded_requests().await;
        let feedback = &requests[1].messages.last().unwrap().content;
        assert!(feedback.contains("out of scope"));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let llm = MockLlmClient::new();
        for _ in 0..3 {
            llm.push_response(r#"{"tool": "local.nothing"}"#).await;
        }
        let worker =
            AgentWorker::new("fetch", "Fetch.", Arc::new(llm.clone())).with_max_steps(2);
        worker.start().await;

        let err = worker.perform("loop").await.unwrap_err();
        assert!(matches!(err, WorkerError::StepLimit { max_steps: 2, .. }));
        assert_eq!(llm.recorded_requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_engine_error() {
        let llm = MockLlmClient::new();
        let worker = AgentWorker::new("fetch", "Fetch.", Arc::new(llm));
        worker.start().await;

        let err = worker.perform("anything").await.unwrap_err();
        assert!(matches!(err, WorkerError::Engine { .. }));
    }

    #[tokio::test]
    async fn test_degraded_server() {
        let good = MockToolServer::new("terraform");
        let bad = MockToolServer::new("aws-docs").failing_connect();

        let worker = AgentWorker::new("test", "Test.", Arc::new(MockLlmClient::new()))
            .with_handle(handle(&good))
            .with_handle(handle(&bad));
        let report = worker.start().await;

        assert_eq!(report.connected, vec!["terraform".to_string()]);
        assert_eq!(report.degraded, vec!["aws-docs".to_string()]);
        assert!(!report.is_unavailable());
    }

    #[tokio::test]
    async fn test_close_releases_every_handle_once() {
        let a = MockToolServer::new("a");
        let b = MockToolServer::new("b").failing_connect();
        let c = MockToolServer::new("c");

        let worker = AgentWorker::new("test", "Test.", Arc::new(MockLlmClient::new()))
            .with_handle(handle(&a))
            .with_handle(handle(&b))
            .with_handle(handle(&c));
        worker.start().await;

        worker.close().await;
        worker.close().await;

        for handle in worker.handles() {
            assert_eq!(handle.state().await, HandleState::Closed);
        }
        assert_eq!(a.shutdown_count(), 1);
        assert_eq!(b.shutdown_count(), 0);
        assert_eq!(c.shutdown_count(), 1);

        let err = worker.perform("late task").await.unwrap_err();
        assert!(matches!(err, WorkerError::Closed { .. }));
    }
}
