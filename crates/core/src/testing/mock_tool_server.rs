//! Mock tool server for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::tool_client::{
    ConnectionError, InvocationError, ToolConnector, ToolDescriptor, ToolOutput, ToolRequest,
    ToolSession,
};

/// In-process stand-in for an MCP server.
///
/// Clones share state, so a test can keep one clone for assertions while a
/// [`ToolClientHandle`](crate::tool_client::ToolClientHandle) owns another:
/// - count connects and shutdowns
/// - record every tool call
/// - script per-tool responses and one-shot call failures
///
/// # Example
///
/// ```rust,ignore
/// let server = MockToolServer::new("github");
/// let handle = ToolClientHandle::new(Arc::new(server.clone()));
///
/// handle.open().await?;
/// handle.close().await;
/// assert_eq!(server.shutdown_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockToolServer {
    name: String,
    tools: Arc<Vec<ToolDescriptor>>,
    fail_connect: Arc<AtomicBool>,
    hang_connect: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
    /// Scripted outputs keyed by tool name.
    responses: Arc<RwLock<HashMap<String, ToolOutput>>>,
    /// If set, the next call fails with this reason.
    next_error: Arc<RwLock<Option<String>>>,
    calls: Arc<RwLock<Vec<ToolRequest>>>,
}

impl MockToolServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Arc::new(Vec::new()),
            fail_connect: Arc::new(AtomicBool::new(false)),
            hang_connect: Arc::new(AtomicBool::new(false)),
            connects: Arc::new(AtomicUsize::new(0)),
            shutdowns: Arc::new(AtomicUsize::new(0)),
            responses: Arc::new(RwLock::new(HashMap::new())),
            next_error: Arc::new(RwLock::new(None)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Advertise `tool` from `list_tools`.
    pub fn with_tool(mut self, tool: ToolDescriptor) -> Self {
        Arc::make_mut(&mut self.tools).push(tool);
        self
    }

    /// Make every connect attempt fail as if the binary were missing.
    pub fn failing_connect(self) -> Self {
        self.fail_connect.store(true, Ordering::SeqCst);
        self
    }

    /// Make every connect attempt wait forever, like a server stuck before its handshake.
    pub fn hanging_connect(self) -> Self {
        self.hang_connect.store(true, Ordering::SeqCst);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Get all recorded tool calls.
    pub async fn recorded_calls(&self) -> Vec<ToolRequest> {
        self.calls.read().await.clone()
    }

    /// Script the output returned for `tool`.
    pub async fn set_response(&self, tool: impl Into<String>, output: ToolOutput) {
        self.responses.write().await.insert(tool.into(), output);
    }

    /// Configure the next call to fail with a transport error.
    pub async fn set_next_error(&self, reason: impl Into<String>) {
        *self.next_error.write().await = Some(reason.into());
    }
}

#[async_trait]
impl ToolConnector for MockToolServer {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<Box<dyn ToolSession>, ConnectionError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::spawn(
                &self.name,
                "No such file or directory (os error 2)",
            ));
        }
        if self.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            server: self.clone(),
            shut_down: false,
        }))
    }
}

struct MockSession {
    server: MockToolServer,
    shut_down: bool,
}

#[async_trait]
impl ToolSession for MockSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, InvocationError> {
        Ok(self.server.tools.as_ref().clone())
    }

    async fn call_tool(&self, request: ToolRequest) -> Result<ToolOutput, InvocationError> {
        self.server.calls.write().await.push(request.clone());

        if let Some(reason) = self.server.next_error.write().await.take() {
            return Err(InvocationError::call_failed(
                &self.server.name,
                &request.tool,
                reason,
            ));
        }

        let output = self
            .server
            .responses
            .read()
            .await
            .get(&request.tool)
            .cloned()
            .unwrap_or_else(|| ToolOutput::text(format!("{} ok", request.tool)));
        Ok(output)
    }

    async fn shutdown(&mut self) {
        if !self.shut_down {
            self.shut_down = true;
            self.server.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }
}
