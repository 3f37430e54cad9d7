//! State-tagged ownership of one tool server connection.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{ConnectionError, InvocationError};
use super::traits::{ToolConnector, ToolSession};
use super::types::{HandleState, ToolDescriptor, ToolOutput, ToolRequest};

enum Connection {
    Unopened,
    Open(Box<dyn ToolSession>),
    Closed,
}

impl Connection {
    fn state(&self) -> HandleState {
        match self {
            Connection::Unopened => HandleState::Unopened,
            Connection::Open(_) => HandleState::Open,
            Connection::Closed => HandleState::Closed,
        }
    }
}

/// Owns one subprocess-backed tool server connection.
///
/// Transitions: `Unopened -> Open` via [`open`](Self::open), `Open | Unopened -> Closed`
/// via [`close`](Self::close). `Closed` is terminal and closing again is a no-op. A
/// failed `open` leaves the handle `Unopened`.
///
/// Calls are serialized through the handle, so a server only ever sees one writer.
pub struct ToolClientHandle {
    server: String,
    connector: Arc<dyn ToolConnector>,
    connection: Mutex<Connection>,
    connect_timeout: Option<Duration>,
}

impl ToolClientHandle {
    pub fn new(connector: Arc<dyn ToolConnector>) -> Self {
        Self {
            server: connector.server_name().to_string(),
            connector,
            connection: Mutex::new(Connection::Unopened),
            connect_timeout: None,
        }
    }

    /// Bound spawning the server and completing its handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Name of the server behind this handle.
    pub fn server(&self) -> &str {
        &self.server
    }

    pub async fn state(&self) -> HandleState {
        self.connection.lock().await.state()
    }

    /// Start the server. Opening an already open handle is a no-op.
    pub async fn open(&self) -> Result<(), ConnectionError> {
        let mut connection = self.connection.lock().await;
        match &*connection {
            Connection::Open(_) => Ok(()),
            Connection::Closed => Err(ConnectionError::Closed {
                server: self.server.clone(),
            }),
            Connection::Unopened => {
                debug!(server = %self.server, "Opening tool server");
                let session = match self.connect_timeout {
                    Some(timeout) => tokio::time::timeout(timeout, self.connector.connect())
                        .await
                        .map_err(|_| ConnectionError::Timeout {
                            server: self.server.clone(),
                            secs: timeout.as_secs(),
                        })??,
                    None => self.connector.connect().await?,
                };
                *connection = Connection::Open(session);
                info!(server = %self.server, "Tool server connected");
                Ok(())
            }
        }
    }

    /// Tools advertised by the open server.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, InvocationError> {
        match &*self.connection.lock().await {
            Connection::Open(session) => session.list_tools().await,
            _ => Err(self.not_open()),
        }
    }

    /// Invoke a tool on the open server.
    pub async fn invoke(&self, request: ToolRequest) -> Result<ToolOutput, InvocationError> {
        match &*self.connection.lock().await {
            Connection::Open(session) => {
                debug!(server = %self.server, tool = %request.tool, "Invoking tool");
                session.call_tool(request).await
            }
            _ => Err(self.not_open()),
        }
    }

    /// Close the connection. Safe to call in any state, any number of times.
    pub async fn close(&self) {
        let mut connection = self.connection.lock().await;
        match std::mem::replace(&mut *connection, Connection::Closed) {
            Connection::Open(mut session) => {
                session.shutdown().await;
                info!(server = %self.server, "Tool server closed");
            }
            Connection::Unopened => {
                debug!(server = %self.server, "Closing tool server that never opened");
            }
            Connection::Closed => {}
        }
    }

    fn not_open(&self) -> InvocationError {
        InvocationError::NotOpen {
            server: self.server.clone(),
        }
    }
}

impl Drop for ToolClientHandle {
    fn drop(&mut self) {
        if let Connection::Open(_) = self.connection.get_mut() {
            // The session's own drop kills the child process.
            warn!(server = %self.server, "Tool client dropped while open");
        }
    }
}

impl std::fmt::Debug for ToolClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolClientHandle")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockToolServer;
    use serde_json::Map;

    #[tokio::test]
    async fn test_lifecycle() {
        let server = MockToolServer::new("github");
        let handle = ToolClientHandle::new(Arc::new(server.clone()));
        assert_eq!(handle.state().await, HandleState::Unopened);

        handle.open().await.unwrap();
        assert_eq!(handle.state().await, HandleState::Open);
        assert_eq!(server.connect_count(), 1);

        handle.close().await;
        assert_eq!(handle.state().await, HandleState::Closed);
        assert_eq!(server.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let server = MockToolServer::new("github");
        let handle = ToolClientHandle::new(Arc::new(server.clone()));
        handle.open().await.unwrap();

        handle.close().await;
        handle.close().await;
        handle.close().await;

        assert_eq!(server.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_close_never_opened() {
        let server = MockToolServer::new("github");
        let handle = ToolClientHandle::new(Arc::new(server.clone()));

        handle.close().await;

        assert_eq!(handle.state().await, HandleState::Closed);
        assert_eq!(server.connect_count(), 0);
        assert_eq!(server.shutdown_count(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_stays_unopened() {
        let server = MockToolServer::new("terraform").failing_connect();
        let handle = ToolClientHandle::new(Arc::new(server.clone()));

        let err = handle.open().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Spawn { .. }));
        assert_eq!(handle.state().await, HandleState::Unopened);

        handle.close().await;
        assert_eq!(server.shutdown_count(), 0);
    }

    #[tokio::test]
    async fn test_open_gives_up_after_connect_timeout() {
        let server = MockToolServer::new("terraform").hanging_connect();
        let handle = ToolClientHandle::new(Arc::new(server.clone()))
            .with_connect_timeout(Duration::from_millis(50));

        let err = handle.open().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
        assert_eq!(handle.state().await, HandleState::Unopened);

        handle.close().await;
        assert_eq!(handle.state().await, HandleState::Closed);
    }

    #[tokio::test]
    async fn test_closed_handle_does_not_reopen() {
        let server = MockToolServer::new("github");
        let handle = ToolClientHandle::new(Arc::new(server.clone()));
        handle.close().await;

        assert!(matches!(
            handle.open().await,
            Err(ConnectionError::Closed { .. })
        ));
        assert_eq!(server.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_invoke_requires_open() {
        let server = MockToolServer::new("github");
        let handle = ToolClientHandle::new(Arc::new(server.clone()));

        let err = handle
            .invoke(ToolRequest::new("search_issues", Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::NotOpen { .. }));

        handle.open().await.unwrap();
        let output = handle
            .invoke(ToolRequest::new("search_issues", Map::new()))
            .await
            .unwrap();
        assert!(!output.is_error);
        assert_eq!(server.recorded_calls().await.len(), 1);
    }
}
