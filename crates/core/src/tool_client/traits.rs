//! Transport seam for tool servers.

use async_trait::async_trait;

use super::error::{ConnectionError, InvocationError};
use super::types::{ToolDescriptor, ToolOutput, ToolRequest};

/// Something that can bring up a tool server and hand back a live session.
#[async_trait]
pub trait ToolConnector: Send + Sync {
    /// Name used to qualify this server's tools.
    fn server_name(&self) -> &str;

    /// Start the server and complete the protocol handshake.
    async fn connect(&self) -> Result<Box<dyn ToolSession>, ConnectionError>;
}

/// A live connection to a tool server.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Tools the server advertises.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, InvocationError>;

    /// Invoke one tool.
    async fn call_tool(&self, request: ToolRequest) -> Result<ToolOutput, InvocationError>;

    /// Terminate the session and its server process. Must not fail.
    async fn shutdown(&mut self);
}
