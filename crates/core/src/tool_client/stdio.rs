//! MCP tool servers spawned as child processes.
//!
//! The server is started with piped stdin/stdout and spoken to through the `rmcp`
//! client. Results are read through their JSON form so that only the protocol's wire
//! field names (`name`, `description`, `inputSchema`, `content`, `isError`) matter here.

use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::ServiceExt;
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::{ConnectionError, InvocationError};
use super::traits::{ToolConnector, ToolSession};
use super::types::{ToolDescriptor, ToolOutput, ToolRequest};
use crate::config::ToolServerConfig;

/// Connector for an MCP server reached over child-process stdio.
#[derive(Debug, Clone)]
pub struct StdioToolServer {
    config: ToolServerConfig,
}

impl StdioToolServer {
    pub fn new(config: ToolServerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ToolConnector for StdioToolServer {
    fn server_name(&self) -> &str {
        &self.config.name
    }

    async fn connect(&self) -> Result<Box<dyn ToolSession>, ConnectionError> {
        let name = &self.config.name;
        debug!(
            server = %name,
            command = %self.config.command,
            args = ?self.config.args,
            "Spawning tool server"
        );

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let transport =
            TokioChildProcess::new(&mut cmd).map_err(|e| ConnectionError::spawn(name, e))?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| ConnectionError::handshake(name, e))?;

        Ok(Box::new(McpSession {
            server: name.clone(),
            service: Some(service),
        }))
    }
}

struct McpSession {
    server: String,
    service: Option<RunningService<RoleClient, ()>>,
}

impl McpSession {
    fn service(&self) -> Result<&RunningService<RoleClient, ()>, InvocationError> {
        self.service.as_ref().ok_or_else(|| InvocationError::NotOpen {
            server: self.server.clone(),
        })
    }
}

#[async_trait]
impl ToolSession for McpSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, InvocationError> {
        let tools = self
            .service()?
            .peer()
            .list_all_tools()
            .await
            .map_err(|e| InvocationError::call_failed(&self.server, "tools/list", e))?;

        Ok(tools
            .iter()
            .filter_map(|tool| serde_json::to_value(tool).ok())
            .filter_map(|value| descriptor_from_value(&value))
            .collect())
    }

    async fn call_tool(&self, request: ToolRequest) -> Result<ToolOutput, InvocationError> {
        let tool = request.tool.clone();
        let result = self
            .service()?
            .peer()
            .call_tool(CallToolRequestParam {
                name: request.tool.into(),
                arguments: Some(request.arguments),
            })
            .await
            .map_err(|e| InvocationError::call_failed(&self.server, &tool, e))?;

        let value = serde_json::to_value(&result)
            .map_err(|e| InvocationError::call_failed(&self.server, &tool, e))?;
        Ok(output_from_value(&value))
    }

    async fn shutdown(&mut self) {
        if let Some(service) = self.service.take() {
            if let Err(e) = service.cancel().await {
                warn!(server = %self.server, error = %e, "Tool server did not shut down cleanly");
            }
        }
    }
}

fn descriptor_from_value(value: &Value) -> Option<ToolDescriptor> {
    let name = value.get("name")?.as_str()?.to_string();
    let description = value
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let input_schema = value.get("inputSchema").cloned().unwrap_or(Value::Null);
    Some(ToolDescriptor {
        name,
        description,
        input_schema,
    })
}

fn output_from_value(value: &Value) -> ToolOutput {
    let text = value
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    let is_error = value
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    ToolOutput { text, is_error }
}
