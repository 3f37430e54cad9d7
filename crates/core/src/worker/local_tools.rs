//! Tools implemented in-process and exposed to the engine as `local.<name>`.
//!
//! All of them are scoped to item workspaces: paths are always derived from an item id
//! and a single file name through [`WorkspaceLayout`], never taken verbatim.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::error::ToolError;
use crate::config::ExecutionConfig;
use crate::tool_client::ToolDescriptor;
use crate::workspace::{ReportWriter, WorkspaceError, WorkspaceLayout};

/// A tool the worker runs itself instead of delegating to a server.
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn name(&self) -> &str;

    fn descriptor(&self) -> ToolDescriptor;

    async fn call(&self, arguments: &Map<String, Value>) -> Result<String, ToolError>;
}

fn string_arg<'a>(
    arguments: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, ToolError> {
    match arguments.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ToolError::InvalidArgument {
            name,
            reason: "expected a string".to_string(),
        }),
        None => Err(ToolError::MissingArgument(name)),
    }
}

/// Item ids may arrive as JSON numbers from the engine.
fn item_id_arg(arguments: &Map<String, Value>) -> Result<String, ToolError> {
    match arguments.get("item_id") {
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => string_arg(arguments, "item_id").map(str::to_string),
    }
}

/// Restrict a local tool call to `item_id`, filling the argument in when it is missing.
pub fn bind_item(
    arguments: &Map<String, Value>,
    item_id: &str,
) -> Result<Map<String, Value>, ToolError> {
    let mut bound = arguments.clone();
    if arguments.contains_key("item_id") {
        let requested = item_id_arg(arguments)?;
        if requested != item_id {
            return Err(ToolError::OutOfScope {
                requested,
                current: item_id.to_string(),
            });
        }
    } else {
        bound.insert("item_id".to_string(), Value::String(item_id.to_string()));
    }
    Ok(bound)
}

fn descriptor(name: &str, description: &str, required: &[&str]) -> ToolDescriptor {
    let properties: Map<String, Value> = required
        .iter()
        .map(|field| (field.to_string(), json!({"type": "string"})))
        .collect();
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

/// `local.write_workspace_file`: write a file into `item_<id>/`, creating the directory.
#[derive(Debug, Clone)]
pub struct WriteWorkspaceFile {
    layout: WorkspaceLayout,
}

impl WriteWorkspaceFile {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl LocalTool for WriteWorkspaceFile {
    fn name(&self) -> &str {
        "write_workspace_file"
    }

    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            self.name(),
            "Write a file into the item's workspace directory.",
            &["item_id", "filename", "content"],
        )
    }

    async fn call(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let item_id = item_id_arg(arguments)?;
        let filename = string_arg(arguments, "filename")?;
        let content = string_arg(arguments, "content")?;

        let dir = self.layout.item_dir(&item_id)?;
        let path = self.layout.item_file(&item_id, filename)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| WorkspaceError::io(&dir, e))?;
        fs::write(&path, content)
            .await
            .map_err(|e| WorkspaceError::io(&path, e))?;

        debug!(item_id = %item_id, path = %path.display(), "Wrote workspace file");
        Ok(format!("wrote {} bytes to {}", content.len(), path.display()))
    }
}

/// `local.read_workspace_file`: read a file from `item_<id>/`.
#[derive(Debug, Clone)]
pub struct ReadWorkspaceFile {
    layout: WorkspaceLayout,
}

impl ReadWorkspaceFile {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl LocalTool for ReadWorkspaceFile {
    fn name(&self) -> &str {
        "read_workspace_file"
    }

    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            self.name(),
            "Read a file from the item's workspace directory.",
            &["item_id", "filename"],
        )
    }

    async fn call(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let item_id = item_id_arg(arguments)?;
        let filename = string_arg(arguments, "filename")?;
        let path = self.layout.item_file(&item_id, filename)?;

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| WorkspaceError::io(&path, e))?;
        Ok(content)
    }
}

/// `local.run_command`: run an allow-listed program inside `item_<id>/`.
///
/// Refuses unless commands are auto-approved for this run and the program is on the
/// allow list. A non-zero exit status is a normal result, not an error.
#[derive(Debug, Clone)]
pub struct RunCommand {
    layout: WorkspaceLayout,
    execution: ExecutionConfig,
}

impl RunCommand {
    pub fn new(layout: WorkspaceLayout, execution: ExecutionConfig) -> Self {
        Self { layout, execution }
    }

    fn check_allowed(&self, program: &str) -> Result<(), ToolError> {
        if !self.execution.auto_approve_commands {
            return Err(ToolError::Refused(
                "command execution is not approved for this run".to_string(),
            ));
        }
        if !self.execution.allowed_commands.iter().any(|c| c == program) {
            return Err(ToolError::Refused(format!(
                "'{}' is not an allowed command (allowed: {})",
                program,
                self.execution.allowed_commands.join(", ")
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalTool for RunCommand {
    fn name(&self) -> &str {
        "run_command"
    }

    fn descriptor(&self) -> ToolDescriptor {
        let mut descriptor = descriptor(
            self.name(),
            "Run an allowed program inside the item's workspace directory.",
            &["item_id", "program"],
        );
        descriptor.input_schema["properties"]["args"] =
            json!({"type": "array", "items": {"type": "string"}});
        descriptor
    }

    async fn call(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let item_id = item_id_arg(arguments)?;
        let program = string_arg(arguments, "program")?;
        let args: Vec<String> = match arguments.get("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(_) => {
                return Err(ToolError::InvalidArgument {
                    name: "args",
                    reason: "expected an array of strings".to_string(),
                })
            }
        };

        if let Err(e) = self.check_allowed(program) {
            warn!(item_id = %item_id, program, "Refused command");
            return Err(e);
        }

        let dir = self.layout.item_dir(&item_id)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| WorkspaceError::io(&dir, e))?;

        info!(item_id = %item_id, program, args = ?args, "Running command");

        let secs = self.execution.command_timeout_secs;
        let mut cmd = Command::new(program);
        cmd.args(&args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(secs), cmd.output())
            .await
            .map_err(|_| ToolError::Timeout {
                program: program.to_string(),
                secs,
            })?
            .map_err(|e| ToolError::CommandFailed {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        let status = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "terminated by signal".to_string());

        Ok(format!(
            "exit status: {}\n--- stdout ---\n{}\n--- stderr ---\n{}",
            status,
            String::from_utf8_lossy(&output.stdout).trim_end(),
            String::from_utf8_lossy(&output.stderr).trim_end()
        ))
    }
}

/// `local.write_report`: write (or overwrite) the item's single report artifact.
#[derive(Debug, Clone)]
pub struct WriteReport {
    writer: ReportWriter,
}

impl WriteReport {
    pub fn new(writer: ReportWriter) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl LocalTool for WriteReport {
    fn name(&self) -> &str {
        "write_report"
    }

    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            self.name(),
            "Write the triage report for an item. Calling it again replaces the report.",
            &["item_id", "content"],
        )
    }

    async fn call(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let item_id = item_id_arg(arguments)?;
        let content = string_arg(arguments, "content")?;
        let path = self.writer.write(&item_id, content).await?;
        Ok(format!("report written to {}", path.display()))
    }
}
