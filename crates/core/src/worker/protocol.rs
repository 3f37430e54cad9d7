//! Text protocol between a worker and its reasoning engine.
//!
//! The engine either answers in prose (the final answer) or replies with exactly one
//! JSON object requesting a tool call:
//!
//! ```text
//! {"tool": "<server>.<tool>", "arguments": {...}}
//! ```

use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::tool_client::ToolDescriptor;

/// Qualifier for tools implemented in-process.
pub const LOCAL_SERVER: &str = "local";

/// A tool call requested by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub server: String,
    pub tool: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.server, self.tool)
    }
}

/// One entry of a worker's tool catalog.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub server: String,
    pub tool: ToolDescriptor,
}

impl CatalogEntry {
    pub fn new(server: impl Into<String>, tool: ToolDescriptor) -> Self {
        Self {
            server: server.into(),
            tool,
        }
    }
}

/// Interpret an engine reply as a tool call, if it is one.
pub fn parse_tool_call(reply: &str) -> Option<ToolCall> {
    let body = strip_fence(reply.trim());
    if !body.starts_with('{') {
        return None;
    }

    let value: Value = serde_json::from_str(body).ok()?;
    let qualified = value.get("tool")?.as_str()?;
    let (server, tool) = qualified.split_once('.')?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }

    let arguments = match value.get("arguments") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    Some(ToolCall {
        server: server.to_string(),
        tool: tool.to_string(),
        arguments,
    })
}

fn strip_fence(text: &str) -> &str {
    let Ok(fence) = Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```$") else {
        return text;
    };
    match fence.captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str(),
        None => text,
    }
}

/// Compose the system prompt: role instructions, tool catalog and call protocol.
pub fn system_prompt(instructions: &str, catalog: &[CatalogEntry]) -> String {
    let mut prompt = String::from(instructions.trim());
    prompt.push_str("\n\n## Tools\n");

    if catalog.is_empty() {
        prompt.push_str("No tools are available. Answer from the task alone.\n");
        return prompt;
    }

    for entry in catalog {
        prompt.push_str(&format!("- `{}.{}`", entry.server, entry.tool.name));
        if !entry.tool.description.is_empty() {
            prompt.push_str(&format!(": {}", entry.tool.description.trim()));
        }
        prompt.push('\n');
        if !entry.tool.input_schema.is_null() {
            prompt.push_str(&format!("  input schema: {}\n", entry.tool.input_schema));
        }
    }

    prompt.push_str(
        "\nTo call a tool, reply with only a JSON object of the form \
         {\"tool\": \"<server>.<tool>\", \"arguments\": {...}}. \
         The tool's output is sent back to you. \
         When you are done, reply with your final answer as plain text.\n",
    );
    prompt
}

/// Message fed back to the engine after a tool call.
pub fn tool_result_message(call: &ToolCall, result: Result<String, String>) -> String {
    match result {
        Ok(text) => format!("Tool `{}` returned:\n{}", call.qualified_name(), text),
        Err(error) => format!("Tool `{}` failed: {}", call.qualified_name(), error),
    }
}
