use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::workspace::WorkspaceLayout;

/// Root configuration for one triage run.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default, alias = "github")]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub workspace: WorkspaceLayout,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Anthropic Messages API.
    #[default]
    Anthropic,
    /// Local Ollama instance.
    Ollama,
}

/// Model parameters shared by every worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// API key. Falls back to `ANTHROPIC_API_KEY` for the Anthropic provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API base URL (for proxies or self-hosted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model_id: default_model_id(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
            api_base: None,
            timeout_secs: default_model_timeout(),
        }
    }
}

fn default_model_id() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_model_timeout() -> u64 {
    120
}

/// Remote tracker query parameters handed to the fetch worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_repository")]
    pub repository: String,
    /// Upper bound on items processed per run.
    #[serde(default = "default_max_items", alias = "max_issues")]
    pub max_items: usize,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    #[serde(default = "default_include_labels")]
    pub include_labels: BTreeSet<String>,
    #[serde(default = "default_exclude_labels")]
    pub exclude_labels: BTreeSet<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            max_items: default_max_items(),
            max_age_days: default_max_age_days(),
            include_labels: default_include_labels(),
            exclude_labels: default_exclude_labels(),
        }
    }
}

fn default_repository() -> String {
    "hashicorp/terraform-provider-awscc".to_string()
}

fn default_max_items() -> usize {
    1
}

fn default_max_age_days() -> u32 {
    10
}

fn default_include_labels() -> BTreeSet<String> {
    BTreeSet::from(["needs-triage".to_string()])
}

fn default_exclude_labels() -> BTreeSet<String> {
    BTreeSet::from(["resource-suppression".to_string()])
}

/// An MCP tool server launched as a child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Name used to qualify the server's tools (`<name>.<tool>`).
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ToolServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
        }
    }
}

/// Per-role worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub servers: Vec<ToolServerConfig>,
    /// Maximum engine round-trips per `perform` call.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

fn default_max_steps() -> u32 {
    12
}

impl WorkerConfig {
    fn with_servers(servers: Vec<ToolServerConfig>) -> Self {
        Self {
            servers,
            max_steps: default_max_steps(),
        }
    }
}

/// Worker wiring for the three pipeline roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_fetch_worker")]
    pub fetch: WorkerConfig,
    #[serde(default = "default_test_worker")]
    pub test: WorkerConfig,
    #[serde(default = "default_report_worker")]
    pub report: WorkerConfig,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            fetch: default_fetch_worker(),
            test: default_test_worker(),
            report: default_report_worker(),
        }
    }
}

fn default_fetch_worker() -> WorkerConfig {
    WorkerConfig::with_servers(vec![ToolServerConfig::new(
        "github",
        "npx",
        &["-y", "@modelcontextprotocol/server-github"],
    )])
}

fn default_test_worker() -> WorkerConfig {
    WorkerConfig::with_servers(vec![ToolServerConfig::new(
        "terraform",
        "finch",
        &["run", "-i", "--rm", "hashicorp/terraform-mcp-server"],
    )])
}

fn default_report_worker() -> WorkerConfig {
    WorkerConfig::with_servers(vec![ToolServerConfig::new(
        "aws-docs",
        "uvx",
        &["awslabs.aws-documentation-mcp-server@latest"],
    )])
}

/// Side-effecting command execution policy for the test worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Run allowed commands without refusing. Scoped to this run.
    #[serde(default)]
    pub auto_approve_commands: bool,
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            auto_approve_commands: false,
            allowed_commands: default_allowed_commands(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_allowed_commands() -> Vec<String> {
    vec!["terraform".to_string()]
}

fn default_command_timeout() -> u64 {
    600
}

/// Supervisor behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Upper bound for one worker call. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,
    /// Upper bound for spawning a tool server and completing its handshake.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Sweep leftover `item_*` workspaces at the end of the run.
    #[serde(default = "default_final_sweep")]
    pub final_sweep: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: None,
            connect_timeout_secs: default_connect_timeout(),
            final_sweep: default_final_sweep(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    120
}

fn default_final_sweep() -> bool {
    true
}

/// Config view safe for logging (secrets redacted).
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub provider: LlmProvider,
    pub model_id: String,
    pub api_key_configured: bool,
    pub tracker: TrackerConfig,
    pub workspace_root: String,
    pub auto_approve_commands: bool,
    pub servers: Vec<String>,
}

impl From<&RunConfig> for SanitizedConfig {
    fn from(config: &RunConfig) -> Self {
        let servers = [
            ("fetch", &config.workers.fetch),
            ("test", &config.workers.test),
            ("report", &config.workers.report),
        ]
        .iter()
        .flat_map(|(role, worker)| {
            worker
                .servers
                .iter()
                .map(move |s| format!("{}:{}", role, s.name))
        })
        .collect();

        Self {
            provider: config.model.provider,
            model_id: config.model.model_id.clone(),
            api_key_configured: config.model.api_key.is_some(),
            tracker: config.tracker.clone(),
            workspace_root: config.workspace.root.display().to_string(),
            auto_approve_commands: config.execution.auto_approve_commands,
            servers,
        }
    }
}
