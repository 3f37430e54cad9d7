pub mod config;
pub mod item;
pub mod llm;
pub mod supervisor;
pub mod testing;
pub mod tool_client;
pub mod worker;
pub mod workspace;

pub use config::{
    load_config, load_config_from_str, validate_config, ConfigError, RunConfig, SanitizedConfig,
};
pub use item::{parse_work_items, ItemError, ItemIds, WorkItem};
pub use llm::{create_llm_client, LlmClient, LlmError};
pub use supervisor::{
    ItemOutcome, ItemStage, RunError, RunEvent, RunEventCallback, RunPhase, RunSummary,
    ShutdownHandle, StepStatus, Supervisor,
};
pub use tool_client::{
    ConnectionError, HandleState, InvocationError, StdioToolServer, ToolClientHandle,
};
pub use worker::{AgentWorker, StartReport, Worker, WorkerError, WorkerSet};
pub use workspace::{
    CleanupReport, CleanupWarning, ReportWriter, WorkItemCleaner, WorkspaceError, WorkspaceLayout,
};
