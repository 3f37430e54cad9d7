//! Construction of the three pipeline workers from configuration.

use std::sync::Arc;
use std::time::Duration;

use super::agent::AgentWorker;
use super::local_tools::{ReadWorkspaceFile, RunCommand, WriteReport, WriteWorkspaceFile};
use super::traits::Worker;
use crate::config::{RunConfig, WorkerConfig};
use crate::llm::{create_llm_client, LlmClient, LlmError};
use crate::tool_client::{StdioToolServer, ToolClientHandle};
use crate::workspace::ReportWriter;

pub const FETCH_INSTRUCTIONS: &str = "\
You are an issue tracker specialist. Use the tracker tools to search the repository's \
open issues matching the requested labels and age. For every issue, extract the \
configuration snippet from its description verbatim. Reply with only a JSON array of \
objects with the keys \"id\", \"title\", \"description\" and \"extracted_config\", in the \
order the tracker returned them. Reply with [] when nothing matches.";

pub const TEST_INSTRUCTIONS: &str = "\
You are an infrastructure testing specialist. Materialize the configuration you are given \
as files in the item's workspace with local.write_workspace_file, then validate and plan \
it with the available tools (local.run_command runs allow-listed programs inside the \
workspace). Record every command you ran and its outcome. Do not remove any files; \
cleanup happens after you finish. Reply with a plain-text summary of the results and the \
exact errors you observed.";

pub const REPORT_INSTRUCTIONS: &str = "\
You are a provider analysis expert. Using the issue, the test results and the reference \
documentation tools, diagnose the root cause, classify the issue (bug, schema \
discrepancy, upstream service limitation, or usage error) and recommend next steps. \
Write the complete report in Markdown with local.write_report exactly once for the item, \
then reply with a one-paragraph summary.";

/// The three workers the supervisor drives.
#[derive(Clone)]
pub struct WorkerSet {
    pub fetch: Arc<dyn Worker>,
    pub test: Arc<dyn Worker>,
    pub report: Arc<dyn Worker>,
}

impl WorkerSet {
    pub fn new(fetch: Arc<dyn Worker>, test: Arc<dyn Worker>, report: Arc<dyn Worker>) -> Self {
        Self {
            fetch,
            test,
            report,
        }
    }

    /// Build production workers, creating the engine client from `config.model`.
    pub fn from_config(config: &RunConfig) -> Result<Self, LlmError> {
        let llm = create_llm_client(&config.model)?;
        Ok(Self::with_llm(config, llm))
    }

    /// Build production workers around an existing engine client.
    pub fn with_llm(config: &RunConfig, llm: Arc<dyn LlmClient>) -> Self {
        let layout = &config.workspace;

        let fetch = agent("fetch", FETCH_INSTRUCTIONS, &config.workers.fetch, config, &llm);

        let test = agent("test", TEST_INSTRUCTIONS, &config.workers.test, config, &llm)
            .with_local_tool(Arc::new(WriteWorkspaceFile::new(layout.clone())))
            .with_local_tool(Arc::new(ReadWorkspaceFile::new(layout.clone())))
            .with_local_tool(Arc::new(RunCommand::new(
                layout.clone(),
                config.execution.clone(),
            )));

        let report = agent("report", REPORT_INSTRUCTIONS, &config.workers.report, config, &llm)
            .with_local_tool(Arc::new(ReadWorkspaceFile::new(layout.clone())))
            .with_local_tool(Arc::new(WriteReport::new(ReportWriter::new(layout.clone()))));

        Self::new(Arc::new(fetch), Arc::new(test), Arc::new(report))
    }

    /// Workers in the order they are started and closed.
    pub fn all(&self) -> [&Arc<dyn Worker>; 3] {
        [&self.fetch, &self.test, &self.report]
    }
}

impl std::fmt::Debug for WorkerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSet")
            .field("fetch", &self.fetch.name())
            .field("test", &self.test.name())
            .field("report", &self.report.name())
            .finish()
    }
}

fn agent(
    name: &str,
    instructions: &str,
    worker: &WorkerConfig,
    config: &RunConfig,
    llm: &Arc<dyn LlmClient>,
) -> AgentWorker {
    let agent = AgentWorker::new(name, instructions, Arc::clone(llm))
        .with_max_steps(worker.max_steps)
        .with_sampling(config.model.temperature, config.model.max_tokens);

    let connect_timeout = Duration::from_secs(config.supervisor.connect_timeout_secs);
    worker.servers.iter().fold(agent, |agent, server| {
        agent.with_handle(
            ToolClientHandle::new(Arc::new(StdioToolServer::new(server.clone())))
                .with_connect_timeout(connect_timeout),
        )
    })
}
