//! Workers: named capability units the supervisor delegates tasks to.
//!
//! Each worker owns its [`ToolClientHandle`](crate::tool_client::ToolClientHandle)s
//! and exposes `start` / `perform` / `close` through the [`Worker`] trait. The production
//! implementation is [`AgentWorker`], an engine/tool loop; [`WorkerSet::from_config`]
//! wires the fetch, test and report roles.

mod agent;
mod error;
mod local_tools;
mod protocol;
mod roles;
mod traits;

pub use agent::AgentWorker;
pub use error::{ToolError, WorkerError};
pub use local_tools::{LocalTool, ReadWorkspaceFile, RunCommand, WriteReport, WriteWorkspaceFile};
pub use protocol::{parse_tool_call, CatalogEntry, ToolCall, LOCAL_SERVER};
pub use roles::{WorkerSet, FETCH_INSTRUCTIONS, REPORT_INSTRUCTIONS, TEST_INSTRUCTIONS};
pub use traits::{StartReport, Worker};
