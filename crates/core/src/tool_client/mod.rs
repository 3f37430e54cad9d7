//! Tool server connections owned by workers.
//!
//! A [`ToolClientHandle`] wraps one external tool server (an MCP server running as a
//! child process) behind an explicit `Unopened -> Open -> Closed` state machine:
//!
//! - opening spawns the process and performs the handshake;
//! - invoking requires the `Open` state;
//! - closing terminates the process, is idempotent and never fails, so it can run from
//!   any cleanup path, including for handles that never opened.
//!
//! The transport sits behind [`ToolConnector`]/[`ToolSession`]; [`StdioToolServer`] is
//! the production implementation, [`crate::testing::MockToolServer`] the test one.

mod error;
mod handle;
mod stdio;
mod traits;
mod types;

pub use error::{ConnectionError, InvocationError};
pub use handle::ToolClientHandle;
pub use stdio::StdioToolServer;
pub use traits::{ToolConnector, ToolSession};
pub use types::{HandleState, ToolDescriptor, ToolOutput, ToolRequest};
