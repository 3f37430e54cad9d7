//! Testing utilities and mock implementations.
//!
//! Mocks for every external seam of the supervisor, so a full run can be exercised
//! without spawning tool servers or calling a model.
//!
//! # Example
//!
//! ```rust,ignore
//! use prism_core::testing::{fixtures, MockWorker};
//!
//! let fetch = MockWorker::new("fetch");
//! fetch.push_result(fixtures::items_json(&fixtures::work_items(3))).await;
//!
//! let workers = WorkerSet::new(
//!     Arc::new(fetch.clone()),
//!     Arc::new(MockWorker::new("test")),
//!     Arc::new(MockWorker::new("report")),
//! );
//! ```

mod mock_llm;
mod mock_tool_server;
mod mock_worker;

pub use mock_llm::MockLlmClient;
pub use mock_tool_server::MockToolServer;
pub use mock_worker::{MockWorker, PerformHook};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::PathBuf;

    use crate::item::WorkItem;
    use crate::workspace::WorkspaceLayout;

    /// Create a test work item with reasonable defaults.
    pub fn work_item(id: &str) -> WorkItem {
        WorkItem::new(id, format!("awscc resource fails to apply ({})", id))
            .with_description("Apply fails with a schema validation error.")
            .with_extracted_config(format!(
                "resource \"awscc_s3_bucket\" \"b{id}\" {{\n  bucket_name = \"bucket-{id}\"\n}}"
            ))
    }

    /// Items with ids "1" through "n".
    pub fn work_items(n: usize) -> Vec<WorkItem> {
        (1..=n).map(|i| work_item(&i.to_string())).collect()
    }

    /// Serialize items the way the fetch worker reports them.
    pub fn items_json(items: &[WorkItem]) -> String {
        serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
    }

    /// Populate `item_<id>/` with every transient entry of the layout plus a durable
    /// `main.<durable_extension>` file. The first transient entry is created as a
    /// non-empty directory, the rest as files. Returns the workspace directory.
    pub fn seed_workspace(layout: &WorkspaceLayout, id: &str) -> std::io::Result<PathBuf> {
        let dir = layout
            .item_dir(id)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        std::fs::create_dir_all(&dir)?;

        for (i, name) in layout.transient.iter().enumerate() {
            let path = dir.join(name);
            if i == 0 {
                std::fs::create_dir_all(path.join("providers"))?;
                std::fs::write(path.join("providers/plugin.bin"), vec![0u8; 64])?;
            } else {
                std::fs::write(path, "transient")?;
            }
        }

        std::fs::write(
            dir.join(format!("main.{}", layout.durable_extension)),
            "resource \"awscc_s3_bucket\" \"b\" {}\n",
        )?;
        Ok(dir)
    }
}
