//! Per-item workspace layout, cleanup protocol and report artifacts.
//!
//! Every work item owns one directory, `<root>/<item_prefix><id>/`, and at most one
//! report, `<root>/<report_prefix><id>.<report_extension>`. Inside the directory:
//!
//! - **transient** entries (a fixed list of names) are large or regenerable and are
//!   removed by [`WorkItemCleaner`] after the test step;
//! - **durable** entries (`*.<durable_extension>`) are kept for human review, as is the
//!   directory itself.

mod cleaner;
mod report;

pub use cleaner::{CleanupReport, CleanupWarning, WorkItemCleaner};
pub use report::ReportWriter;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while resolving or touching workspace paths.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The id (or file name) cannot be used as a single path component.
    #[error("unsafe path component: {0:?}")]
    UnsafeComponent(String),

    /// I/O failure on a workspace path.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Returns true if `name` is usable as exactly one path component.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Filesystem layout for item workspaces and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceLayout {
    /// Run working directory holding item workspaces and reports.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_item_prefix")]
    pub item_prefix: String,
    #[serde(default = "default_report_prefix")]
    pub report_prefix: String,
    #[serde(default = "default_report_extension")]
    pub report_extension: String,
    /// Files with this extension are preserved by cleanup.
    #[serde(default = "default_durable_extension")]
    pub durable_extension: String,
    /// Names removed from each item directory after the test step.
    #[serde(default = "default_transient")]
    pub transient: Vec<String>,
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self {
            root: default_root(),
            item_prefix: default_item_prefix(),
            report_prefix: default_report_prefix(),
            report_extension: default_report_extension(),
            durable_extension: default_durable_extension(),
            transient: default_transient(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_item_prefix() -> String {
    "item_".to_string()
}

fn default_report_prefix() -> String {
    "report_".to_string()
}

fn default_report_extension() -> String {
    "md".to_string()
}

fn default_durable_extension() -> String {
    "cfg".to_string()
}

fn default_transient() -> Vec<String> {
    [".cache_state", ".lock_metadata", "state.db", "state.db.backup"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl WorkspaceLayout {
    /// Default layout rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Directory owned by `item_id`.
    pub fn item_dir(&self, item_id: &str) -> Result<PathBuf, WorkspaceError> {
        check_component(item_id)?;
        Ok(self.root.join(format!("{}{}", self.item_prefix, item_id)))
    }

    /// The single report artifact for `item_id`.
    pub fn report_path(&self, item_id: &str) -> Result<PathBuf, WorkspaceError> {
        check_component(item_id)?;
        Ok(self.root.join(format!(
            "{}{}.{}",
            self.report_prefix, item_id, self.report_extension
        )))
    }

    /// A file directly inside the item's directory.
    pub fn item_file(&self, item_id: &str, file_name: &str) -> Result<PathBuf, WorkspaceError> {
        check_component(file_name)?;
        Ok(self.item_dir(item_id)?.join(file_name))
    }

    /// The fixed transient path set for `item_id`.
    pub fn transient_paths(&self, item_id: &str) -> Result<Vec<PathBuf>, WorkspaceError> {
        let dir = self.item_dir(item_id)?;
        Ok(self.transient.iter().map(|name| dir.join(name)).collect())
    }

    /// Whether `path` matches the durable artifact pattern.
    pub fn is_durable(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == self.durable_extension)
    }

    /// Recover the item id from a workspace directory name.
    pub fn item_id_from_dir_name<'a>(&self, dir_name: &'a str) -> Option<&'a str> {
        dir_name
            .strip_prefix(self.item_prefix.as_str())
            .filter(|id| is_safe_component(id))
    }
}

fn check_component(name: &str) -> Result<(), WorkspaceError> {
    if is_safe_component(name) {
        Ok(())
    } else {
        Err(WorkspaceError::UnsafeComponent(name.to_string()))
    }
}
