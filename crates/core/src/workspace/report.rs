//! One report artifact per item.

use std::path::PathBuf;
use tokio::fs;
use tracing::info;

use super::{WorkspaceError, WorkspaceLayout};

/// Writes `report_<id>` artifacts.
///
/// Writing twice for the same id replaces the previous report; there is never more than
/// one artifact per item. Content is staged in a sibling file and renamed into place so a
/// reader never sees a half-written report.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    layout: WorkspaceLayout,
}

impl ReportWriter {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self { layout }
    }

    /// Path of the report for `item_id`.
    pub fn path_for(&self, item_id: &str) -> Result<PathBuf, WorkspaceError> {
        self.layout.report_path(item_id)
    }

    /// Write (or overwrite) the report for `item_id`.
    pub async fn write(&self, item_id: &str, content: &str) -> Result<PathBuf, WorkspaceError> {
        let path = self.layout.report_path(item_id)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| WorkspaceError::io(parent, e))?;
        }

        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, content)
            .await
            .map_err(|e| WorkspaceError::io(&staging, e))?;
        if let Err(e) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(WorkspaceError::io(&path, e));
        }

        info!(item_id, path = %path.display(), bytes = content.len(), "Report written");
        Ok(path)
    }
}
