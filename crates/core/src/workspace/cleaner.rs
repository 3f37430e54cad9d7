//! Transient artifact removal for item workspaces.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use super::WorkspaceLayout;

/// A transient path that could not be removed. Logged, never escalated.
#[derive(Debug, Clone, Error)]
#[error("failed to remove {}: {message}", .path.display())]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of cleaning one item workspace.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub item_id: String,
    /// Transient paths that existed and were removed.
    pub removed: Vec<PathBuf>,
    /// Transient paths that were already gone.
    pub already_absent: usize,
    /// Durable files left in place.
    pub preserved_durable: usize,
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    fn new(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            ..Default::default()
        }
    }

    /// True when every transient path is gone.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Removes the fixed transient path set of an item workspace.
///
/// Removal is idempotent: cleaning the same id twice, or an id whose directory does not
/// exist, succeeds and leaves the filesystem in the same state. Each path is removed
/// independently so that one failure does not block the others.
#[derive(Debug, Clone)]
pub struct WorkItemCleaner {
    layout: WorkspaceLayout,
}

impl WorkItemCleaner {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Remove the transient artifacts of `item_id`, preserving durable ones.
    pub async fn clean(&self, item_id: &str) -> CleanupReport {
        let mut report = CleanupReport::new(item_id);

        let (dir, paths) = match self
            .layout
            .item_dir(item_id)
            .and_then(|dir| Ok((dir, self.layout.transient_paths(item_id)?)))
        {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(item_id, error = %e, "Refusing to clean workspace");
                report.warnings.push(CleanupWarning {
                    path: PathBuf::from(item_id),
                    message: e.to_string(),
                });
                return report;
            }
        };

        if !dir.is_dir() {
            debug!(item_id, dir = %dir.display(), "No workspace to clean");
            report.already_absent = paths.len();
            return report;
        }

        for path in paths {
            if self.layout.is_durable(&path) {
                warn!(path = %path.display(), "Transient entry matches the durable pattern; kept");
                continue;
            }
            match remove_path(&path).await {
                Ok(true) => {
                    debug!(path = %path.display(), "Removed transient artifact");
                    report.removed.push(path);
                }
                Ok(false) => report.already_absent += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cleanup warning");
                    report.warnings.push(CleanupWarning {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }

        report.preserved_durable = self.count_durable(&dir).await;

        info!(
            item_id,
            removed = report.removed.len(),
            preserved = report.preserved_durable,
            warnings = report.warnings.len(),
            "Cleaned workspace {}",
            dir.display()
        );

        report
    }

    /// Whether any transient artifact of `item_id` is still present.
    pub async fn has_pending(&self, item_id: &str) -> bool {
        let Ok(paths) = self.layout.transient_paths(item_id) else {
            return false;
        };
        for path in paths.iter().filter(|p| !self.layout.is_durable(p)) {
            if fs::symlink_metadata(path).await.is_ok() {
                return true;
            }
        }
        false
    }

    /// Ids of every item workspace under the root, sorted.
    pub async fn workspace_ids(&self) -> Vec<String> {
        let mut entries = match fs::read_dir(&self.layout.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.layout.root.display(), error = %e, "Failed to list workspaces");
                return Vec::new();
            }
        };

        let mut ids = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let is_dir = entry
                        .file_type()
                        .await
                        .map(|t| t.is_dir())
                        .unwrap_or(false);
                    if !is_dir {
                        continue;
                    }
                    let name = entry.file_name();
                    if let Some(id) = name
                        .to_str()
                        .and_then(|n| self.layout.item_id_from_dir_name(n))
                    {
                        ids.push(id.to_string());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read workspace entry");
                    break;
                }
            }
        }
        ids.sort();
        ids
    }

    /// Best-effort end-of-run pass: re-clean every workspace that still holds
    /// transient artifacts (e.g. items interrupted before their inline cleanup).
    pub async fn sweep(&self) -> Vec<CleanupReport> {
        let mut reports = Vec::new();
        for id in self.workspace_ids().await {
            if self.has_pending(&id).await {
                info!(item_id = %id, "Final sweep cleaning leftover artifacts");
                reports.push(self.clean(&id).await);
            }
        }
        reports
    }

    async fn count_durable(&self, dir: &Path) -> usize {
        let Ok(mut entries) = fs::read_dir(dir).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if self.layout.is_durable(&entry.path()) {
                count += 1;
            }
        }
        count
    }
}

/// Remove a file, symlink or directory tree. `Ok(false)` if nothing was there.
async fn remove_path(path: &Path) -> std::io::Result<bool> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
