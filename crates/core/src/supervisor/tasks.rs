//! Task texts handed to the workers.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeSet;

use crate::config::TrackerConfig;
use crate::item::WorkItem;
use crate::workspace::{CleanupReport, WorkspaceLayout};
use crate::worker::WorkerError;

fn label_list(labels: &BTreeSet<String>) -> String {
    if labels.is_empty() {
        "(none)".to_string()
    } else {
        labels.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Ask the fetch worker for at most `max_items` items newer than the cut-off.
pub fn fetch_task(tracker: &TrackerConfig, now: DateTime<Utc>) -> String {
    // Ages past the calendar's range mean "no cut-off".
    let cutoff = TimeDelta::try_days(i64::from(tracker.max_age_days))
        .and_then(|age| now.checked_sub_signed(age))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "any date".to_string());
    format!(
        "Fetch open issues for triage.\n\
         \n\
         - Repository: {repository}\n\
         - Maximum issues: {max_items}\n\
         - Created on or after: {cutoff} ({days} days)\n\
         - Include labels: {include}\n\
         - Exclude labels: {exclude}\n\
         \n\
         Return the newest matching issues first. Reply with only the JSON array.",
        repository = tracker.repository,
        max_items = tracker.max_items,
        cutoff = cutoff,
        days = tracker.max_age_days,
        include = label_list(&tracker.include_labels),
        exclude = label_list(&tracker.exclude_labels),
    )
}

/// Ask the test worker to materialize and exercise the item's configuration.
pub fn test_task(item: &WorkItem, layout: &WorkspaceLayout) -> String {
    let workspace = layout
        .item_dir(&item.id)
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let config = if item.extracted_config.trim().is_empty() {
        "(no configuration was extracted; derive a minimal reproduction from the description)"
    } else {
        item.extracted_config.as_str()
    };

    format!(
        "Test the configuration for issue #{id}: {title}\n\
         \n\
         Workspace directory: {workspace} (use item_id \"{id}\" with the local tools).\n\
         Save configuration files with the .{durable} extension so they are kept for review.\n\
         Use the latest provider version available.\n\
         \n\
         Issue description:\n{description}\n\
         \n\
         Configuration:\n{config}\n",
        id = item.id,
        title = item.title,
        durable = layout.durable_extension,
        description = item.description,
    )
}

/// Ask the report worker for the item's single report.
///
/// Test failures and cleanup warnings are part of the task so they surface in the report.
pub fn report_task(
    item: &WorkItem,
    test: &Result<String, WorkerError>,
    cleanup: &CleanupReport,
) -> String {
    let results = match test {
        Ok(output) => format!("Test results:\n{}", output),
        Err(e) => format!("The test step FAILED: {}", e),
    };

    let mut task = format!(
        "Write the triage report for issue #{id}: {title} (item_id \"{id}\").\n\
         \n\
         Issue description:\n{description}\n\
         \n\
         {results}\n",
        id = item.id,
        title = item.title,
        description = item.description,
    );

    if !cleanup.warnings.is_empty() {
        task.push_str("\nWorkspace cleanup warnings:\n");
        for warning in &cleanup.warnings {
            task.push_str(&format!("- {}\n", warning));
        }
    }

    task.push_str("\nWrite exactly one report for this item.\n");
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use crate::workspace::CleanupWarning;
    use chrono::TimeZone;
    use std::path::PathBuf;

    #[test]
    fn test_fetch_task_cutoff() {
        let now = Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();
        let task = fetch_task(&TrackerConfig::default(), now);

        assert!(task.contains("Repository: hashicorp/terraform-provider-awscc"));
        assert!(task.contains("Maximum issues: 1"));
        assert!(task.contains("Created on or after: 2025-03-01 (10 days)"));
        assert!(task.contains("Include labels: needs-triage"));
        assert!(task.contains("Exclude labels: resource-suppression"));
    }

    #[test]
    fn test_fetch_task_age_beyond_calendar() {
        let now = Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();
        let tracker = TrackerConfig {
            max_age_days: u32::MAX,
            ..Default::default()
        };
        let task = fetch_task(&tracker, now);
        assert!(task.contains(&format!("Created on or after: any date ({} days)", u32::MAX)));
    }

    #[test]
    fn test_test_task_names_workspace() {
        let layout = WorkspaceLayout::with_root("/runs");
        let task = test_task(&fixtures::work_item("42"), &layout);
        assert!(task.contains("/runs/item_42"));
        assert!(task.contains("item_id \"42\""));
        assert!(task.contains("awscc_s3_bucket"));
        assert!(task.contains(".cfg extension"));
    }

    #[test]
    fn test_report_task_carries_failure_and_warnings() {
        let item = fixtures::work_item("7");
        let cleanup = CleanupReport {
            item_id: "7".to_string(),
            warnings: vec![CleanupWarning {
                path: PathBuf::from("item_7/state.db"),
                message: "permission denied".to_string(),
            }],
            ..Default::default()
        };
        let test = Err(WorkerError::failed("test", "plan exited 1"));

        let task = report_task(&item, &test, &cleanup);
        assert!(task.contains("The test step FAILED: worker 'test' failed: plan exited 1"));
        assert!(task.contains("failed to remove item_7/state.db: permission denied"));
    }

    #[test]
    fn test_report_task_with_results() {
        let item = fixtures::work_item("7");
        let task = report_task(&item, &Ok("plan ok".to_string()), &CleanupReport::default());
        assert!(task.contains("Test results:\nplan ok"));
        assert!(!task.contains("cleanup warnings"));
    }
}
