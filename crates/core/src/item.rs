//! Work items produced by the fetch worker.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::workspace::is_safe_component;

/// Errors decoding the fetch worker's item list, or admitting one of its items.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("no JSON array found in fetch output")]
    NoArray,

    #[error("invalid item list: {0}")]
    Decode(String),

    #[error("item id {0:?} is not usable as a workspace name")]
    UnsafeId(String),

    #[error("item id {0:?} appears more than once")]
    DuplicateId(String),
}

/// One externally reported issue selected for triage.
///
/// Identifies exactly one workspace directory and one report artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(alias = "number", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "body")]
    pub description: String,
    /// Candidate configuration extracted from the issue, passed through untouched.
    #[serde(default, alias = "config")]
    pub extracted_config: String,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            extracted_config: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_extracted_config(mut self, config: impl Into<String>) -> Self {
        self.extracted_config = config.into();
        self
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Decode the fetch worker's reply into an ordered item list.
///
/// The reply may wrap the array in a fenced code block or surround it with prose. Order
/// is preserved as returned. Ids are not checked here; see [`ItemIds`].
pub fn parse_work_items(output: &str) -> Result<Vec<WorkItem>, ItemError> {
    let json = extract_array(output).ok_or(ItemError::NoArray)?;
    serde_json::from_str(json).map_err(|e| ItemError::Decode(e.to_string()))
}

/// Ids admitted so far in one run.
///
/// An id names exactly one workspace and one report, so it must be a single safe path
/// component and must not repeat.
#[derive(Debug, Default)]
pub struct ItemIds {
    seen: HashSet<String>,
}

impl ItemIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `item`, or explain why it cannot be processed.
    pub fn admit(&mut self, item: &WorkItem) -> Result<(), ItemError> {
        if !is_safe_component(&item.id) {
            return Err(ItemError::UnsafeId(item.id.clone()));
        }
        if !self.seen.insert(item.id.clone()) {
            return Err(ItemError::DuplicateId(item.id.clone()));
        }
        Ok(())
    }
}

static FENCED_ARRAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\[.*?\])\s*```").unwrap()
});

fn extract_array(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if trimmed.starts_with('[') {
        return Some(trimmed);
    }

    if let Some(body) = FENCED_ARRAY.captures(trimmed).and_then(|c| c.get(1)) {
        return Some(body.as_str());
    }

    let start = trimmed.find('[')?;
    let end = trimmed.rfind(']')?;
    (end > start).then(|| &trimmed[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let items = parse_work_items(
            r#"[{"id": "42", "title": "Crash on apply", "description": "boom", "extracted_config": "resource {}"}]"#,
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "42");
        assert_eq!(items[0].extracted_config, "resource {}");
    }

    #[test]
    fn test_parse_aliases_and_numeric_id() {
        let items = parse_work_items(
            r#"[{"number": 1234, "title": "t", "body": "details", "config": "x = 1"}]"#,
        )
        .unwrap();
        assert_eq!(items[0].id, "1234");
        assert_eq!(items[0].description, "details");
        assert_eq!(items[0].extracted_config, "x = 1");
    }

    #[test]
    fn test_parse_fenced_block_with_prose() {
        let output = "Here are the issues:\n```json\n[{\"id\": \"7\"}, {\"id\": \"8\"}]\n```\nDone.";
        let items = parse_work_items(output).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["7", "8"]);
    }

    #[test]
    fn test_parse_array_in_prose() {
        let items = parse_work_items("Found: [{\"id\": \"3\"}] (one issue)").unwrap();
        assert_eq!(items[0].id, "3");
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_work_items("[]").unwrap().is_empty());
    }

    #[test]
    fn test_preserves_order() {
        let items =
            parse_work_items(r#"[{"id": "9"}, {"id": "2"}, {"id": "5"}]"#).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["9", "2", "5"]);
    }

    #[test]
    fn test_ids_are_not_checked_while_decoding() {
        let items = parse_work_items(r#"[{"id": "1"}, {"id": "a/b"}, {"id": 1}]"#).unwrap();
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_admit_rejects_unsafe_id() {
        let mut ids = ItemIds::new();
        let err = ids.admit(&WorkItem::new("../etc", "t")).unwrap_err();
        assert!(matches!(err, ItemError::UnsafeId(_)));
        assert!(ids.admit(&WorkItem::new("etc", "t")).is_ok());
    }

    #[test]
    fn test_admit_rejects_duplicate_id() {
        let items = parse_work_items(r#"[{"id": "1"}, {"id": 1}]"#).unwrap();
        let mut ids = ItemIds::new();
        assert!(ids.admit(&items[0]).is_ok());
        let err = ids.admit(&items[1]).unwrap_err();
        assert!(matches!(err, ItemError::DuplicateId(id) if id == "1"));
    }

    #[test]
    fn test_fenced_block_without_language() {
        let items = parse_work_items("Result:\n```\n[{\"id\": \"4\"}]\n```").unwrap();
        assert_eq!(items[0].id, "4");
    }

    #[test]
    fn test_no_array() {
        assert!(matches!(
            parse_work_items("I could not reach the tracker."),
            Err(ItemError::NoArray)
        ));
    }

    #[test]
    fn test_malformed_array() {
        assert!(matches!(
            parse_work_items(r#"[{"title": "missing id"}]"#),
            Err(ItemError::Decode(_))
        ));
    }
}
