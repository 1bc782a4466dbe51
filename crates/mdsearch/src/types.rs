//! Result types returned by a search.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::extension_of_name;

/// One matching file.
///
/// Attributes the backend could not read are `None`; a record is never
/// dropped because an optional attribute is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    /// Absolute path.
    pub path: PathBuf,
    /// Base name.
    pub name: String,
    /// Backend kind label, e.g. "PDF document" or "Folder".
    pub kind: Option<String>,
    pub size: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl ResultRecord {
    /// Lowercase extension of the base name, without the dot.
    pub fn extension(&self) -> Option<String> {
        extension_of_name(&self.name)
    }
}

/// Records from one search, in the requested order and capped at the limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub records: Vec<ResultRecord>,
    /// The timeout fired before the backend finished gathering.
    pub partial: bool,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ResultRecord {
        ResultRecord {
            path: PathBuf::from("/tmp").join(name),
            name: name.to_string(),
            kind: None,
            size: Some(12),
            created_at: None,
            modified_at: DateTime::from_timestamp(1_700_000_000, 0),
        }
    }

    #[test]
    fn extension_is_lowercase_without_dot() {
        assert_eq!(record("Report.PDF").extension().as_deref(), Some("pdf"));
        assert_eq!(record("Makefile").extension(), None);
    }

    #[test]
    fn serializes_camel_case_with_rfc3339_times() {
        let value = serde_json::to_value(record("a.txt")).unwrap();
        assert_eq!(value["path"], "/tmp/a.txt");
        assert_eq!(value["modifiedAt"], "2023-11-14T22:13:20Z");
        assert!(value["createdAt"].is_null());
        assert!(value.get("created_at").is_none());
    }
}
