//! Persisted form of the workflow progress of one project.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::chapter::ChapterProgress;

pub const DEFAULT_TOTAL_CHAPTERS: u32 = 10;

/// Project-level progress flags as stored alongside a project.
///
/// Every field is optional on input; missing flags read as `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    #[serde(default)]
    pub has_architecture: bool,
    #[serde(default)]
    pub has_blueprint: bool,
    #[serde(default)]
    pub has_draft: bool,
    #[serde(default)]
    pub has_finalize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chapters: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_chapter: Option<u32>,
    #[serde(default)]
    pub chapter_statuses: BTreeMap<u32, ChapterProgress>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::ChapterStatus;

    #[test]
    fn test_parse_partial_snapshot() {
        let snapshot: ProjectSnapshot = serde_json::from_str(
            r#"{"hasBlueprint":true,"totalChapters":12,"chapterStatuses":{"1":{"status":"finalized"}}}"#,
        )
        .unwrap();
        assert!(snapshot.has_blueprint);
        assert!(!snapshot.has_architecture);
        assert_eq!(snapshot.total_chapters, Some(12));
        assert_eq!(snapshot.current_chapter, None);
        assert_eq!(snapshot.chapter_statuses[&1].status, ChapterStatus::Finalized);
    }
}
