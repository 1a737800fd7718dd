//! Per-chapter progress markers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ChapterStatus {
    #[default]
    NotStarted,
    DraftPending,
    Finalized,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::DraftPending => "draft-pending",
            Self::Finalized => "finalized",
        }
    }

    /// Display label and variant for the status badge.
    pub fn label(&self) -> ChapterStatusLabel {
        match self {
            Self::NotStarted => ChapterStatusLabel {
                label: "○ Not started",
                variant: LabelVariant::Muted,
            },
            Self::DraftPending => ChapterStatusLabel {
                label: "● Draft pending",
                variant: LabelVariant::Warning,
            },
            Self::Finalized => ChapterStatusLabel {
                label: "✓ Finalized",
                variant: LabelVariant::Success,
            },
        }
    }
}

/// Progress entry of one chapter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgress {
    pub status: ChapterStatus,
    /// Set when a finalized chapter was edited and fell back to draft-pending.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub modified_since_finalize: bool,
}

impl ChapterProgress {
    pub fn new(status: ChapterStatus) -> Self {
        Self {
            status,
            modified_since_finalize: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LabelVariant {
    Muted,
    Warning,
    Success,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ChapterStatusLabel {
    pub label: &'static str,
    pub variant: LabelVariant,
}
