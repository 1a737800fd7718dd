//! Enable/disable state of the generation actions.

use std::collections::BTreeMap;

use serde::Serialize;

use super::chapter::{ChapterProgress, ChapterStatus};

pub const BLUEPRINT_DISABLED_REASON: &str = "generate the architecture first";
pub const DRAFT_NEEDS_BLUEPRINT_REASON: &str = "generate the blueprint first";
pub const FINALIZE_DISABLED_REASON: &str = "generate a draft first";

/// Everything the button derivation looks at.
#[derive(Debug, Clone, Copy)]
pub struct ButtonInputs<'a> {
    pub has_architecture: bool,
    pub has_blueprint: bool,
    pub current_chapter: u32,
    pub chapter_statuses: &'a BTreeMap<u32, ChapterProgress>,
    pub total_chapters: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonStates {
    pub architecture_disabled: bool,
    pub blueprint_disabled: bool,
    pub blueprint_disabled_reason: Option<String>,
    pub draft_disabled: bool,
    pub draft_disabled_reason: Option<String>,
    pub finalize_disabled: bool,
    pub finalize_disabled_reason: Option<String>,
}

fn status_of(statuses: &BTreeMap<u32, ChapterProgress>, chapter: u32) -> ChapterStatus {
    statuses
        .get(&chapter)
        .map(|p| p.status)
        .unwrap_or_default()
}

/// Derive which actions are disabled. Depends on nothing but `inputs`.
pub fn compute_button_states(inputs: &ButtonInputs<'_>) -> ButtonStates {
    let blueprint_disabled = !inputs.has_architecture;

    let prev = inputs.current_chapter.saturating_sub(1);
    let needs_prev_finalized =
        prev >= 1 && status_of(inputs.chapter_statuses, prev) != ChapterStatus::Finalized;
    let draft_disabled = !inputs.has_blueprint || needs_prev_finalized;
    let draft_disabled_reason = if needs_prev_finalized {
        Some(format!("finalize chapter {} first", prev))
    } else if !inputs.has_blueprint {
        Some(DRAFT_NEEDS_BLUEPRINT_REASON.to_string())
    } else {
        None
    };

    let finalize_disabled =
        status_of(inputs.chapter_statuses, inputs.current_chapter) == ChapterStatus::NotStarted;

    ButtonStates {
        architecture_disabled: false,
        blueprint_disabled,
        blueprint_disabled_reason: blueprint_disabled
            .then(|| BLUEPRINT_DISABLED_REASON.to_string()),
        draft_disabled,
        draft_disabled_reason,
        finalize_disabled,
        finalize_disabled_reason: finalize_disabled
            .then(|| FINALIZE_DISABLED_REASON.to_string()),
    }
}
