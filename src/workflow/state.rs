//! Workflow progression state machine.
//!
//! Transitions are plain `&mut self` methods. Invalid transitions return
//! `false` and leave the state unchanged: completing a step before its
//! prerequisite, advancing past the last chapter, finalizing a chapter without
//! a draft, or touching a chapter outside `1..=total_chapters`.

use std::collections::{BTreeMap, BTreeSet};

use super::buttons::{compute_button_states, ButtonInputs, ButtonStates};
use super::chapter::{ChapterProgress, ChapterStatus, ChapterStatusLabel};
use super::snapshot::{ProjectSnapshot, DEFAULT_TOTAL_CHAPTERS};
use super::steps::{dependency_closure, WorkflowStep, WORKFLOW_STEPS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    current_step: WorkflowStep,
    completed_steps: BTreeSet<WorkflowStep>,
    has_architecture: bool,
    has_blueprint: bool,
    current_chapter: u32,
    total_chapters: u32,
    chapter_statuses: BTreeMap<u32, ChapterProgress>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            current_step: WorkflowStep::first(),
            completed_steps: BTreeSet::new(),
            has_architecture: false,
            has_blueprint: false,
            current_chapter: 1,
            total_chapters: DEFAULT_TOTAL_CHAPTERS,
            chapter_statuses: BTreeMap::new(),
        }
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &ProjectSnapshot) -> Self {
        let mut workflow = Self::default();
        workflow.initialize_from_project(snapshot);
        workflow
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn current_step(&self) -> WorkflowStep {
        self.current_step
    }

    pub fn completed_steps(&self) -> &BTreeSet<WorkflowStep> {
        &self.completed_steps
    }

    pub fn has_architecture(&self) -> bool {
        self.has_architecture
    }

    pub fn has_blueprint(&self) -> bool {
        self.has_blueprint
    }

    pub fn current_chapter(&self) -> u32 {
        self.current_chapter
    }

    pub fn total_chapters(&self) -> u32 {
        self.total_chapters
    }

    pub fn chapter_statuses(&self) -> &BTreeMap<u32, ChapterProgress> {
        &self.chapter_statuses
    }

    /// Status of a chapter; chapters without an entry are not started.
    pub fn chapter_status(&self, chapter: u32) -> ChapterStatus {
        self.chapter_statuses
            .get(&chapter)
            .map(|p| p.status)
            .unwrap_or_default()
    }

    pub fn chapter_status_label(&self) -> ChapterStatusLabel {
        self.chapter_status(self.current_chapter).label()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Step queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn is_step_completed(&self, step: WorkflowStep) -> bool {
        self.completed_steps.contains(&step)
    }

    pub fn is_prerequisite_met(&self, step: WorkflowStep) -> bool {
        match step.prerequisite() {
            Some(prereq) => self.is_step_completed(prereq),
            None => true,
        }
    }

    pub fn is_step_available(&self, step: WorkflowStep) -> bool {
        self.is_prerequisite_met(step)
    }

    /// First step in declared order that is not completed and whose
    /// prerequisite holds.
    pub fn next_step(&self) -> Option<WorkflowStep> {
        WORKFLOW_STEPS
            .iter()
            .map(|c| c.key)
            .find(|step| !self.is_step_completed(*step) && self.is_prerequisite_met(*step))
    }

    /// Explanation for a step whose prerequisite is unmet.
    pub fn disabled_tooltip(&self, step: WorkflowStep) -> Option<String> {
        let prereq = step.prerequisite()?;
        if self.is_prerequisite_met(step) {
            None
        } else {
            Some(format!("complete {} first", prereq.label()))
        }
    }

    pub fn button_states(&self) -> ButtonStates {
        compute_button_states(&ButtonInputs {
            has_architecture: self.has_architecture,
            has_blueprint: self.has_blueprint,
            current_chapter: self.current_chapter,
            chapter_statuses: &self.chapter_statuses,
            total_chapters: self.total_chapters,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Step transitions
    // ─────────────────────────────────────────────────────────────────────

    fn set_flag(&mut self, step: WorkflowStep, value: bool) {
        match step {
            WorkflowStep::Architecture => self.has_architecture = value,
            WorkflowStep::Blueprint => self.has_blueprint = value,
            WorkflowStep::Draft => {}
        }
    }

    fn advance_current_step(&mut self) {
        self.current_step = self.next_step().unwrap_or_else(WorkflowStep::last);
    }

    /// Mark a step completed and move `current_step` to the next open step.
    ///
    /// Completing `draft` puts the current chapter into `draft-pending`.
    /// Returns `false` without changes when the prerequisite is not completed.
    pub fn complete_step(&mut self, step: WorkflowStep) -> bool {
        if !self.is_prerequisite_met(step) {
            return false;
        }
        self.completed_steps.insert(step);
        self.set_flag(step, true);

        if step == WorkflowStep::Draft {
            let entry = self.chapter_statuses.entry(self.current_chapter).or_default();
            let regenerated = entry.status == ChapterStatus::Finalized;
            entry.status = ChapterStatus::DraftPending;
            entry.modified_since_finalize |= regenerated;
        }

        self.advance_current_step();
        true
    }

    /// Un-complete a step and every step depending on it.
    ///
    /// Draft progress is chapter-scoped, so whenever `draft` is reset all
    /// chapter statuses go with it.
    pub fn reset_step(&mut self, step: WorkflowStep) {
        let closure = dependency_closure(step);
        for reset in &closure {
            self.completed_steps.remove(reset);
            self.set_flag(*reset, false);
        }
        if closure.contains(&WorkflowStep::Draft) {
            self.chapter_statuses.clear();
        }
        self.advance_current_step();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chapters
    // ─────────────────────────────────────────────────────────────────────

    fn in_range(&self, chapter: u32) -> bool {
        (1..=self.total_chapters).contains(&chapter)
    }

    /// Set the status of a chapter.
    ///
    /// Rejects chapters out of range and finalizing a chapter that has no
    /// pending draft.
    pub fn set_chapter_status(&mut self, chapter: u32, status: ChapterStatus) -> bool {
        if !self.in_range(chapter) {
            return false;
        }
        let current = self.chapter_status(chapter);
        match status {
            ChapterStatus::NotStarted => {
                self.chapter_statuses.remove(&chapter);
            }
            ChapterStatus::DraftPending => {
                self.chapter_statuses.entry(chapter).or_default().status =
                    ChapterStatus::DraftPending;
            }
            ChapterStatus::Finalized => match current {
                ChapterStatus::Finalized => {}
                ChapterStatus::DraftPending => {
                    self.chapter_statuses
                        .insert(chapter, ChapterProgress::new(ChapterStatus::Finalized));
                }
                ChapterStatus::NotStarted => return false,
            },
        }
        true
    }

    /// Finalize the current chapter.
    pub fn finalize_chapter(&mut self) -> bool {
        self.set_chapter_status(self.current_chapter, ChapterStatus::Finalized)
    }

    /// Editing a finalized chapter drops it back to `draft-pending`, keeping
    /// the draft. Returns whether the chapter was demoted.
    pub fn mark_chapter_modified(&mut self, chapter: u32) -> bool {
        match self.chapter_statuses.get_mut(&chapter) {
            Some(progress) if progress.status == ChapterStatus::Finalized => {
                progress.status = ChapterStatus::DraftPending;
                progress.modified_since_finalize = true;
                true
            }
            _ => false,
        }
    }

    pub fn set_current_chapter(&mut self, chapter: u32) {
        self.current_chapter = chapter.clamp(1, self.total_chapters);
    }

    pub fn set_total_chapters(&mut self, total: u32) {
        self.total_chapters = total.max(1);
        if self.current_chapter > self.total_chapters {
            self.current_chapter = self.total_chapters;
        }
    }

    /// Move on to the next chapter.
    ///
    /// Drafting restarts for the new chapter; architecture and blueprint stay
    /// completed. Returns `false` at the last chapter.
    pub fn increment_chapter(&mut self) -> bool {
        if self.current_chapter >= self.total_chapters {
            return false;
        }
        self.current_chapter += 1;
        self.completed_steps.remove(&WorkflowStep::Draft);
        self.current_step = WorkflowStep::Draft;
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Snapshot and reset
    // ─────────────────────────────────────────────────────────────────────

    /// Rebuild progress from a stored project snapshot.
    ///
    /// Later steps imply earlier ones: a blueprint, draft or finalized chapter
    /// implies the blueprint exists, and a blueprint implies the architecture.
    pub fn initialize_from_project(&mut self, snapshot: &ProjectSnapshot) {
        self.has_blueprint = snapshot.has_blueprint || snapshot.has_draft || snapshot.has_finalize;
        self.has_architecture = snapshot.has_architecture || self.has_blueprint;
        self.total_chapters = snapshot
            .total_chapters
            .unwrap_or(DEFAULT_TOTAL_CHAPTERS)
            .max(1);
        self.current_chapter = snapshot
            .current_chapter
            .unwrap_or(1)
            .clamp(1, self.total_chapters);
        self.chapter_statuses = snapshot
            .chapter_statuses
            .iter()
            .filter(|(chapter, _)| **chapter >= 1)
            .map(|(chapter, progress)| (*chapter, *progress))
            .collect();

        self.completed_steps.clear();
        if self.has_architecture {
            self.completed_steps.insert(WorkflowStep::Architecture);
        }
        if self.has_blueprint {
            self.completed_steps.insert(WorkflowStep::Blueprint);
        }
        if snapshot.has_draft {
            self.completed_steps.insert(WorkflowStep::Draft);
        }

        self.advance_current_step();
    }

    /// Export progress in the stored snapshot shape.
    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            has_architecture: self.has_architecture,
            has_blueprint: self.has_blueprint,
            has_draft: self.has_blueprint && self.is_step_completed(WorkflowStep::Draft),
            has_finalize: self.has_blueprint
                && self.chapter_status(self.current_chapter) == ChapterStatus::Finalized,
            total_chapters: Some(self.total_chapters),
            current_chapter: Some(self.current_chapter),
            chapter_statuses: self.chapter_statuses.clone(),
        }
    }

    /// Back to a fresh project. `total_chapters` is kept.
    pub fn reset(&mut self) {
        self.current_step = WorkflowStep::first();
        self.completed_steps.clear();
        self.has_architecture = false;
        self.has_blueprint = false;
        self.current_chapter = 1;
        self.chapter_statuses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::LabelVariant;

    #[test]
    fn test_initial_state() {
        let workflow = Workflow::new();
        assert_eq!(workflow.current_step(), WorkflowStep::Architecture);
        assert!(workflow.completed_steps().is_empty());
        assert!(!workflow.has_architecture());
        assert!(!workflow.has_blueprint());
        assert_eq!(workflow.current_chapter(), 1);
        assert_eq!(workflow.total_chapters(), DEFAULT_TOTAL_CHAPTERS);
        assert!(workflow.chapter_statuses().is_empty());
    }

    #[test]
    fn test_complete_steps_in_order() {
        let steps = [
            WorkflowStep::Architecture,
            WorkflowStep::Blueprint,
            WorkflowStep::Draft,
        ];
        for count in 1..=steps.len() {
            let mut workflow = Workflow::new();
            for step in &steps[..count] {
                workflow.complete_step(*step);
            }
            let expected = steps.get(count).copied().unwrap_or(WorkflowStep::Draft);
            assert_eq!(workflow.current_step(), expected);
        }
    }

    #[test]
    fn test_complete_step_requires_prerequisite() {
        let mut workflow = Workflow::new();
        assert!(!workflow.complete_step(WorkflowStep::Blueprint));
        assert!(!workflow.complete_step(WorkflowStep::Draft));
        assert_eq!(workflow, Workflow::new());

        assert!(workflow.complete_step(WorkflowStep::Architecture));
        assert!(workflow.complete_step(WorkflowStep::Blueprint));
        assert!(workflow.has_blueprint());
    }

    #[test]
    fn test_snapshot_round_trip_after_rejected_step() {
        let mut workflow = Workflow::new();
        workflow.complete_step(WorkflowStep::Blueprint);

        let restored = Workflow::from_snapshot(&workflow.snapshot());
        assert_eq!(restored.button_states(), workflow.button_states());
        assert!(restored.button_states().blueprint_disabled);
        assert_eq!(restored, workflow);
    }

    #[test]
    fn test_complete_step_is_idempotent() {
        let mut workflow = Workflow::new();
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.complete_step(WorkflowStep::Architecture);
        assert_eq!(workflow.completed_steps().len(), 1);
        assert!(workflow.has_architecture());
        assert_eq!(workflow.current_step(), WorkflowStep::Blueprint);
    }

    #[test]
    fn test_prerequisites() {
        let mut workflow = Workflow::new();
        assert!(workflow.is_prerequisite_met(WorkflowStep::Architecture));
        assert!(!workflow.is_prerequisite_met(WorkflowStep::Blueprint));
        assert_eq!(
            workflow.disabled_tooltip(WorkflowStep::Blueprint).as_deref(),
            Some("complete Architecture first")
        );

        workflow.complete_step(WorkflowStep::Architecture);
        assert!(workflow.is_prerequisite_met(WorkflowStep::Blueprint));
        assert!(workflow.is_step_available(WorkflowStep::Blueprint));
        assert!(workflow.disabled_tooltip(WorkflowStep::Blueprint).is_none());
        assert!(workflow.disabled_tooltip(WorkflowStep::Architecture).is_none());
    }

    #[test]
    fn test_complete_draft_marks_chapter_pending() {
        let mut workflow = Workflow::new();
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.complete_step(WorkflowStep::Blueprint);
        assert!(workflow.button_states().finalize_disabled);

        workflow.complete_step(WorkflowStep::Draft);
        assert_eq!(workflow.chapter_status(1), ChapterStatus::DraftPending);
        assert!(!workflow.button_states().finalize_disabled);
    }

    #[test]
    fn test_reset_architecture_cascades() {
        let mut workflow = Workflow::new();
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.complete_step(WorkflowStep::Blueprint);
        workflow.complete_step(WorkflowStep::Draft);

        workflow.reset_step(WorkflowStep::Architecture);
        assert!(workflow.completed_steps().is_empty());
        assert!(!workflow.has_architecture());
        assert!(!workflow.has_blueprint());
        assert!(workflow.chapter_statuses().is_empty());
        assert_eq!(workflow.current_step(), WorkflowStep::Architecture);
    }

    #[test]
    fn test_reset_blueprint_keeps_architecture() {
        let mut workflow = Workflow::new();
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.complete_step(WorkflowStep::Blueprint);
        workflow.complete_step(WorkflowStep::Draft);
        workflow.finalize_chapter();

        workflow.reset_step(WorkflowStep::Blueprint);
        assert!(workflow.has_architecture());
        assert!(!workflow.has_blueprint());
        assert!(!workflow.is_step_completed(WorkflowStep::Draft));
        assert!(workflow.chapter_statuses().is_empty());
        assert_eq!(workflow.current_step(), WorkflowStep::Blueprint);
    }

    #[test]
    fn test_set_chapter_status() {
        let mut workflow = Workflow::new();
        assert!(workflow.set_chapter_status(1, ChapterStatus::DraftPending));
        assert_eq!(workflow.chapter_status(1), ChapterStatus::DraftPending);

        assert!(!workflow.set_chapter_status(0, ChapterStatus::DraftPending));
        assert!(!workflow.set_chapter_status(11, ChapterStatus::DraftPending));
        assert!(!workflow.set_chapter_status(2, ChapterStatus::Finalized));
        assert!(!workflow.chapter_statuses().contains_key(&2));
    }

    #[test]
    fn test_finalize_requires_draft() {
        let mut workflow = Workflow::new();
        assert!(!workflow.finalize_chapter());
        assert_eq!(workflow.chapter_status(1), ChapterStatus::NotStarted);

        workflow.set_chapter_status(1, ChapterStatus::DraftPending);
        assert!(workflow.finalize_chapter());
        assert_eq!(workflow.chapter_status(1), ChapterStatus::Finalized);
        assert!(workflow.finalize_chapter());
    }

    #[test]
    fn test_mark_chapter_modified() {
        let mut workflow = Workflow::new();
        workflow.set_chapter_status(1, ChapterStatus::DraftPending);
        assert!(!workflow.mark_chapter_modified(1));

        workflow.finalize_chapter();
        assert!(workflow.mark_chapter_modified(1));
        let progress = workflow.chapter_statuses()[&1];
        assert_eq!(progress.status, ChapterStatus::DraftPending);
        assert!(progress.modified_since_finalize);

        workflow.finalize_chapter();
        assert!(!workflow.chapter_statuses()[&1].modified_since_finalize);
    }

    #[test]
    fn test_redrafting_finalized_chapter_flags_modification() {
        let mut workflow = Workflow::new();
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.complete_step(WorkflowStep::Blueprint);
        workflow.complete_step(WorkflowStep::Draft);
        workflow.finalize_chapter();

        workflow.complete_step(WorkflowStep::Draft);
        let progress = workflow.chapter_statuses()[&1];
        assert_eq!(progress.status, ChapterStatus::DraftPending);
        assert!(progress.modified_since_finalize);
    }

    #[test]
    fn test_increment_chapter() {
        let mut workflow = Workflow::new();
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.complete_step(WorkflowStep::Blueprint);
        workflow.complete_step(WorkflowStep::Draft);

        assert!(workflow.increment_chapter());
        assert_eq!(workflow.current_chapter(), 2);
        assert_eq!(workflow.current_step(), WorkflowStep::Draft);
        assert!(!workflow.is_step_completed(WorkflowStep::Draft));
        assert!(workflow.is_step_completed(WorkflowStep::Blueprint));
        assert!(workflow.is_step_completed(WorkflowStep::Architecture));
    }

    #[test]
    fn test_increment_chapter_stops_at_total() {
        for total in 1..=12u32 {
            for current in 1..=12u32 {
                let mut workflow = Workflow::new();
                workflow.set_total_chapters(total);
                workflow.set_current_chapter(current);
                let before = workflow.current_chapter();
                let advanced = workflow.increment_chapter();
                if before < total {
                    assert!(advanced);
                    assert_eq!(workflow.current_chapter(), before + 1);
                } else {
                    assert!(!advanced);
                    assert_eq!(workflow.current_chapter(), before);
                }
            }
        }

        let mut workflow = Workflow::new();
        workflow.set_total_chapters(3);
        workflow.set_current_chapter(3);
        assert!(!workflow.increment_chapter());
        assert_eq!(workflow.current_chapter(), 3);
    }

    #[test]
    fn test_chapter_clamping() {
        let mut workflow = Workflow::new();
        workflow.set_current_chapter(0);
        assert_eq!(workflow.current_chapter(), 1);
        workflow.set_current_chapter(99);
        assert_eq!(workflow.current_chapter(), 10);

        workflow.set_total_chapters(4);
        assert_eq!(workflow.current_chapter(), 4);
        workflow.set_total_chapters(0);
        assert_eq!(workflow.total_chapters(), 1);
    }

    #[test]
    fn test_second_chapter_gated_on_first() {
        let mut workflow = Workflow::new();
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.complete_step(WorkflowStep::Blueprint);
        workflow.complete_step(WorkflowStep::Draft);
        workflow.increment_chapter();

        let states = workflow.button_states();
        assert!(states.draft_disabled);
        assert_eq!(
            states.draft_disabled_reason.as_deref(),
            Some("finalize chapter 1 first")
        );

        workflow.set_current_chapter(1);
        workflow.finalize_chapter();
        workflow.set_current_chapter(2);
        let states = workflow.button_states();
        assert!(!states.draft_disabled);
        assert!(states.draft_disabled_reason.is_none());
    }

    #[test]
    fn test_chapter_status_label() {
        let mut workflow = Workflow::new();
        assert_eq!(workflow.chapter_status_label().variant, LabelVariant::Muted);

        workflow.set_chapter_status(1, ChapterStatus::DraftPending);
        assert_eq!(workflow.chapter_status_label().label, "● Draft pending");
        assert_eq!(workflow.chapter_status_label().variant, LabelVariant::Warning);

        workflow.finalize_chapter();
        assert_eq!(workflow.chapter_status_label().variant, LabelVariant::Success);
    }

    #[test]
    fn test_initialize_from_project_implies_earlier_steps() {
        let snapshot = ProjectSnapshot {
            has_draft: true,
            total_chapters: Some(5),
            current_chapter: Some(9),
            ..Default::default()
        };
        let workflow = Workflow::from_snapshot(&snapshot);

        assert!(workflow.has_architecture());
        assert!(workflow.has_blueprint());
        assert!(workflow.is_step_completed(WorkflowStep::Draft));
        assert_eq!(workflow.current_step(), WorkflowStep::Draft);
        assert_eq!(workflow.total_chapters(), 5);
        assert_eq!(workflow.current_chapter(), 5);
    }

    #[test]
    fn test_initialize_from_empty_project() {
        let mut workflow = Workflow::new();
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.initialize_from_project(&ProjectSnapshot::default());

        assert!(workflow.completed_steps().is_empty());
        assert_eq!(workflow.current_step(), WorkflowStep::Architecture);
        assert_eq!(workflow.total_chapters(), DEFAULT_TOTAL_CHAPTERS);
        assert_eq!(workflow.current_chapter(), 1);
    }

    #[test]
    fn test_initialize_blueprint_only_points_at_draft() {
        let snapshot = ProjectSnapshot {
            has_blueprint: true,
            ..Default::default()
        };
        let workflow = Workflow::from_snapshot(&snapshot);
        assert_eq!(workflow.current_step(), WorkflowStep::Draft);
        assert!(workflow.is_step_completed(WorkflowStep::Architecture));
    }

    #[test]
    fn test_snapshot_round_trip_preserves_buttons() {
        let mut workflow = Workflow::new();
        workflow.set_total_chapters(6);
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.complete_step(WorkflowStep::Blueprint);
        workflow.complete_step(WorkflowStep::Draft);
        workflow.finalize_chapter();
        workflow.increment_chapter();
        workflow.complete_step(WorkflowStep::Draft);

        let restored = Workflow::from_snapshot(&workflow.snapshot());
        assert_eq!(restored.button_states(), workflow.button_states());
        assert_eq!(restored.current_chapter(), 2);
        assert_eq!(restored.chapter_statuses(), workflow.chapter_statuses());
        assert_eq!(restored.completed_steps(), workflow.completed_steps());
    }

    #[test]
    fn test_reset_keeps_total_chapters() {
        let mut workflow = Workflow::new();
        workflow.set_total_chapters(20);
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.complete_step(WorkflowStep::Blueprint);
        workflow.set_current_chapter(5);
        workflow.set_chapter_status(5, ChapterStatus::DraftPending);

        workflow.reset();
        assert_eq!(workflow, {
            let mut fresh = Workflow::new();
            fresh.set_total_chapters(20);
            fresh
        });
    }
}
