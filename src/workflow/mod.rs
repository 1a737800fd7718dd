//! Step-gated authoring workflow.
//!
//! [`Workflow`] is a plain value: step completion (architecture, blueprint,
//! draft), per-chapter status and the derived [`ButtonStates`]. The
//! [`WorkflowDriver`] connects it to the task tracker, and [`WorkflowStore`]
//! keeps a [`ProjectSnapshot`] of it on disk.

mod buttons;
mod chapter;
mod driver;
mod snapshot;
mod state;
mod steps;
mod store;

pub use buttons::{
    compute_button_states, ButtonInputs, ButtonStates, BLUEPRINT_DISABLED_REASON,
    DRAFT_NEEDS_BLUEPRINT_REASON, FINALIZE_DISABLED_REASON,
};
pub use chapter::{ChapterProgress, ChapterStatus, ChapterStatusLabel, LabelVariant};
pub use driver::{DriverError, PendingJob, SharedWorkflow, WorkflowDriver};
pub use snapshot::{ProjectSnapshot, DEFAULT_TOTAL_CHAPTERS};
pub use state::Workflow;
pub use steps::{dependency_closure, StepConfig, WorkflowStep, WORKFLOW_STEPS};
pub use store::{StoreError, WorkflowStore, WORKFLOW_FILE};
