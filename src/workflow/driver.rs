//! Glue between generation jobs and workflow progress.
//!
//! The driver refuses actions the current button state disables, submits the
//! rest, hands the returned task id to the tracker and advances the workflow
//! when a job it submitted succeeds. With a [`WorkflowStore`] attached, every
//! advance is written to disk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use thiserror::Error;

use super::chapter::ChapterStatus;
use super::snapshot::ProjectSnapshot;
use super::state::Workflow;
use super::steps::WorkflowStep;
use super::store::WorkflowStore;
use crate::api::{ApiError, GenerationKind, JobService};
use crate::task::{Subscription, Task, TaskStatus, TaskTracker};

/// Workflow shared between the driver, its completion callback and readers.
pub type SharedWorkflow = Arc<RwLock<Workflow>>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("action disabled: {reason}")]
    Disabled { reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A submitted job the driver is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingJob {
    pub kind: GenerationKind,
    /// Current chapter at submission time.
    pub chapter: u32,
}

type PendingJobs = Arc<Mutex<HashMap<String, PendingJob>>>;

pub struct WorkflowDriver {
    jobs: Arc<dyn JobService>,
    tracker: TaskTracker,
    workflow: SharedWorkflow,
    pending: PendingJobs,
    subscription: Option<Subscription>,
}

fn lock_pending(
    pending: &Mutex<HashMap<String, PendingJob>>,
) -> MutexGuard<'_, HashMap<String, PendingJob>> {
    pending
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_workflow(workflow: &RwLock<Workflow>) -> std::sync::RwLockWriteGuard<'_, Workflow> {
    workflow
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_workflow(workflow: &RwLock<Workflow>) -> std::sync::RwLockReadGuard<'_, Workflow> {
    workflow
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WorkflowDriver {
    /// Create a driver and subscribe it to `tracker`'s completions.
    pub fn new(jobs: Arc<dyn JobService>, tracker: TaskTracker, workflow: SharedWorkflow) -> Self {
        Self::build(jobs, tracker, workflow, None)
    }

    /// Like [`WorkflowDriver::new`], persisting progress to `store`.
    pub fn with_store(
        jobs: Arc<dyn JobService>,
        tracker: TaskTracker,
        workflow: SharedWorkflow,
        store: WorkflowStore,
    ) -> Self {
        Self::build(jobs, tracker, workflow, Some(store))
    }

    fn build(
        jobs: Arc<dyn JobService>,
        tracker: TaskTracker,
        workflow: SharedWorkflow,
        store: Option<WorkflowStore>,
    ) -> Self {
        let pending: PendingJobs = Arc::default();

        let subscription = {
            let pending = pending.clone();
            let workflow = workflow.clone();
            tracker.on_task_complete(move |task| {
                let Some(job) = lock_pending(&pending).remove(&task.id) else {
                    return;
                };
                let Some(snapshot) = apply_completion(&workflow, task, job) else {
                    return;
                };
                if let Some(store) = &store {
                    if let Err(e) = store.write(&snapshot) {
                        tracing::warn!(task_id = %task.id, "Failed to persist workflow: {}", e);
                    }
                }
            })
        };

        Self {
            jobs,
            tracker,
            workflow,
            pending,
            subscription: Some(subscription),
        }
    }

    pub fn workflow(&self) -> SharedWorkflow {
        self.workflow.clone()
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Jobs submitted through this driver that have not completed yet.
    pub fn pending_jobs(&self) -> HashMap<String, PendingJob> {
        lock_pending(&self.pending).clone()
    }

    /// Submit a job if the workflow currently permits it.
    ///
    /// Returns the task id, already registered with the tracker.
    pub async fn submit(
        &self,
        kind: GenerationKind,
        project_id: &str,
        payload: &serde_json::Value,
    ) -> Result<String, DriverError> {
        let chapter = {
            let workflow = read_workflow(&self.workflow);
            if let Some(reason) = disabled_reason(&workflow, kind) {
                tracing::debug!(kind = ?kind, reason = %reason, "Rejected disabled action");
                return Err(DriverError::Disabled { reason });
            }
            workflow.current_chapter()
        };

        let response = self.jobs.submit_job(kind, project_id, payload).await?;
        let task_id = response.task_id;

        lock_pending(&self.pending).insert(task_id.clone(), PendingJob { kind, chapter });
        self.tracker.register_task(task_id.clone(), kind.label()).await;
        Ok(task_id)
    }

    /// Stop reacting to completions. Jobs still running keep their tracker
    /// records but no longer advance the workflow.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        lock_pending(&self.pending).clear();
    }
}

impl Drop for WorkflowDriver {
    fn drop(&mut self) {
        self.detach();
    }
}

fn disabled_reason(workflow: &Workflow, kind: GenerationKind) -> Option<String> {
    let states = workflow.button_states();
    match kind {
        GenerationKind::Architecture => states
            .architecture_disabled
            .then(|| "architecture generation is disabled".to_string()),
        GenerationKind::Blueprint => states
            .blueprint_disabled
            .then_some(states.blueprint_disabled_reason)
            .flatten(),
        GenerationKind::Draft => states
            .draft_disabled
            .then_some(states.draft_disabled_reason)
            .flatten(),
        GenerationKind::Finalize => states
            .finalize_disabled
            .then_some(states.finalize_disabled_reason)
            .flatten(),
        _ => None,
    }
}

/// Fold a finished job into the workflow. Returns the new progress when the
/// workflow advanced.
fn apply_completion(
    workflow: &RwLock<Workflow>,
    task: &Task,
    job: PendingJob,
) -> Option<ProjectSnapshot> {
    if task.status != TaskStatus::Success {
        tracing::info!(
            task_id = %task.id,
            kind = ?job.kind,
            error = task.error.as_deref().unwrap_or_default(),
            "Job did not succeed, workflow unchanged"
        );
        return None;
    }

    let mut workflow = write_workflow(workflow);
    let advanced = match job.kind {
        GenerationKind::Architecture => workflow.complete_step(WorkflowStep::Architecture),
        GenerationKind::Blueprint => workflow.complete_step(WorkflowStep::Blueprint),
        GenerationKind::Draft => workflow.complete_step(WorkflowStep::Draft),
        GenerationKind::Finalize => {
            workflow.set_chapter_status(job.chapter, ChapterStatus::Finalized)
        }
        _ => return None,
    };
    if !advanced {
        // The workflow moved on (e.g. a reset) while the job was running.
        tracing::warn!(
            task_id = %task.id,
            kind = ?job.kind,
            chapter = job.chapter,
            "Job succeeded but the workflow no longer accepts its result"
        );
        return None;
    }

    tracing::info!(
        task_id = %task.id,
        kind = ?job.kind,
        chapter = job.chapter,
        step = %workflow.current_step(),
        "Workflow advanced"
    );
    Some(workflow.snapshot())
}
