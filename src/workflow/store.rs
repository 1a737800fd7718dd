//! On-disk workflow progress of one project.
//!
//! Progress lives at `{project_dir}/.workbench/workflow.json` as a camelCase
//! [`ProjectSnapshot`]. The driver rewrites it after every completion that
//! advanced the workflow, and the CLI resumes from it.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::snapshot::ProjectSnapshot;
use super::state::Workflow;

/// Location of the progress file, relative to the project directory.
pub const WORKFLOW_FILE: &str = ".workbench/workflow.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed workflow file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads and writes the progress file of one project.
///
/// Writes go through a sibling temp file and a rename, so a reader never sees
/// a half-written snapshot.
#[derive(Debug, Clone)]
pub struct WorkflowStore {
    path: PathBuf,
}

impl WorkflowStore {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            path: project_dir.as_ref().join(WORKFLOW_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Stored snapshot, `None` when the project has no progress yet.
    pub fn read(&self) -> Result<Option<ProjectSnapshot>, StoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StoreError::Malformed {
                path: self.path.clone(),
                source,
            })
    }

    /// Workflow to resume from.
    ///
    /// Unreadable progress is logged and replaced by a fresh workflow; the
    /// file itself is left alone until the next save.
    pub fn open_workflow(&self) -> Workflow {
        match self.read() {
            Ok(Some(snapshot)) => {
                tracing::debug!(path = %self.path.display(), "Resuming stored workflow");
                Workflow::from_snapshot(&snapshot)
            }
            Ok(None) => Workflow::new(),
            Err(e) => {
                tracing::warn!("{}, starting a fresh workflow", e);
                Workflow::new()
            }
        }
    }

    pub fn write(&self, snapshot: &ProjectSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let contents = serde_json::to_string_pretty(snapshot).map_err(|source| {
            StoreError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, contents).map_err(|e| self.io_error(e))?;
        std::fs::rename(&staging, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(
            path = %self.path.display(),
            current_chapter = ?snapshot.current_chapter,
            "Saved workflow"
        );
        Ok(())
    }

    pub fn save(&self, workflow: &Workflow) -> Result<(), StoreError> {
        self.write(&workflow.snapshot())
    }

    /// Forget the stored progress. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Cleared stored workflow");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ChapterStatus, WorkflowStep};

    #[test]
    fn test_missing_file_means_fresh_project() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());

        assert!(store.read().unwrap().is_none());
        assert_eq!(store.open_workflow(), Workflow::new());
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn test_resume_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut workflow = Workflow::new();
        workflow.set_total_chapters(4);
        workflow.complete_step(WorkflowStep::Architecture);
        workflow.complete_step(WorkflowStep::Blueprint);
        workflow.complete_step(WorkflowStep::Draft);
        workflow.finalize_chapter();
        workflow.increment_chapter();

        WorkflowStore::new(dir.path()).save(&workflow).unwrap();

        let restored = WorkflowStore::new(dir.path()).open_workflow();
        assert_eq!(restored.current_chapter(), 2);
        assert_eq!(restored.total_chapters(), 4);
        assert_eq!(restored.chapter_status(1), ChapterStatus::Finalized);
        assert_eq!(restored.button_states(), workflow.button_states());
        assert!(!dir.path().join(".workbench/workflow.json.tmp").exists());
    }

    #[test]
    fn test_malformed_file_is_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.read(), Err(StoreError::Malformed { .. })));
        assert_eq!(store.open_workflow(), Workflow::new());
    }

    #[test]
    fn test_reads_files_written_by_other_clients() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"hasBlueprint":true,"totalChapters":3,"chapterStatuses":{"1":{"status":"draft-pending"}}}"#,
        )
        .unwrap();

        let workflow = store.open_workflow();
        assert!(workflow.has_architecture());
        assert_eq!(workflow.total_chapters(), 3);
        assert!(!workflow.button_states().finalize_disabled);

        assert!(store.clear().unwrap());
        assert!(store.read().unwrap().is_none());
    }
}
