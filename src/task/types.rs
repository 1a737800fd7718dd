//! Task record and status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fallback error text for a failed task whose service reported none.
pub const DEFAULT_FAILURE_MESSAGE: &str = "task failed";

/// Server-side status of a generation task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked generation task.
///
/// Invariants (maintained by the tracker, which is the only writer):
/// - `completed_at` is `Some` iff `status` is terminal
/// - `completed_at >= started_at`
/// - `result` only on success, `error` only on failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub label: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub output_files: Vec<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub(crate) fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            output_files: Vec::new(),
            logs: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall time between registration and completion, if completed.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }

    /// Move into a terminal status, stamping `completed_at` no earlier than `started_at`.
    pub(crate) fn mark_completed(&mut self, status: TaskStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        if status == TaskStatus::Failed && self.error.is_none() {
            self.error = Some(DEFAULT_FAILURE_MESSAGE.to_string());
        }
        self.completed_at = Some(Utc::now().max(self.started_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let status: TaskStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(status, TaskStatus::Running);
        assert_eq!(serde_json::to_string(&TaskStatus::Failed).unwrap(), "\"failed\"");
        assert!(TaskStatus::Success.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn test_mark_completed_sets_timestamp_and_default_error() {
        let mut task = Task::new("t1", "Architecture");
        assert!(task.completed_at.is_none());

        task.mark_completed(TaskStatus::Failed);
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some(DEFAULT_FAILURE_MESSAGE));
        let completed = task.completed_at.unwrap();
        assert!(completed >= task.started_at);
        assert!(task.duration().unwrap() >= chrono::Duration::zero());
    }
}
