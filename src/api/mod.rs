//! Client side of the generation backend.
//!
//! The tracker only depends on the [`TaskService`] trait: a status query, a
//! fire-and-forget cancel and an optional per-task log stream. [`ApiClient`]
//! implements it over HTTP + SSE, and [`JobService`] for the job submission
//! endpoints.

mod client;
mod error;

pub use client::{ApiClient, GenerationKind};
pub use error::ApiError;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::task::TaskStatus;

/// Raw `data` payloads of a task's log events, in arrival order.
///
/// The stream ends when the server closes it; an `Err` item means the
/// transport broke and no further items follow.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>;

/// Response of a job submission endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskResponse {
    pub task_id: String,
}

/// Response of the task status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusResponse {
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output_files: Option<Vec<String>>,
}

/// Remote task service consumed by the tracker.
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Query the current status of a task.
    async fn task_status(&self, task_id: &str) -> Result<TaskStatusResponse, ApiError>;

    /// Ask the service to cancel a task.
    async fn cancel_task(&self, task_id: &str) -> Result<(), ApiError>;

    /// Open the log stream of a task.
    ///
    /// Returns `None` when the service has no streaming capability; polling
    /// then stays the only progress channel.
    fn log_stream(&self, task_id: &str) -> Option<LogStream>;
}

/// Job submission side of the backend.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Submit a generation job and return the id the service assigned.
    async fn submit_job(
        &self,
        kind: GenerationKind,
        project_id: &str,
        payload: &serde_json::Value,
    ) -> Result<TaskResponse, ApiError>;
}
