//! # Novel Workbench
//!
//! Client-side coordination for server-executed novel generation jobs.
//!
//! This library provides:
//! - A task tracker that follows each job through status polling and its log
//!   stream, and reports completion exactly once
//! - A workflow state machine gating which generation actions are allowed
//!   (architecture → blueprint → draft, chapters finalized in order)
//! - An HTTP + SSE client for the generation backend
//!
//! ## Task Flow
//! 1. Submit a job, receive a task id
//! 2. Register the id with the [`TaskTracker`]
//! 3. Poll status and collect log lines until a terminal status
//! 4. Notify completion callbacks, which advance the [`Workflow`]
//!
//! ## Modules
//! - `api`: backend client and the service traits the tracker depends on
//! - `task`: task records and the tracker
//! - `workflow`: step/chapter state, button gating, driver and snapshot store
//! - `config`: environment-driven configuration

pub mod api;
pub mod config;
pub mod task;
pub mod workflow;

pub use api::{ApiClient, ApiError, GenerationKind, JobService, TaskService};
pub use config::{Config, ConfigError};
pub use task::{Task, TaskStatus, TaskTracker};
pub use workflow::{
    ButtonStates, ChapterStatus, DriverError, ProjectSnapshot, SharedWorkflow, StoreError,
    Workflow, WorkflowDriver, WorkflowStep, WorkflowStore,
};
