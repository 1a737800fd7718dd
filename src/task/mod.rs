//! Task module - tracking of server-side generation jobs.
//!
//! - `types`: the task record and its status
//! - `tracker`: reconciles status polling and log streaming into one record
//!   per task and fans out completion notifications

mod tracker;
mod types;

pub use tracker::{
    parse_log_message, CompletionCallback, Subscription, TaskTracker, STREAM_DISCONNECTED,
};
pub use types::{Task, TaskStatus, DEFAULT_FAILURE_MESSAGE};
