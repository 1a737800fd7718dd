//! Task lifecycle tracker.
//!
//! Every registered task gets two independent producers:
//! - a poll loop, the only writer of `status`, `result`, `error`,
//!   `output_files` and `completed_at`
//! - a log stream subscription, the only writer of `logs`
//!
//! Each registration carries a generation number. A producer only writes to,
//! or releases the handle of, the registration it was started for, so a loop
//! left over from a replaced registration can never touch the new record.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::types::{Task, TaskStatus};
use crate::api::{ApiError, LogStream, TaskService, TaskStatusResponse};
use crate::config::DEFAULT_POLL_INTERVAL;

/// Log line appended when a task's log stream breaks.
pub const STREAM_DISCONNECTED: &str = "log stream disconnected.";

/// Callback invoked once per task when it reaches a terminal status.
pub type CompletionCallback = Arc<dyn Fn(&Task) + Send + Sync>;

struct ChannelHandle {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TaskSet {
    /// Most recently registered first, one entry per id.
    tasks: Vec<Task>,
    /// Current registration of every tracked id.
    generations: HashMap<String, u64>,
    active_task_id: Option<String>,
    pollers: HashMap<String, ChannelHandle>,
    streams: HashMap<String, ChannelHandle>,
}

impl TaskSet {
    fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    fn owns_poller(&self, task_id: &str, generation: u64) -> bool {
        self.pollers.get(task_id).map(|h| h.generation) == Some(generation)
    }

    fn owns_stream(&self, task_id: &str, generation: u64) -> bool {
        self.streams.get(task_id).map(|h| h.generation) == Some(generation)
    }

    fn abort_poller(&mut self, task_id: &str) -> bool {
        match self.pollers.remove(task_id) {
            Some(poller) => {
                poller.handle.abort();
                true
            }
            None => false,
        }
    }

    fn abort_stream(&mut self, task_id: &str) -> bool {
        match self.streams.remove(task_id) {
            Some(stream) => {
                stream.handle.abort();
                true
            }
            None => false,
        }
    }

    fn abort_all(&mut self) {
        for (_, poller) in self.pollers.drain() {
            poller.handle.abort();
        }
        for (_, stream) in self.streams.drain() {
            stream.handle.abort();
        }
    }
}

#[derive(Default)]
struct CallbackRegistry {
    next_id: u64,
    callbacks: Vec<(u64, CompletionCallback)>,
}

struct TrackerInner {
    service: Arc<dyn TaskService>,
    poll_interval: Duration,
    state: RwLock<TaskSet>,
    callbacks: Mutex<CallbackRegistry>,
    next_generation: AtomicU64,
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        self.state.get_mut().abort_all();
    }
}

/// What a poll loop does after one reconciliation step.
enum PollStep {
    Continue,
    Stop,
    Completed(Task),
}

/// Owner of all tracked tasks.
///
/// Cheap to clone; clones share the same task set and callbacks.
#[derive(Clone)]
pub struct TaskTracker {
    inner: Arc<TrackerInner>,
}

impl TaskTracker {
    pub fn new(service: Arc<dyn TaskService>) -> Self {
        Self::with_poll_interval(service, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(service: Arc<dyn TaskService>, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                service,
                poll_interval,
                state: RwLock::new(TaskSet::default()),
                callbacks: Mutex::new(CallbackRegistry::default()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration and channels
    // ─────────────────────────────────────────────────────────────────────

    /// Track a task: insert a fresh `pending` record at the front, make it
    /// active, and start its poll loop and log stream.
    ///
    /// Re-registering an id stops the channels of the previous registration
    /// and replaces its record.
    pub async fn register_task(&self, task_id: impl Into<String>, label: impl Into<String>) {
        let task_id = task_id.into();
        let label = label.into();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut state = self.inner.state.write().await;
        let replaced = state.abort_poller(&task_id) | state.abort_stream(&task_id);
        state.tasks.retain(|t| t.id != task_id);
        state.tasks.insert(0, Task::new(task_id.clone(), label.clone()));
        state.generations.insert(task_id.clone(), generation);
        state.active_task_id = Some(task_id.clone());

        let streaming = self.start_stream(&mut state, &task_id, generation);
        self.start_poller(&mut state, &task_id, generation);
        drop(state);

        tracing::info!(
            task_id = %task_id,
            label = %label,
            streaming = streaming,
            replaced = replaced,
            "Registered task"
        );
    }

    /// Start polling a tracked task. Returns `false` when a poll loop already
    /// runs for it or the id is unknown.
    pub async fn poll_status(&self, task_id: &str) -> bool {
        let mut state = self.inner.state.write().await;
        match state.generations.get(task_id).copied() {
            Some(generation) => self.start_poller(&mut state, task_id, generation),
            None => false,
        }
    }

    /// Attach the log stream of a tracked task. Returns `false` when a stream
    /// is already attached, the id is unknown, or the service cannot stream.
    pub async fn connect_stream(&self, task_id: &str) -> bool {
        let mut state = self.inner.state.write().await;
        match state.generations.get(task_id).copied() {
            Some(generation) => self.start_stream(&mut state, task_id, generation),
            None => false,
        }
    }

    fn start_poller(&self, state: &mut TaskSet, task_id: &str, generation: u64) -> bool {
        if state.pollers.contains_key(task_id) {
            return false;
        }
        let handle = tokio::spawn(run_poller(
            Arc::downgrade(&self.inner),
            task_id.to_string(),
            generation,
            self.inner.poll_interval,
        ));
        state
            .pollers
            .insert(task_id.to_string(), ChannelHandle { generation, handle });
        true
    }

    fn start_stream(&self, state: &mut TaskSet, task_id: &str, generation: u64) -> bool {
        if state.streams.contains_key(task_id) {
            return false;
        }
        let Some(stream) = self.inner.service.log_stream(task_id) else {
            tracing::debug!(task_id = %task_id, "Log streaming unavailable, polling only");
            return false;
        };
        let handle = tokio::spawn(run_stream(
            Arc::downgrade(&self.inner),
            task_id.to_string(),
            generation,
            stream,
        ));
        state
            .streams
            .insert(task_id.to_string(), ChannelHandle { generation, handle });
        true
    }

    /// Stop polling a task. No-op when not polling.
    pub async fn clear_poller(&self, task_id: &str) {
        self.inner.state.write().await.abort_poller(task_id);
    }

    /// Detach the log stream of a task. No-op when not streaming.
    pub async fn close_stream(&self, task_id: &str) {
        self.inner.state.write().await.abort_stream(task_id);
    }

    /// Stop both channels of a task and ask the service to cancel it.
    ///
    /// The remote cancel is fire-and-forget: this returns without waiting for
    /// the service, and a failed cancel is only logged.
    pub async fn cancel_task(&self, task_id: &str) {
        {
            let mut state = self.inner.state.write().await;
            state.abort_poller(task_id);
            state.abort_stream(task_id);
        }

        let service = self.inner.service.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            match service.cancel_task(&task_id).await {
                Ok(()) => tracing::info!(task_id = %task_id, "Cancel request accepted"),
                Err(e) => tracing::warn!(task_id = %task_id, "Cancel request failed: {}", e),
            }
        });
    }

    /// Stop every channel and forget all tasks.
    pub async fn clear_all(&self) {
        let mut state = self.inner.state.write().await;
        state.abort_all();
        let cleared = state.tasks.len();
        state.tasks.clear();
        state.generations.clear();
        state.active_task_id = None;
        drop(state);
        tracing::debug!(cleared = cleared, "Cleared all tasks");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Completion callbacks
    // ─────────────────────────────────────────────────────────────────────

    /// Register a completion callback. Callbacks run in registration order.
    pub fn on_task_complete<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        let mut registry = self.inner.lock_callbacks();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.callbacks.push((id, Arc::new(callback)));
        Subscription {
            id,
            tracker: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every registered callback with `task`.
    ///
    /// A panicking callback is logged and skipped; the others still run.
    pub fn notify_task_complete(&self, task: &Task) {
        self.inner.notify_task_complete(task);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read access
    // ─────────────────────────────────────────────────────────────────────

    /// Snapshot of all tasks, most recently registered first.
    pub async fn tasks(&self) -> Vec<Task> {
        self.inner.state.read().await.tasks.clone()
    }

    pub async fn task(&self, task_id: &str) -> Option<Task> {
        let state = self.inner.state.read().await;
        state.tasks.iter().find(|t| t.id == task_id).cloned()
    }

    /// Id of the most recently registered task. May name a task that has
    /// since been cleared.
    pub async fn active_task_id(&self) -> Option<String> {
        self.inner.state.read().await.active_task_id.clone()
    }

    pub async fn active_task(&self) -> Option<Task> {
        let state = self.inner.state.read().await;
        let active = state.active_task_id.as_deref()?;
        state.tasks.iter().find(|t| t.id == active).cloned()
    }

    pub async fn is_polling(&self, task_id: &str) -> bool {
        self.inner.state.read().await.pollers.contains_key(task_id)
    }

    pub async fn is_streaming(&self, task_id: &str) -> bool {
        self.inner.state.read().await.streams.contains_key(task_id)
    }
}

impl TrackerInner {
    fn lock_callbacks(&self) -> std::sync::MutexGuard<'_, CallbackRegistry> {
        self.callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify_task_complete(&self, task: &Task) {
        let callbacks: Vec<CompletionCallback> = self
            .lock_callbacks()
            .callbacks
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for callback in callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(task))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(task_id = %task.id, "Task completion callback panicked: {}", message);
            }
        }
    }

    /// Fold one status query outcome into the task record.
    async fn reconcile(
        &self,
        task_id: &str,
        generation: u64,
        outcome: Result<TaskStatusResponse, ApiError>,
    ) -> PollStep {
        let mut state = self.state.write().await;
        if !state.owns_poller(task_id, generation) {
            return PollStep::Stop;
        }
        let Some(task) = state.task_mut(task_id) else {
            state.pollers.remove(task_id);
            return PollStep::Stop;
        };

        // Terminal records are final; a late poll loop just winds down.
        if task.is_terminal() {
            state.pollers.remove(task_id);
            return PollStep::Stop;
        }

        match outcome {
            Ok(payload) => {
                task.output_files = payload.output_files.unwrap_or_default();
                task.result = match payload.status {
                    TaskStatus::Success => payload.result,
                    _ => None,
                };
                task.error = match payload.status {
                    TaskStatus::Failed => payload.error,
                    _ => None,
                };
                if payload.status.is_terminal() {
                    task.mark_completed(payload.status);
                } else {
                    task.status = payload.status;
                    return PollStep::Continue;
                }
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, "Status query failed: {}", e);
                task.result = None;
                task.error = Some(e.to_string());
                task.mark_completed(TaskStatus::Failed);
            }
        }

        let snapshot = task.clone();
        state.pollers.remove(task_id);
        if state.owns_stream(task_id, generation) {
            state.abort_stream(task_id);
        }
        drop(state);

        tracing::info!(
            task_id = %task_id,
            status = %snapshot.status,
            output_files = snapshot.output_files.len(),
            "Task finished"
        );
        PollStep::Completed(snapshot)
    }

    /// Append a log line if the stream still belongs to this registration.
    async fn append_log(&self, task_id: &str, generation: u64, line: String) -> bool {
        let mut state = self.state.write().await;
        if !state.owns_stream(task_id, generation) {
            return false;
        }
        match state.task_mut(task_id) {
            Some(task) => {
                task.logs.push(line);
                true
            }
            None => false,
        }
    }

    async fn release_stream(&self, task_id: &str, generation: u64) {
        let mut state = self.state.write().await;
        if state.owns_stream(task_id, generation) {
            state.streams.remove(task_id);
        }
    }
}

async fn run_poller(tracker: Weak<TrackerInner>, task_id: String, generation: u64, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = tracker.upgrade() else {
            return;
        };

        let outcome = inner.service.task_status(&task_id).await;
        match inner.reconcile(&task_id, generation, outcome).await {
            PollStep::Continue => {}
            PollStep::Stop => return,
            PollStep::Completed(task) => {
                inner.notify_task_complete(&task);
                return;
            }
        }
    }
}

async fn run_stream(tracker: Weak<TrackerInner>, task_id: String, generation: u64, mut stream: LogStream) {
    while let Some(item) = stream.next().await {
        let Some(inner) = tracker.upgrade() else {
            return;
        };
        match item {
            Ok(data) => {
                let Some(line) = parse_log_message(&data) else {
                    continue;
                };
                if !inner.append_log(&task_id, generation, line).await {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, "Log stream disconnected: {}", e);
                inner
                    .append_log(&task_id, generation, STREAM_DISCONNECTED.to_string())
                    .await;
                break;
            }
        }
    }

    if let Some(inner) = tracker.upgrade() {
        inner.release_stream(&task_id, generation).await;
    }
}

/// Extract the log line from one stream event.
///
/// JSON objects with a string `message` yield that message; anything else is
/// used verbatim. Empty events yield nothing.
pub fn parse_log_message(data: &str) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    let message = serde_json::from_str::<serde_json::Value>(data)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        });
    Some(message.unwrap_or_else(|| data.to_string()))
}

/// Handle returned by [`TaskTracker::on_task_complete`].
pub struct Subscription {
    id: u64,
    tracker: Weak<TrackerInner>,
}

impl Subscription {
    /// Remove the callback. Later completions no longer reach it.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.tracker.upgrade() {
            inner.lock_callbacks().callbacks.retain(|(id, _)| *id != self.id);
        }
    }
}
