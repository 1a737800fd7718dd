//! Command line client for the generation backend.
//!
//! `watch` follows one task until it finishes, printing log lines as they
//! arrive; `status` and `cancel` issue a single request. `submit` runs a
//! generation job through the project's stored workflow, and `workflow`
//! shows that stored progress.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use novel_workbench::task::Subscription;
use novel_workbench::{
    ApiClient, Config, DriverError, GenerationKind, SharedWorkflow, Task, TaskService,
    TaskStatus, TaskTracker, Workflow, WorkflowDriver, WorkflowStore,
};

/// How often `watch` checks the tracked record for new log lines.
const LOG_REFRESH: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "novel-workbench", version, about = "Follow and control generation tasks")]
struct Cli {
    /// Backend base URL; overrides WORKBENCH_API_BASE.
    #[arg(long = "api-base", value_name = "URL", global = true)]
    api_base: Option<String>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info", global = true)]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track a task until it succeeds or fails.
    Watch {
        task_id: String,
        #[arg(long, default_value = "task")]
        label: String,
    },
    /// Print the current status of a task.
    Status { task_id: String },
    /// Ask the backend to cancel a task.
    Cancel { task_id: String },
    /// Submit a generation job if the project's workflow allows it, then
    /// follow it and record the resulting progress.
    Submit {
        /// architecture, blueprint, build-prompt, draft, finalize, batch,
        /// consistency-check or vectorstore-clear
        kind: GenerationKind,
        project_id: String,
        /// JSON request body.
        #[arg(long, default_value = "{}")]
        payload: String,
        #[arg(long = "project-dir", value_name = "DIR", default_value = ".")]
        project_dir: PathBuf,
    },
    /// Show the stored workflow progress of a project.
    Workflow {
        #[arg(long = "project-dir", value_name = "DIR", default_value = ".")]
        project_dir: PathBuf,
        /// Forget the stored progress.
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    match args.command {
        Command::Workflow { project_dir, reset } => show_workflow(&project_dir, reset),
        Command::Watch { task_id, label } => {
            let (client, config) = connect(args.api_base)?;
            watch(client, &config, task_id, label).await
        }
        Command::Status { task_id } => {
            let (client, _) = connect(args.api_base)?;
            let status = client
                .task_status(&task_id)
                .await
                .with_context(|| format!("query status of {}", task_id))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Cancel { task_id } => {
            let (client, _) = connect(args.api_base)?;
            client
                .cancel_task(&task_id)
                .await
                .with_context(|| format!("cancel {}", task_id))?;
            println!("cancel requested for {}", task_id);
            Ok(ExitCode::SUCCESS)
        }
        Command::Submit {
            kind,
            project_id,
            payload,
            project_dir,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("--payload is not valid JSON")?;
            let (client, config) = connect(args.api_base)?;
            submit(client, &config, kind, &project_id, &payload, project_dir).await
        }
    }
}

fn connect(api_base: Option<String>) -> Result<(ApiClient, Config)> {
    let mut config = Config::from_env().context("load configuration")?;
    if let Some(base) = api_base {
        config = config.with_api_base(base).context("invalid --api-base")?;
    }
    let client = ApiClient::new(&config).context("build HTTP client")?;
    info!(api_base = %client.base_url(), "using backend");
    Ok((client, config))
}

/// Forward every completion of `tracker` into a channel.
fn completions(tracker: &TaskTracker) -> (Subscription, mpsc::UnboundedReceiver<Task>) {
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let subscription = tracker.on_task_complete(move |task| {
        let _ = done_tx.send(task.clone());
    });
    (subscription, done_rx)
}

async fn watch(
    client: ApiClient,
    config: &Config,
    task_id: String,
    label: String,
) -> Result<ExitCode> {
    let tracker = TaskTracker::with_poll_interval(Arc::new(client), config.poll_interval);
    let (subscription, done_rx) = completions(&tracker);

    tracker.register_task(task_id.clone(), label).await;
    let code = follow(&tracker, &task_id, done_rx).await;

    subscription.unsubscribe();
    tracker.clear_all().await;
    code
}

async fn submit(
    client: ApiClient,
    config: &Config,
    kind: GenerationKind,
    project_id: &str,
    payload: &serde_json::Value,
    project_dir: PathBuf,
) -> Result<ExitCode> {
    let store = WorkflowStore::new(&project_dir);
    let workflow: SharedWorkflow = Arc::new(RwLock::new(store.open_workflow()));

    let client = Arc::new(client);
    let tracker = TaskTracker::with_poll_interval(client.clone(), config.poll_interval);
    // Registered first, so progress is on disk before `follow` sees the completion.
    let driver = WorkflowDriver::with_store(client, tracker.clone(), workflow.clone(), store);
    let (subscription, done_rx) = completions(&tracker);

    let task_id = match driver.submit(kind, project_id, payload).await {
        Ok(task_id) => task_id,
        Err(DriverError::Disabled { reason }) => {
            eprintln!("{} is not available: {}", kind, reason);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).with_context(|| format!("submit {} for {}", kind, project_id)),
    };
    println!("submitted {} as {}", kind, task_id);

    let code = follow(&tracker, &task_id, done_rx).await;
    subscription.unsubscribe();
    tracker.clear_all().await;

    let workflow = workflow
        .read()
        .map_err(|_| anyhow!("workflow lock poisoned"))?;
    print_workflow(&workflow)?;
    code
}

fn show_workflow(project_dir: &Path, reset: bool) -> Result<ExitCode> {
    let store = WorkflowStore::new(project_dir);
    if reset {
        let removed = store.clear().context("clear stored workflow")?;
        println!(
            "{}",
            if removed { "workflow reset" } else { "no stored workflow" }
        );
        return Ok(ExitCode::SUCCESS);
    }
    if let Err(e) = store.read() {
        warn!("{}", e);
    }
    print_workflow(&store.open_workflow())?;
    Ok(ExitCode::SUCCESS)
}

fn print_workflow(workflow: &Workflow) -> Result<()> {
    let chapter = workflow.current_chapter();
    let summary = serde_json::json!({
        "currentStep": workflow.current_step(),
        "currentChapter": chapter,
        "totalChapters": workflow.total_chapters(),
        "chapterStatus": workflow.chapter_status(chapter),
        "chapterLabel": workflow.chapter_status_label().label,
        "buttons": workflow.button_states(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Print log lines of `task_id` until it finishes or ctrl-c is pressed.
async fn follow(
    tracker: &TaskTracker,
    task_id: &str,
    mut done_rx: mpsc::UnboundedReceiver<Task>,
) -> Result<ExitCode> {
    let mut printed = 0;
    let mut refresh = tokio::time::interval(LOG_REFRESH);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let outcome = loop {
        tokio::select! {
            finished = done_rx.recv() => match finished {
                Some(task) if task.id == task_id => break Some(task),
                Some(_) => {}
                None => break None,
            },
            _ = refresh.tick() => {
                if let Some(task) = tracker.task(task_id).await {
                    printed = print_new_logs(&task.logs, printed);
                }
            }
            signal = &mut ctrl_c => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for ctrl-c");
                }
                info!("interrupted, stopping");
                break None;
            }
        }
    };

    let Some(task) = outcome else {
        return Ok(ExitCode::from(130));
    };
    print_new_logs(&task.logs, printed);

    match task.status {
        TaskStatus::Success => {
            println!("{} succeeded", task.id);
            if !task.output_files.is_empty() {
                println!("outputs: {}", task.output_files.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }
        TaskStatus::Failed => {
            let error = task.error.as_deref().unwrap_or_default();
            eprintln!("{} failed: {}", task.id, error);
            Ok(ExitCode::FAILURE)
        }
        other => Err(anyhow!("task {} reported non-terminal status {}", task.id, other)),
    }
}

fn print_new_logs(logs: &[String], printed: usize) -> usize {
    for line in logs.iter().skip(printed) {
        println!("{}", line);
    }
    logs.len().max(printed)
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}
