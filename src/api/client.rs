//! HTTP + SSE client for the generation backend.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::de::DeserializeOwned;

use super::{ApiError, JobService, LogStream, TaskResponse, TaskService, TaskStatusResponse};
use crate::config::Config;

/// Job kinds the backend can run, one submission endpoint each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationKind {
    Architecture,
    Blueprint,
    BuildPrompt,
    Draft,
    Finalize,
    Batch,
    ConsistencyCheck,
    VectorStoreClear,
}

impl GenerationKind {
    /// Endpoint path for a project.
    pub fn path(&self, project_id: &str) -> String {
        let project = urlencoding::encode(project_id);
        match self {
            Self::Architecture => format!("/api/projects/{}/generate/architecture", project),
            Self::Blueprint => format!("/api/projects/{}/generate/blueprint", project),
            Self::BuildPrompt => format!("/api/projects/{}/generate/build-prompt", project),
            Self::Draft => format!("/api/projects/{}/generate/draft", project),
            Self::Finalize => format!("/api/projects/{}/generate/finalize", project),
            Self::Batch => format!("/api/projects/{}/generate/batch", project),
            Self::ConsistencyCheck => format!("/api/projects/{}/consistency-check", project),
            Self::VectorStoreClear => format!("/api/projects/{}/vectorstore/clear", project),
        }
    }

    /// Default human label for tasks of this kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Architecture => "Generate architecture",
            Self::Blueprint => "Generate blueprint",
            Self::BuildPrompt => "Build chapter prompt",
            Self::Draft => "Generate draft",
            Self::Finalize => "Finalize chapter",
            Self::Batch => "Batch generation",
            Self::ConsistencyCheck => "Consistency check",
            Self::VectorStoreClear => "Clear vector store",
        }
    }

    /// Command-line name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Blueprint => "blueprint",
            Self::BuildPrompt => "build-prompt",
            Self::Draft => "draft",
            Self::Finalize => "finalize",
            Self::Batch => "batch",
            Self::ConsistencyCheck => "consistency-check",
            Self::VectorStoreClear => "vectorstore-clear",
        }
    }

    pub const ALL: [GenerationKind; 8] = [
        Self::Architecture,
        Self::Blueprint,
        Self::BuildPrompt,
        Self::Draft,
        Self::Finalize,
        Self::Batch,
        Self::ConsistencyCheck,
        Self::VectorStoreClear,
    ];

    fn takes_body(&self) -> bool {
        !matches!(self, Self::VectorStoreClear)
    }
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GenerationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown generation kind '{}', expected one of {}", s, known.join(", "))
            })
    }
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
    /// Log streams are long-lived, so this client has no total request timeout.
    stream_client: Client,
    stream_logs: bool,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let mut base_url = config.api_base.clone();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let stream_client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            base_url,
            client,
            stream_client,
            stream_logs: config.stream_logs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn task_path(task_id: &str, suffix: &str) -> String {
        format!("/api/tasks/{}{}", urlencoding::encode(task_id), suffix)
    }

    async fn read_json<T: DeserializeOwned>(
        path: &str,
        resp: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ApiError::status(path, status, text));
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Parse {
            path: path.to_string(),
            message: format!("{}, body: {}", e, text),
        })
    }

    /// Submit a generation job and return its task id.
    pub async fn submit(
        &self,
        kind: GenerationKind,
        project_id: &str,
        payload: &serde_json::Value,
    ) -> Result<TaskResponse, ApiError> {
        let path = kind.path(project_id);
        let mut request = self.client.post(self.url(&path));
        if kind.takes_body() {
            request = request.json(payload);
        }

        tracing::debug!(path = %path, "Submitting generation job");
        let resp = request.send().await?;
        let response: TaskResponse = Self::read_json(&path, resp).await?;
        tracing::info!(task_id = %response.task_id, kind = ?kind, "Generation job accepted");
        Ok(response)
    }
}

#[async_trait]
impl JobService for ApiClient {
    async fn submit_job(
        &self,
        kind: GenerationKind,
        project_id: &str,
        payload: &serde_json::Value,
    ) -> Result<TaskResponse, ApiError> {
        self.submit(kind, project_id, payload).await
    }
}

#[async_trait]
impl TaskService for ApiClient {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatusResponse, ApiError> {
        let path = Self::task_path(task_id, "");
        let resp = self.client.get(self.url(&path)).send().await?;
        Self::read_json(&path, resp).await
    }

    async fn cancel_task(&self, task_id: &str) -> Result<(), ApiError> {
        let path = Self::task_path(task_id, "/cancel");
        let resp = self.client.post(self.url(&path)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::status(&path, status, text));
        }
        Ok(())
    }

    fn log_stream(&self, task_id: &str) -> Option<LogStream> {
        if !self.stream_logs {
            return None;
        }

        let url = self.url(&Self::task_path(task_id, "/stream"));
        let request = self
            .stream_client
            .get(&url)
            .header("Accept", "text/event-stream");
        let mut source = match EventSource::new(request) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(task_id = %task_id, "Cannot open log stream: {}", e);
                return None;
            }
        };

        let stream = async_stream::stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => yield Ok(message.data),
                    // A server-side close is a normal end here, not a disconnect.
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        yield Err(ApiError::Stream(e.to_string()));
                        break;
                    }
                }
            }
            // Stops the automatic reconnect.
            source.close();
        };
        Some(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_paths() {
        assert_eq!(
            GenerationKind::Draft.path("my novel"),
            "/api/projects/my%20novel/generate/draft"
        );
        assert_eq!(
            GenerationKind::ConsistencyCheck.path("p1"),
            "/api/projects/p1/consistency-check"
        );
        assert!(!GenerationKind::VectorStoreClear.takes_body());
    }

    #[test]
    fn test_kind_names_parse_back() {
        for kind in GenerationKind::ALL {
            assert_eq!(kind.as_str().parse::<GenerationKind>(), Ok(kind));
        }
        let err = "chapter".parse::<GenerationKind>().unwrap_err();
        assert!(err.contains("build-prompt"));
    }

    #[test]
    fn test_task_path_is_encoded() {
        assert_eq!(ApiClient::task_path("a/b", "/cancel"), "/api/tasks/a%2Fb/cancel");
    }

    #[test]
    fn test_stream_disabled_returns_none() {
        let config = Config::default().with_stream_logs(false);
        let client = ApiClient::new(&config).unwrap();
        assert!(client.log_stream("t1").is_none());
    }
}
