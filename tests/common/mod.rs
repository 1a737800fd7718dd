#![allow(dead_code)]

use std::time::Duration;

use novel_workbench::{ApiClient, Config};
use wiremock::MockServer;

pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn test_config(server: &MockServer, stream_logs: bool) -> Config {
    Config::default()
        .with_api_base(server.uri())
        .expect("mock server uri is a valid base")
        .with_poll_interval(POLL_INTERVAL)
        .with_stream_logs(stream_logs)
}

pub fn client_for(server: &MockServer, stream_logs: bool) -> ApiClient {
    ApiClient::new(&test_config(server, stream_logs)).expect("client builds")
}

/// Body of a `text/event-stream` response carrying `events` as `data:` lines.
pub fn sse_body(events: &[&str]) -> String {
    events
        .iter()
        .map(|data| format!("data: {}\n\n", data))
        .collect()
}
