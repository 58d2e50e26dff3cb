//! REST + Server-Sent Events sandbox provider.
//!
//! Endpoints, relative to the configured API URL:
//!
//! - `POST   sandboxes`                        → `{"sandbox_id", "working_dir"?}`
//! - `PUT    sandboxes/{id}/files?path=…`      raw body
//! - `GET    sandboxes/{id}/files?path=…`      raw body
//! - `GET    sandboxes/{id}/files/list?path=…` → `[{"name", "type"}]`
//! - `POST   sandboxes/{id}/commands`          → SSE `stdout` / `stderr` / `exit`
//! - `DELETE sandboxes/{id}`
//!
//! Output is line-oriented: each `stdout`/`stderr` event carries one line
//! without its terminator, and is stored with `\n` appended. A final line
//! the program printed without a newline therefore comes back with one.
//!
//! Requests carry the key in `X-API-Key`. Only a connect timeout is set
//! on the client: a command may legitimately stream for as long as its
//! `timeout` wrapper allows.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{
    CommandResult, OutputObserver, RemoteFileEntry, SandboxHandle, SandboxProvider, SandboxSpec,
};
use crate::error::{ExecutorError, Result};

const API_KEY_HEADER: &str = "x-api-key";

const CONNECT_TIMEOUT_SECS: u64 = 10;

// ── API types ────────────────────────────────────────────

#[derive(Serialize)]
struct CreateRequest<'a> {
    template: &'a str,
    #[serde(skip_serializing_if = "no_envs")]
    envs: &'a HashMap<String, String>,
}

fn no_envs(envs: &&HashMap<String, String>) -> bool {
    envs.is_empty()
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    sandbox_id: String,
    #[serde(default)]
    working_dir: Option<String>,
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    cmd: &'a str,
}

/// Payload of the final `exit` event.
#[derive(Debug, Deserialize)]
struct ExitEvent {
    exit_code: i32,
    /// Set by the provider when the run failed.
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
    name: String,
    #[serde(rename = "type")]
    kind: EntryKind,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum EntryKind {
    File,
    Dir,
    #[serde(other)]
    Other,
}

impl From<ApiEntry> for RemoteFileEntry {
    fn from(entry: ApiEntry) -> Self {
        RemoteFileEntry {
            name: entry.name,
            is_directory: entry.kind == EntryKind::Dir,
        }
    }
}

// ── Command output accumulation ──────────────────────────

/// Builds a [`CommandResult`] from SSE events as they arrive.
#[derive(Default)]
struct CommandOutput {
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    /// Feeds one event. Returns the finished result on `exit`.
    fn apply(
        &mut self,
        kind: &str,
        data: &str,
        observer: &dyn OutputObserver,
    ) -> Result<Option<CommandResult>> {
        match kind {
            "stdout" => {
                observer.on_stdout(data);
                self.stdout.push_str(data);
                self.stdout.push('\n');
            }
            "stderr" => {
                observer.on_stderr(data);
                self.stderr.push_str(data);
                self.stderr.push('\n');
            }
            "exit" => {
                let exit: ExitEvent = serde_json::from_str(data).map_err(|e| {
                    ExecutorError::SandboxCommand(format!("malformed exit event: {e}"))
                })?;
                if let Some(ref error) = exit.error {
                    debug!("Command reported error: {error}");
                }
                return Ok(Some(CommandResult {
                    exit_code: exit.exit_code,
                    stdout: std::mem::take(&mut self.stdout),
                    stderr: std::mem::take(&mut self.stderr),
                    errored: exit.error.is_some(),
                }));
            }
            // keepalives and future event types
            _ => {}
        }
        Ok(None)
    }
}

// ── HttpSandboxProvider ──────────────────────────────────

pub struct HttpSandboxProvider {
    client: Client,
    base_url: Url,
}

impl HttpSandboxProvider {
    pub fn new(api_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(api_url, client)
    }

    pub fn with_client(api_url: &str, client: Client) -> anyhow::Result<Self> {
        let base_url = Url::parse(api_url).map_err(|e| anyhow!("Invalid sandbox API URL: {e}"))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            bail!("Sandbox API URL must be http(s), got {api_url}");
        }
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn file_endpoint(&self, handle: &SandboxHandle, segments: &[&str], path: &str) -> Url {
        let mut all = vec!["sandboxes", handle.id.as_str()];
        all.extend_from_slice(segments);
        let mut url = self.endpoint(&all);
        url.query_pairs_mut().append_pair("path", path);
        url
    }

    /// Turns a non-success response into a `SandboxIo` error for `path`.
    async fn io_failure(path: &str, response: reqwest::Response) -> ExecutorError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return ExecutorError::io(path, "no such file or sandbox");
        }
        let body = response.text().await.unwrap_or_default();
        ExecutorError::io(path, format!("provider returned {status}: {body}"))
    }
}

#[async_trait]
impl SandboxProvider for HttpSandboxProvider {
    async fn create(&self, spec: &SandboxSpec, api_key: &str) -> Result<SandboxHandle> {
        let response = self
            .client
            .post(self.endpoint(&["sandboxes"]))
            .header(API_KEY_HEADER, api_key)
            .json(&CreateRequest {
                template: &spec.template,
                envs: &spec.envs,
            })
            .send()
            .await
            .map_err(|e| ExecutorError::SandboxProvision(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::SandboxProvision(format!(
                "provider returned {status}: {body}"
            )));
        }

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| ExecutorError::SandboxProvision(format!("malformed response: {e}")))?;

        Ok(SandboxHandle::new(
            created.sandbox_id,
            created
                .working_dir
                .unwrap_or_else(|| spec.working_dir.clone()),
            api_key.to_string(),
        ))
    }

    async fn write_file(&self, handle: &SandboxHandle, path: &str, content: &[u8]) -> Result<()> {
        let response = self
            .client
            .put(self.file_endpoint(handle, &["files"], path))
            .header(API_KEY_HEADER, &handle.api_key)
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| ExecutorError::io(path, e))?;

        if !response.status().is_success() {
            return Err(Self::io_failure(path, response).await);
        }
        debug!("Wrote {} bytes to {path} in sandbox {}", content.len(), handle.id);
        Ok(())
    }

    async fn run_command(
        &self,
        handle: &SandboxHandle,
        command: &str,
        observer: &dyn OutputObserver,
    ) -> Result<CommandResult> {
        let response = self
            .client
            .post(self.endpoint(&["sandboxes", handle.id.as_str(), "commands"]))
            .header(API_KEY_HEADER, &handle.api_key)
            .header("accept", "text/event-stream")
            .json(&CommandRequest { cmd: command })
            .send()
            .await
            .map_err(|e| ExecutorError::SandboxCommand(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::SandboxCommand(format!(
                "provider returned {status}: {body}"
            )));
        }

        let mut events = Box::pin(response.bytes_stream().eventsource());
        let mut output = CommandOutput::default();
        while let Some(event) = events.next().await {
            let event = event
                .map_err(|e| ExecutorError::SandboxCommand(format!("event stream error: {e}")))?;
            if let Some(result) = output.apply(&event.event, &event.data, observer)? {
                return Ok(result);
            }
        }

        Err(ExecutorError::SandboxCommand(
            "event stream ended before the command exited".into(),
        ))
    }

    async fn list_directory(
        &self,
        handle: &SandboxHandle,
        path: &str,
    ) -> Result<Vec<RemoteFileEntry>> {
        let response = self
            .client
            .get(self.file_endpoint(handle, &["files", "list"], path))
            .header(API_KEY_HEADER, &handle.api_key)
            .send()
            .await
            .map_err(|e| ExecutorError::io(path, e))?;

        if !response.status().is_success() {
            return Err(Self::io_failure(path, response).await);
        }

        let entries: Vec<ApiEntry> = response
            .json()
            .await
            .map_err(|e| ExecutorError::io(path, format!("malformed listing: {e}")))?;
        Ok(entries.into_iter().map(RemoteFileEntry::from).collect())
    }

    async fn read_file(&self, handle: &SandboxHandle, path: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.file_endpoint(handle, &["files"], path))
            .header(API_KEY_HEADER, &handle.api_key)
            .send()
            .await
            .map_err(|e| ExecutorError::io(path, e))?;

        if !response.status().is_success() {
            return Err(Self::io_failure(path, response).await);
        }

        let bytes = response.bytes().await.map_err(|e| ExecutorError::io(path, e))?;
        Ok(bytes.to_vec())
    }

    async fn destroy(&self, handle: &SandboxHandle) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&["sandboxes", handle.id.as_str()]))
            .header(API_KEY_HEADER, &handle.api_key)
            .send()
            .await
            .map_err(|e| ExecutorError::io(handle.id.as_str(), e))?;

        let status = response.status();
        // Already gone counts as destroyed
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ExecutorError::io(
            handle.id.as_str(),
            format!("provider returned {status}: {body}"),
        ))
    }

    fn provider_name(&self) -> &str {
        "http"
    }
}
