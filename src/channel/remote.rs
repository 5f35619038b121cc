//! Remote-exec channel: one request per command against an exec service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ExecConfig;
use crate::error::ChannelError;
use crate::http::build_http_client;

use super::{
    CancelFlag, CaptureCursor, ChannelKind, ExecutionChannel, ExecutionResult, InputReply,
    InteractiveProcess, RunOutcome,
};

/// Extra wall time granted to the HTTP request beyond the service timeout.
const REQUEST_GRACE: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Reply to `POST /exec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecResponse {
    Completed {
        #[serde(default)]
        stdout: String,
        #[serde(default)]
        stderr: String,
        #[serde(default)]
        exit_code: Option<i32>,
    },
    /// Still running when the service-side timeout hit; input may unblock it.
    Timeout {
        process_id: String,
        #[serde(default)]
        output: String,
    },
}

/// Reply to `POST /exec/{process_id}/input`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputResponse {
    pub completed: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Serialize)]
struct ExecRequest<'a> {
    target: &'a str,
    command: &'a str,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct InputRequest<'a> {
    text: &'a str,
}

/// The remote execution service as seen by the client.
#[async_trait]
pub trait RemoteExecService: Send + Sync {
    async fn is_connected(&self) -> bool;

    async fn exec(
        &self,
        target: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecResponse, ChannelError>;

    async fn send_input(&self, process_id: &str, text: &str)
        -> Result<InputResponse, ChannelError>;
}

/// JSON-over-HTTP exec service client.
pub struct HttpExecService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpExecService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: build_http_client(PROBE_TIMEOUT),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ExecConfig) -> Self {
        Self::new(config.base_url.clone())
    }

    async fn post_json<B, R>(&self, url: &str, body: &B, timeout: Duration) -> Result<R, ChannelError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Transport(format!("status {status}: {body}")));
        }
        response.json::<R>().await.map_err(transport)
    }
}

fn transport(err: reqwest::Error) -> ChannelError {
    ChannelError::Transport(err.to_string())
}

#[async_trait]
impl RemoteExecService for HttpExecService {
    async fn is_connected(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("exec service probe failed: {err}");
                false
            }
        }
    }

    async fn exec(
        &self,
        target: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecResponse, ChannelError> {
        let url = format!("{}/exec", self.base_url);
        let body = ExecRequest {
            target,
            command,
            timeout_secs: timeout.as_secs(),
        };
        self.post_json(&url, &body, timeout + REQUEST_GRACE).await
    }

    async fn send_input(
        &self,
        process_id: &str,
        text: &str,
    ) -> Result<InputResponse, ChannelError> {
        let url = format!("{}/exec/{process_id}/input", self.base_url);
        self.post_json(&url, &InputRequest { text }, REQUEST_GRACE * 3)
            .await
    }
}

/// [`ExecutionChannel`] over a [`RemoteExecService`].
pub struct RemoteExecChannel<S> {
    service: S,
    timeout: Duration,
}

impl<S: RemoteExecService> RemoteExecChannel<S> {
    pub fn new(service: S, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn service(&self) -> &S {
        &self.service
    }
}

impl RemoteExecChannel<HttpExecService> {
    pub fn from_config(config: &ExecConfig) -> Self {
        Self::new(
            HttpExecService::from_config(config),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

/// Join stdout and stderr, skipping empty streams.
fn join_streams(stdout: &str, stderr: &str) -> String {
    [stdout.trim_end(), stderr.trim_end()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl<S: RemoteExecService> ExecutionChannel for RemoteExecChannel<S> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::RemoteExec
    }

    async fn is_connected(&self) -> bool {
        self.service.is_connected().await
    }

    async fn run(
        &self,
        command: &str,
        target: &str,
        cancel: &CancelFlag,
    ) -> Result<RunOutcome, ChannelError> {
        if !self.service.is_connected().await {
            return Err(ChannelError::NotConnected(target.to_string()));
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(target, "remote exec cancelled");
                return Ok(RunOutcome::Cancelled);
            }
            response = self.service.exec(target, command, self.timeout) => response,
        };

        let outcome = match response {
            Ok(ExecResponse::Completed {
                stdout,
                stderr,
                exit_code,
            }) => RunOutcome::Finished(ExecutionResult {
                output: join_streams(&stdout, &stderr),
                exit_code,
                timed_out: false,
            }),
            Ok(ExecResponse::Timeout { process_id, output }) => {
                debug!(target, process_id, "remote command awaiting input");
                RunOutcome::Interactive(InteractiveProcess {
                    process_id,
                    target: target.to_string(),
                    output,
                })
            }
            Err(err) => RunOutcome::Finished(ExecutionResult::transport_failure(&err)),
        };
        Ok(outcome)
    }

    async fn capture_now(&self, _cursor: &CaptureCursor) -> Result<ExecutionResult, ChannelError> {
        Err(ChannelError::Unsupported("capture_now"))
    }

    async fn send_input(
        &self,
        process: &InteractiveProcess,
        text: &str,
    ) -> Result<InputReply, ChannelError> {
        if !self.service.is_connected().await {
            return Err(ChannelError::NotConnected(process.target.clone()));
        }
        let reply = match self.service.send_input(&process.process_id, text).await {
            Ok(response) => InputReply {
                completed: response.completed,
                output: response.output,
                exit_code: response.exit_code,
            },
            Err(err) => {
                let failed = ExecutionResult::transport_failure(&err);
                InputReply {
                    completed: true,
                    output: failed.output,
                    exit_code: failed.exit_code,
                }
            }
        };
        Ok(reply)
    }
}
