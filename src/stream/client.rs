//! Opening reply turns against the assistant service.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use crate::config::AssistantConfig;
use crate::error::ApiError;
use crate::http::build_http_client;

use super::{StreamEvent, StreamEventQueue};

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// A stream of events for one reply turn.
#[async_trait]
pub trait TurnStream: Send {
    /// Next event, or `None` once the turn ended.
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, ApiError>;
}

/// Something that can start a reply turn.
#[async_trait]
pub trait TurnSource: Send + Sync {
    async fn open_turn(&self, request: &TurnRequest) -> Result<Box<dyn TurnStream>, ApiError>;
}

/// SSE chat client for the assistant backend.
///
/// `timeout` bounds connecting and the wait for response headers. The body
/// itself is read for as long as the reply keeps streaming; operators end a
/// stuck reply with an abort.
pub struct HttpAssistant {
    http: reqwest::Client,
    base_url: String,
    response_timeout: Duration,
}

impl HttpAssistant {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            response_timeout: timeout,
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        Self::new(config.base_url.clone(), config.timeout())
    }
}

#[async_trait]
impl TurnSource for HttpAssistant {
    async fn open_turn(&self, request: &TurnRequest) -> Result<Box<dyn TurnStream>, ApiError> {
        let url = format!("{}/chat", self.base_url);
        let send = self
            .http
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send();
        let response = match tokio::time::timeout(self.response_timeout, send).await {
            Ok(response) => response?,
            Err(_) => return Err(ApiError::Timeout(self.response_timeout)),
        };
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status(status, body));
        }
        Ok(Box::new(HttpTurnStream {
            response,
            events: StreamEventQueue::new(),
            body_done: false,
        }))
    }
}

/// Live SSE response body.
pub struct HttpTurnStream {
    response: reqwest::Response,
    events: StreamEventQueue,
    body_done: bool,
}

#[async_trait]
impl TurnStream for HttpTurnStream {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, ApiError> {
        loop {
            if let Some(event) = self.events.pop() {
                return Ok(Some(event));
            }
            if self.body_done || self.events.is_done() {
                return Ok(None);
            }
            match self.response.chunk().await? {
                Some(bytes) => self.events.push(&bytes)?,
                None => {
                    self.body_done = true;
                    self.events.finish()?;
                }
            }
        }
    }
}

/// A turn replayed from byte chunks already in memory (saved transcripts).
#[derive(Debug, Default)]
pub struct ChunkedTurnStream {
    chunks: VecDeque<Vec<u8>>,
    events: StreamEventQueue,
    finished: bool,
}

impl ChunkedTurnStream {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl TurnStream for ChunkedTurnStream {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, ApiError> {
        loop {
            if let Some(event) = self.events.pop() {
                return Ok(Some(event));
            }
            if self.finished || self.events.is_done() {
                return Ok(None);
            }
            match self.chunks.pop_front() {
                Some(bytes) => self.events.push(&bytes)?,
                None => {
                    self.finished = true;
                    self.events.finish()?;
                }
            }
        }
    }
}
