//! Assistant chat-stream transport.
//!
//! A reply turn arrives as server-sent events whose `data:` payloads are
//! small JSON records. [`SseFramer`] cuts the byte stream into payloads and
//! [`StreamEventQueue`] turns those into [`StreamEvent`]s.

mod client;
mod sse;

pub use client::{
    ChunkedTurnStream, HttpAssistant, HttpTurnStream, TurnRequest, TurnSource, TurnStream,
};
pub use sse::{parse_sse_event_payloads, SseFramer};

use serde::Deserialize;
use std::collections::VecDeque;
use tracing::debug;

use crate::agent::AgentStep;
use crate::error::ApiError;

/// Terminal payload some backends send instead of a `done` record.
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded record of the assistant stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The backend assigned (or confirmed) the conversation id.
    Session { session_id: String },
    Chunk { text: String },
    /// A planner step for the active agent session.
    AgentStep { step: AgentStep },
    /// Backend-side failure reported in-band.
    Error { message: String },
    Done,
    #[serde(other)]
    Unknown,
}

/// Parse one SSE payload. Empty payloads and unknown record types yield
/// `None`.
pub fn parse_stream_payload(payload: &str) -> Result<Option<StreamEvent>, ApiError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed == DONE_SENTINEL {
        return Ok(Some(StreamEvent::Done));
    }
    let event = serde_json::from_str::<StreamEvent>(trimmed)
        .map_err(|e| ApiError::InvalidResponse(format!("{e}: {trimmed}")))?;
    if event == StreamEvent::Unknown {
        debug!("ignoring unknown stream record: {trimmed}");
        return Ok(None);
    }
    Ok(Some(event))
}

/// Byte chunks in, ordered [`StreamEvent`]s out.
///
/// Nothing after the first `Done` is surfaced.
#[derive(Debug, Default)]
pub struct StreamEventQueue {
    framer: SseFramer,
    ready: VecDeque<StreamEvent>,
    done: bool,
}

impl StreamEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<(), ApiError> {
        let payloads = self.framer.push(bytes);
        self.accept(payloads)
    }

    /// Flush the framer at end of body.
    pub fn finish(&mut self) -> Result<(), ApiError> {
        let payloads = self.framer.finish();
        self.accept(payloads)
    }

    pub fn pop(&mut self) -> Option<StreamEvent> {
        self.ready.pop_front()
    }

    /// True once a `Done` record was queued.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn accept(&mut self, payloads: Vec<String>) -> Result<(), ApiError> {
        for payload in payloads {
            if self.done {
                break;
            }
            let Some(event) = parse_stream_payload(&payload)? else {
                continue;
            };
            self.done = event == StreamEvent::Done;
            self.ready.push_back(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{sse_data_block, sse_done_block, sse_event_block};

    #[test]
    fn parses_known_records() {
        assert_eq!(
            parse_stream_payload(r#"{"type":"session","session_id":"abc"}"#).unwrap(),
            Some(StreamEvent::Session {
                session_id: "abc".into()
            })
        );
        assert_eq!(
            parse_stream_payload(r#"{"type":"chunk","text":"hi"}"#).unwrap(),
            Some(StreamEvent::Chunk { text: "hi".into() })
        );
        assert_eq!(
            parse_stream_payload(r#"{"type":"done"}"#).unwrap(),
            Some(StreamEvent::Done)
        );
        assert_eq!(parse_stream_payload("[DONE]").unwrap(), Some(StreamEvent::Done));
    }

    #[test]
    fn agent_step_record_carries_the_step() {
        let event = parse_stream_payload(
            r#"{"type":"agent_step","step":{"step_number":2,"step_type":"command","content":"uptime"}}"#,
        )
        .unwrap();
        let Some(StreamEvent::AgentStep { step }) = event else {
            panic!("expected agent step");
        };
        assert_eq!(step.step_number, 2);
        assert_eq!(step.content, "uptime");
    }

    #[test]
    fn unknown_records_are_skipped_and_garbage_is_an_error() {
        assert_eq!(parse_stream_payload(r#"{"type":"ping"}"#).unwrap(), None);
        assert_eq!(parse_stream_payload("  ").unwrap(), None);
        let err = parse_stream_payload("{oops").unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[test]
    fn queue_stops_after_done() {
        let body = format!(
            "{}{}{}{}",
            sse_event_block("message", r#"{"type":"chunk","text":"a"}"#),
            sse_data_block(r#"{"type":"ping"}"#),
            sse_done_block(),
            sse_data_block(r#"{"type":"chunk","text":"late"}"#),
        );
        let mut queue = StreamEventQueue::new();
        queue.push(body.as_bytes()).unwrap();
        queue.finish().unwrap();
        assert!(queue.is_done());
        assert_eq!(queue.pop(), Some(StreamEvent::Chunk { text: "a".into() }));
        assert_eq!(queue.pop(), Some(StreamEvent::Done));
        assert_eq!(queue.pop(), None);
    }
}
