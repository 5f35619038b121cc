//! Console event schema.
//!
//! Frontends consume a single ordered stream of [`ConsoleEventEnvelope`]s.
//! `seq` is monotonic per [`EventSink`] (clones share the counter) so a
//! renderer can replay or de-duplicate.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::agent::{SessionStatus, StepStatus, StepType};
use crate::directive::DirectiveEvent;
use crate::queue::{ItemStatus, QueueId};

/// Monotonic envelope for console events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleEventEnvelope {
    pub seq: u64,
    pub ts_unix_ms: u64,
    pub event: ConsoleEvent,
}

impl ConsoleEventEnvelope {
    pub fn new(seq: u64, event: ConsoleEvent) -> Self {
        Self {
            seq,
            ts_unix_ms: now_unix_millis(),
            event,
        }
    }
}

/// Typed console event families.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ConsoleEvent {
    Reply(ReplyEvent),
    Directive(DirectiveEvent),
    Queue(QueueEvent),
    Agent(AgentEvent),
    Feedback(FeedbackEvent),
    Warning(WarningEvent),
}

/// Progress of one assistant reply turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyEvent {
    SessionAssigned { session_id: String },
    TextAppended { delta: String },
    /// Already-shown text was rewritten; re-render in full.
    TextReplaced { text: String },
    Finished { display_text: String },
    Aborted,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueItemView {
    pub id: u32,
    pub server: String,
    pub command: String,
    pub status: ItemStatus,
}

/// Queue lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueEvent {
    Opened {
        queue_id: QueueId,
        items: Vec<QueueItemView>,
    },
    Reconstructed {
        queue_id: QueueId,
        items: Vec<QueueItemView>,
    },
    ItemUpdated {
        queue_id: QueueId,
        item_id: u32,
        status: ItemStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    /// No prompt came back in time; the operator may capture manually.
    NeedsManualCapture {
        queue_id: QueueId,
        item_id: u32,
        partial_output: String,
    },
    AwaitingInput {
        queue_id: QueueId,
        item_id: u32,
        process_id: String,
        output: String,
    },
    AutoContinued {
        queue_id: QueueId,
    },
}

/// Agent session progress, in the order the machine applies it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentEvent {
    StepCreated {
        session_id: String,
        step_number: u32,
        step_type: StepType,
    },
    ApprovalRequested {
        session_id: String,
        step_number: u32,
        command: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    /// The step's process is blocked on a prompt; answer with `send_input`.
    AwaitingInput {
        session_id: String,
        step_number: u32,
        process_id: String,
        output: String,
    },
    StepResolved {
        session_id: String,
        step_number: u32,
        status: StepStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    StatusChanged {
        session_id: String,
        from: SessionStatus,
        to: SessionStatus,
    },
}

/// Outcome signal for external learning/analytics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackEvent {
    pub reference: String,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WarningEvent {
    pub message: String,
}

/// Cloneable emitter; a disabled sink drops events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ConsoleEventEnvelope>>,
    seq: Arc<AtomicU64>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<ConsoleEventEnvelope>) -> Self {
        Self {
            tx: Some(tx),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sink plus its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConsoleEventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ConsoleEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = tx.send(ConsoleEventEnvelope::new(seq, event));
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.emit(ConsoleEvent::Warning(WarningEvent { message }));
    }

    pub fn feedback(&self, reference: impl Into<String>, success: bool) {
        self.emit(ConsoleEvent::Feedback(FeedbackEvent {
            reference: reference.into(),
            success,
        }));
    }
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Drain everything currently buffered in `rx`.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ConsoleEventEnvelope>) -> Vec<ConsoleEvent> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        out.push(envelope.event);
    }
    out
}
