//! Messages that re-enter the chat stream.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::queue::QueueId;

/// Who produced an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MessageOrigin {
    Operator,
    /// A follow-up suggestion the operator picked.
    FollowUp,
    QueueReport { queue_id: QueueId },
    /// An agent step result or rejection for the remote planner.
    Planner { session_id: String, step_number: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    pub origin: MessageOrigin,
}

impl OutboundMessage {
    pub fn operator(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: MessageOrigin::Operator,
        }
    }
}

pub type OutboundSender = mpsc::UnboundedSender<OutboundMessage>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundMessage>;

pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::unbounded_channel()
}
