//! Queue items and batches.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::channel::{CaptureCursor, ExecutionResult, InteractiveProcess};
use crate::directive::CommandSuggestion;
use crate::events::QueueItemView;

/// Output recorded for skipped items.
pub const SKIPPED_OUTPUT: &str = "[user skipped]";

/// Identifies one batch of command suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(pub String);

impl QueueId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Executed,
    Skipped,
}

impl ItemStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executed => "executed",
            Self::Skipped => "skipped",
        }
    }

    /// Read a status back from a rendered label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "running" | "waiting" => Some(Self::Pending),
            "executed" | "done" | "completed" | "ran" => Some(Self::Executed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One command in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: u32,
    pub server: String,
    pub command: String,
    pub explanation: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl QueueItem {
    pub fn from_suggestion(id: u32, suggestion: CommandSuggestion) -> Self {
        Self {
            id,
            server: suggestion.server,
            command: suggestion.command,
            explanation: suggestion.explanation,
            status: ItemStatus::Pending,
            output: None,
            exit_code: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }

    pub(crate) fn mark_executed(&mut self, result: ExecutionResult) {
        self.status = ItemStatus::Executed;
        self.output = Some(result.output);
        self.exit_code = result.exit_code;
    }

    pub(crate) fn mark_skipped(&mut self) {
        self.status = ItemStatus::Skipped;
        self.output = Some(SKIPPED_OUTPUT.to_string());
        self.exit_code = None;
    }

    pub fn view(&self) -> QueueItemView {
        QueueItemView {
            id: self.id,
            server: self.server.clone(),
            command: self.command.clone(),
            status: self.status,
        }
    }
}

/// Work left hanging on a pending item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outstanding {
    Capture(CaptureCursor),
    Interactive(InteractiveProcess),
}

/// An ordered batch sharing one [`QueueId`].
#[derive(Debug, Clone)]
pub struct Queue {
    pub id: QueueId,
    pub items: Vec<QueueItem>,
    pub(crate) outstanding: HashMap<u32, Outstanding>,
}

impl Queue {
    pub fn new(id: QueueId, items: Vec<QueueItem>) -> Self {
        Self {
            id,
            items,
            outstanding: HashMap::new(),
        }
    }

    /// No item is still pending.
    pub fn is_settled(&self) -> bool {
        self.items.iter().all(|item| !item.is_pending())
    }

    pub fn item(&self, item_id: u32) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub(crate) fn item_mut(&mut self, item_id: u32) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }

    pub fn views(&self) -> Vec<QueueItemView> {
        self.items.iter().map(QueueItem::view).collect()
    }
}
