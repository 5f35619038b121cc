//! Directive stream decoding.
//!
//! Assistant replies embed bracketed `[NAME]...[/NAME]` directives in the
//! token stream. [`DirectiveDecoder`] re-scans the accumulated text on each
//! chunk, emits every closed directive exactly once, and produces display
//! text with all directive markup removed.

mod decoder;
mod display;
mod payload;
mod tags;

pub use decoder::{DecodeUpdate, DirectiveDecoder, DisplayUpdate, Finalized};
pub use payload::is_hallucinated_tool;
pub use tags::DirectiveTag;

use serde::{Deserialize, Serialize};

/// One structured event decoded from a closed directive tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectiveEvent {
    CommandSuggestion(CommandSuggestion),
    FollowUpSuggestions { items: Vec<FollowUp> },
    FileOpen { path: String },
    ChangesetRef { id: String },
    ProgressUpdate { payload: serde_json::Value },
    ReasoningStep(ReasoningStep),
}

impl DirectiveEvent {
    /// Tag that produced this event.
    pub fn tag(&self) -> DirectiveTag {
        match self {
            Self::CommandSuggestion(_) => DirectiveTag::CmdCard,
            Self::FollowUpSuggestions { .. } => DirectiveTag::Suggestions,
            Self::FileOpen { .. } => DirectiveTag::FileOpen,
            Self::ChangesetRef { .. } => DirectiveTag::ChangesetId,
            Self::ProgressUpdate { .. } => DirectiveTag::Progress,
            Self::ReasoningStep(_) => DirectiveTag::Reasoning,
        }
    }
}

/// A single shell command the assistant proposes to run on a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSuggestion {
    pub server: String,
    pub command: String,
    pub explanation: String,
}

/// One follow-up prompt offered to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub text: String,
}

/// A visible planning/reasoning milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}
