//! Supervised-autonomy agent sessions.
//!
//! A remote planner issues numbered steps. Command steps run through the
//! execution channel after operator approval (or immediately when the session
//! auto-approves); their results go back to the planner. `Complete` and
//! `Failed` steps end the session.

mod machine;

pub use machine::{AgentSessionMachine, StopHandle};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Command,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Executed,
    Rejected,
    Failed,
}

/// One planner-issued step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStep {
    #[serde(default)]
    pub id: String,
    pub step_number: u32,
    pub step_type: StepType,
    /// The command for `Command` steps, a summary otherwise.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default = "pending_status")]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

fn pending_status() -> StepStatus {
    StepStatus::Pending
}

impl AgentStep {
    pub fn new(step_number: u32, step_type: StepType, content: impl Into<String>) -> Self {
        Self {
            id: format!("step-{step_number}"),
            step_number,
            step_type,
            content: content.into(),
            reasoning: None,
            status: StepStatus::Pending,
            output: None,
            exit_code: None,
        }
    }

    pub fn command(step_number: u32, command: impl Into<String>) -> Self {
        Self::new(step_number, StepType::Command, command)
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.status != StepStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Thinking,
    AwaitingApproval,
    Executing,
    /// The step's remote process blocked on a prompt and needs operator input.
    AwaitingInput,
    Completed,
    Failed,
    Stopped,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::AwaitingApproval => "awaiting approval",
            Self::Executing => "executing",
            Self::AwaitingInput => "awaiting input",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot of one autonomy session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSession {
    pub id: String,
    pub target: String,
    pub status: SessionStatus,
    pub steps: Vec<AgentStep>,
    pub auto_approve: bool,
}

impl AgentSession {
    pub fn new(id: impl Into<String>, target: impl Into<String>, auto_approve: bool) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            status: SessionStatus::Thinking,
            steps: Vec::new(),
            auto_approve,
        }
    }

    pub fn last_step(&self) -> Option<&AgentStep> {
        self.steps.last()
    }
}

/// Messages for the remote planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlannerMessage {
    StepResult {
        session_id: String,
        step_number: u32,
        output: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        timed_out: bool,
    },
    StepRejected {
        session_id: String,
        step_number: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_deserializes_with_defaults() {
        let step: AgentStep = serde_json::from_str(
            r#"{"step_number":2,"step_type":"command","content":"systemctl status nginx"}"#,
        )
        .unwrap();
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.id, "");
        assert!(!step.is_resolved());
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Stopped.is_terminal());
        assert!(!SessionStatus::Executing.is_terminal());
        assert_eq!(SessionStatus::AwaitingApproval.to_string(), "awaiting approval");
    }

    #[test]
    fn planner_messages_are_tagged() {
        let msg = PlannerMessage::StepRejected {
            session_id: "s1".into(),
            step_number: 3,
            reason: None,
        };
        let raw = serde_json::to_value(&msg).unwrap();
        assert_eq!(raw["type"], "step_rejected");
        assert!(raw.get("reason").is_none());
    }
}
