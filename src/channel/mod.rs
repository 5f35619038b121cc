//! Execution channels: run one shell command against a target.
//!
//! Two backends share the [`ExecutionChannel`] trait. The scrollback channel
//! types into a terminal and infers completion from the prompt; the
//! remote-exec channel asks a service to run the command and can hand back an
//! interactive process when the service-side timeout hits first.

mod cancel;
mod process;
mod prompt;
pub mod remote;
pub mod scrollback;
pub mod tmux;

pub use cancel::{wait_for_cancellation, CancelFlag};
pub use remote::{HttpExecService, RemoteExecChannel, RemoteExecService};
pub use scrollback::{ScrollbackChannel, ScrollbackTerminal};
pub use tmux::{TmuxTerminal, TmuxTransport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Output prefix for runs that broke down in transport.
pub const EXECUTION_FAILED_PREFIX: &str = "[execution failed]";

/// Result of one command run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: String,
    /// `None` when completion could not be observed.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn completed(output: impl Into<String>, exit_code: i32) -> Self {
        Self {
            output: output.into(),
            exit_code: Some(exit_code),
            timed_out: false,
        }
    }

    /// Fold a transport error into a reportable result.
    pub fn transport_failure(err: &ChannelError) -> Self {
        Self {
            output: format!("{EXECUTION_FAILED_PREFIX} {err}"),
            exit_code: Some(-1),
            timed_out: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Where a timed-out scrollback run can be resumed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCursor {
    pub target: String,
    pub command: String,
    /// Content line count before the command was written.
    pub start_line: usize,
}

/// A remote process still waiting for input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractiveProcess {
    pub process_id: String,
    pub target: String,
    /// Output produced before the process blocked.
    pub output: String,
}

/// Reply to one line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputReply {
    pub completed: bool,
    pub output: String,
    pub exit_code: Option<i32>,
}

impl InputReply {
    pub fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            output: self.output,
            exit_code: self.exit_code,
            timed_out: false,
        }
    }
}

/// The ways one run can end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Finished(ExecutionResult),
    /// Bound exceeded without a prompt; `resume` allows a later manual capture.
    TimedOut {
        partial: ExecutionResult,
        resume: CaptureCursor,
    },
    /// The cancel flag was observed; nothing should be reported.
    Cancelled,
    Interactive(InteractiveProcess),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Scrollback,
    RemoteExec,
}

/// Uniform execution seam over the scrollback and remote-exec backends.
///
/// Implementations keep no per-call state; callers serialize runs.
#[async_trait]
pub trait ExecutionChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn is_connected(&self) -> bool;

    /// Run `command` on `target`, observing `cancel` while waiting.
    async fn run(
        &self,
        command: &str,
        target: &str,
        cancel: &CancelFlag,
    ) -> Result<RunOutcome, ChannelError>;

    /// Capture whatever a timed-out run has printed so far.
    async fn capture_now(&self, cursor: &CaptureCursor) -> Result<ExecutionResult, ChannelError>;

    /// Feed one line to an interactive process.
    async fn send_input(
        &self,
        process: &InteractiveProcess,
        text: &str,
    ) -> Result<InputReply, ChannelError>;
}
