//! Tmux pane as a scrollback terminal, locally or over an ssh control socket.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::ChannelError;

use super::process::{ensure_success, run_sh_process, run_ssh_raw_process, shell_quote, ExecOutput};
use super::scrollback::ScrollbackTerminal;

/// How tmux commands reach the pane's host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TmuxTransport {
    Local,
    Ssh {
        target: String,
        control_path: PathBuf,
    },
}

/// One tmux pane addressed by id (`%3`) or target (`session:window.pane`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxTerminal {
    pane: String,
    transport: TmuxTransport,
}

impl TmuxTerminal {
    pub fn local(pane: impl Into<String>) -> Self {
        Self {
            pane: pane.into(),
            transport: TmuxTransport::Local,
        }
    }

    pub fn ssh(pane: impl Into<String>, target: impl Into<String>, control_path: PathBuf) -> Self {
        Self {
            pane: pane.into(),
            transport: TmuxTransport::Ssh {
                target: target.into(),
                control_path,
            },
        }
    }

    pub fn pane(&self) -> &str {
        &self.pane
    }

    async fn tmux(&self, command: &str) -> Result<ExecOutput, ChannelError> {
        match &self.transport {
            TmuxTransport::Local => run_sh_process(command).await,
            TmuxTransport::Ssh {
                target,
                control_path,
            } => run_ssh_raw_process(target, control_path, command).await,
        }
    }
}

/// `tmux capture-pane` over the full history with wrapped lines joined.
pub(crate) fn build_capture_pane_command(pane: &str) -> String {
    format!("tmux capture-pane -p -J -S - -E - -t {}", shell_quote(pane))
}

pub(crate) fn build_send_text_command(pane: &str, text: &str) -> String {
    format!(
        "tmux send-keys -l -t {} {}",
        shell_quote(pane),
        shell_quote(text)
    )
}

pub(crate) fn build_send_enter_command(pane: &str) -> String {
    format!("tmux send-keys -t {} Enter", shell_quote(pane))
}

fn build_probe_command(pane: &str) -> String {
    format!(
        "tmux display-message -p -t {} '#{{pane_id}}'",
        shell_quote(pane)
    )
}

#[async_trait]
impl ScrollbackTerminal for TmuxTerminal {
    async fn is_connected(&self) -> bool {
        match self.tmux(&build_probe_command(&self.pane)).await {
            Ok(out) => out.exit_code == 0,
            Err(_) => false,
        }
    }

    async fn write(&self, data: &str) -> Result<(), ChannelError> {
        // Each newline becomes an Enter key press.
        let mut segments = data.split('\n').peekable();
        while let Some(segment) = segments.next() {
            if !segment.is_empty() {
                let sent = self.tmux(&build_send_text_command(&self.pane, segment)).await?;
                ensure_success(sent, "failed to send keys to tmux pane")?;
            }
            if segments.peek().is_some() {
                let enter = self.tmux(&build_send_enter_command(&self.pane)).await?;
                ensure_success(enter, "failed to send Enter to tmux pane")?;
            }
        }
        Ok(())
    }

    async fn lines(&self) -> Result<Vec<String>, ChannelError> {
        let capture = self.tmux(&build_capture_pane_command(&self.pane)).await?;
        let out = ensure_success(capture, "failed to capture tmux pane")?;
        Ok(out.stdout.lines().map(str::to_string).collect())
    }
}
