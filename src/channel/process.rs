//! Subprocess helpers for the tmux terminal (local shell or ssh).

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::ChannelError;

/// Structured process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExecOutput {
    pub(crate) exit_code: i32,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

/// Run a local shell command.
pub(crate) async fn run_sh_process(command: &str) -> Result<ExecOutput, ChannelError> {
    run_process("sh", &["-c".into(), command.into()]).await
}

/// Run a raw ssh command over an existing control socket.
pub(crate) async fn run_ssh_raw_process(
    target: &str,
    control_path: &Path,
    remote_command: &str,
) -> Result<ExecOutput, ChannelError> {
    run_process(
        "ssh",
        &[
            "-T".into(),
            "-S".into(),
            control_path.display().to_string(),
            "-o".into(),
            "ControlMaster=no".into(),
            target.into(),
            remote_command.into(),
        ],
    )
    .await
}

async fn run_process(program: &str, args: &[String]) -> Result<ExecOutput, ChannelError> {
    let mut cmd = Command::new(program);
    // A dropped run future (cancelled select arm) must not leak the child.
    cmd.kill_on_drop(true);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .map_err(|e| ChannelError::Transport(format!("{program}: {e}")))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Convert a non-zero exit into a contextual transport error.
pub(crate) fn ensure_success(output: ExecOutput, context: &str) -> Result<ExecOutput, ChannelError> {
    if output.exit_code == 0 {
        return Ok(output);
    }

    let mut details = if output.stderr.trim().is_empty() {
        output.stdout.trim().to_string()
    } else {
        output.stderr.trim().to_string()
    };
    if details.is_empty() {
        details = format!("command exited with {}", output.exit_code);
    }

    Err(ChannelError::Transport(format!("{context}: {details}")))
}

/// Shell-safe single-quote escaping.
pub(crate) fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".into()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}
