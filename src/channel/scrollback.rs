//! Scrollback channel: type into a terminal, watch for the prompt.

use async_trait::async_trait;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use crate::config::ScrollbackConfig;
use crate::error::ChannelError;

use super::prompt::{completed_output, content_len, partial_output};
use super::{
    CancelFlag, CaptureCursor, ChannelKind, ExecutionChannel, ExecutionResult, InputReply,
    InteractiveProcess, RunOutcome,
};

/// Minimal view of an interactive terminal with a readable buffer.
#[async_trait]
pub trait ScrollbackTerminal: Send + Sync {
    async fn is_connected(&self) -> bool;
    /// Write raw text, as if typed.
    async fn write(&self, data: &str) -> Result<(), ChannelError>;
    /// Full buffer, one entry per line.
    async fn lines(&self) -> Result<Vec<String>, ChannelError>;
}

/// [`ExecutionChannel`] over a [`ScrollbackTerminal`].
pub struct ScrollbackChannel<T> {
    terminal: T,
    poll_interval: Duration,
    timeout: Duration,
    prompt_suffixes: Vec<String>,
}

impl<T: ScrollbackTerminal> ScrollbackChannel<T> {
    pub fn new(terminal: T, config: &ScrollbackConfig) -> Self {
        Self {
            terminal,
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
            prompt_suffixes: config.prompt_suffixes.clone(),
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    async fn ensure_connected(&self, target: &str) -> Result<(), ChannelError> {
        if self.terminal.is_connected().await {
            Ok(())
        } else {
            Err(ChannelError::NotConnected(target.to_string()))
        }
    }

    async fn poll_until_prompt(
        &self,
        command: &str,
        target: &str,
        start: usize,
        cancel: &CancelFlag,
    ) -> RunOutcome {
        let started_at = Instant::now();
        loop {
            sleep(self.poll_interval).await;
            // Checked first so a cancel seen in the same tick as the
            // deadline resolves as a cancel.
            if cancel.is_cancelled() {
                debug!(target, "scrollback run cancelled");
                return RunOutcome::Cancelled;
            }
            let lines = match self.terminal.lines().await {
                Ok(lines) => lines,
                Err(err) => return RunOutcome::Finished(ExecutionResult::transport_failure(&err)),
            };
            if let Some(output) = completed_output(&lines, start, command, &self.prompt_suffixes) {
                return RunOutcome::Finished(ExecutionResult::completed(output, 0));
            }
            if started_at.elapsed() >= self.timeout {
                warn!(
                    target,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "no prompt seen; leaving command for manual capture"
                );
                return RunOutcome::TimedOut {
                    partial: ExecutionResult {
                        output: partial_output(&lines, start, command),
                        exit_code: None,
                        timed_out: true,
                    },
                    resume: CaptureCursor {
                        target: target.to_string(),
                        command: command.to_string(),
                        start_line: start,
                    },
                };
            }
        }
    }
}

#[async_trait]
impl<T: ScrollbackTerminal> ExecutionChannel for ScrollbackChannel<T> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Scrollback
    }

    async fn is_connected(&self) -> bool {
        self.terminal.is_connected().await
    }

    async fn run(
        &self,
        command: &str,
        target: &str,
        cancel: &CancelFlag,
    ) -> Result<RunOutcome, ChannelError> {
        self.ensure_connected(target).await?;

        let start = match self.terminal.lines().await {
            Ok(lines) => content_len(&lines),
            Err(err) => return Ok(RunOutcome::Finished(ExecutionResult::transport_failure(&err))),
        };
        if let Err(err) = self.terminal.write(&format!("{command}\n")).await {
            return Ok(RunOutcome::Finished(ExecutionResult::transport_failure(&err)));
        }
        debug!(target, start, "command written to scrollback");

        Ok(self.poll_until_prompt(command, target, start, cancel).await)
    }

    async fn capture_now(&self, cursor: &CaptureCursor) -> Result<ExecutionResult, ChannelError> {
        self.ensure_connected(&cursor.target).await?;
        let lines = match self.terminal.lines().await {
            Ok(lines) => lines,
            Err(err) => return Ok(ExecutionResult::transport_failure(&err)),
        };
        let result = match completed_output(
            &lines,
            cursor.start_line,
            &cursor.command,
            &self.prompt_suffixes,
        ) {
            Some(output) => ExecutionResult::completed(output, 0),
            None => ExecutionResult {
                output: partial_output(&lines, cursor.start_line, &cursor.command),
                exit_code: None,
                timed_out: false,
            },
        };
        Ok(result)
    }

    async fn send_input(
        &self,
        _process: &InteractiveProcess,
        _text: &str,
    ) -> Result<InputReply, ChannelError> {
        Err(ChannelError::Unsupported("send_input"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::MemoryTerminal;

    fn channel(terminal: MemoryTerminal) -> ScrollbackChannel<MemoryTerminal> {
        ScrollbackChannel::new(terminal, &ScrollbackConfig::default())
            .with_timing(Duration::from_millis(2), Duration::from_millis(40))
    }

    #[tokio::test]
    async fn run_returns_output_between_cursor_and_prompt() {
        let terminal = MemoryTerminal::new("web-1$ ");
        terminal.reply("uptime", "up 3 days, load 0.1");
        let chan = channel(terminal.clone());

        let outcome = chan.run("uptime", "web-1", &CancelFlag::new()).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Finished(ExecutionResult::completed("up 3 days, load 0.1", 0))
        );
        assert_eq!(terminal.writes(), vec!["uptime\n".to_string()]);
    }

    #[tokio::test]
    async fn run_times_out_then_capture_now_resumes() {
        let terminal = MemoryTerminal::new("web-1$ ");
        terminal.hang("tail -n 5 app.log", "line 1");
        let chan = channel(terminal.clone());

        let outcome = chan
            .run("tail -n 5 app.log", "web-1", &CancelFlag::new())
            .await
            .unwrap();
        let RunOutcome::TimedOut { partial, resume } = outcome else {
            panic!("expected timeout, got {outcome:?}");
        };
        assert!(partial.timed_out);
        assert_eq!(partial.exit_code, None);
        assert_eq!(partial.output, "line 1");

        let still_running = chan.capture_now(&resume).await.unwrap();
        assert_eq!(still_running.exit_code, None);
        assert!(!still_running.timed_out);

        terminal.push_lines(&["line 2"]);
        terminal.print_prompt();
        let done = chan.capture_now(&resume).await.unwrap();
        assert_eq!(done, ExecutionResult::completed("line 1\nline 2", 0));
    }

    #[tokio::test]
    async fn cancel_wins_over_timeout_in_same_tick() {
        let terminal = MemoryTerminal::new("web-1$ ");
        terminal.hang("sleep 100", "");
        let chan = ScrollbackChannel::new(terminal, &ScrollbackConfig::default())
            .with_timing(Duration::from_millis(5), Duration::from_millis(1));
        let cancel = CancelFlag::new();
        cancel.cancel();

        let outcome = chan.run("sleep 100", "web-1", &cancel).await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
    }

    #[tokio::test]
    async fn cancel_during_poll_stops_run() {
        let terminal = MemoryTerminal::new("web-1$ ");
        terminal.hang("top", "");
        let chan = ScrollbackChannel::new(terminal, &ScrollbackConfig::default())
            .with_timing(Duration::from_millis(2), Duration::from_secs(5));
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let outcome = chan.run("top", "web-1", &cancel).await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
    }

    #[tokio::test]
    async fn disconnected_terminal_is_an_error() {
        let terminal = MemoryTerminal::new("web-1$ ");
        terminal.set_connected(false);
        let chan = channel(terminal.clone());

        let err = chan.run("ls", "web-1", &CancelFlag::new()).await.unwrap_err();
        assert_eq!(err, ChannelError::NotConnected("web-1".into()));
        assert!(terminal.writes().is_empty());
    }

    #[tokio::test]
    async fn read_failure_becomes_failed_result() {
        let terminal = MemoryTerminal::new("web-1$ ");
        terminal.fail_reads(true);
        let chan = channel(terminal);

        let outcome = chan.run("ls", "web-1", &CancelFlag::new()).await.unwrap();
        let RunOutcome::Finished(result) = outcome else {
            panic!("expected finished result");
        };
        assert_eq!(result.exit_code, Some(-1));
        assert!(result.output.starts_with("[execution failed]"));
    }

    #[tokio::test]
    async fn send_input_is_unsupported() {
        let chan = channel(MemoryTerminal::new("$ "));
        let process = InteractiveProcess {
            process_id: "p".into(),
            target: "t".into(),
            output: String::new(),
        };
        assert_eq!(
            chan.send_input(&process, "y").await.unwrap_err(),
            ChannelError::Unsupported("send_input")
        );
    }
}
