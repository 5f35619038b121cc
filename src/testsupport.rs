//! Shared test fixtures: fake terminals and exec services, temp dirs, SSE
//! blocks.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::channel::remote::{ExecResponse, InputResponse};
use crate::channel::{RemoteExecService, ScrollbackTerminal};
use crate::error::{ApiError, ChannelError};
use crate::stream::{ChunkedTurnStream, StreamEvent, TurnRequest, TurnSource, TurnStream};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("opsdesk-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Write UTF-8 text to a child path, creating parent directories as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.child(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// One SSE block carrying a JSON `data:` line.
pub fn sse_data_block(data: &str) -> String {
    format!("data: {data}\n\n")
}

/// SSE block with an explicit `event:` name.
pub fn sse_event_block(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

pub fn sse_done_block() -> &'static str {
    "data: [DONE]\n\n"
}

#[derive(Debug, Clone)]
enum Reply {
    Complete(Vec<String>),
    Hang(Vec<String>),
}

#[derive(Debug, Default)]
struct TerminalState {
    connected: bool,
    prompt: String,
    lines: Vec<String>,
    writes: Vec<String>,
    replies: HashMap<String, Reply>,
    fail_reads: bool,
}

/// In-memory shell: writing a command echoes it after the prompt, then
/// prints the scripted output and (unless hung) a fresh prompt.
#[derive(Debug, Clone, Default)]
pub struct MemoryTerminal {
    state: Arc<Mutex<TerminalState>>,
}

fn split_output(output: &str) -> Vec<String> {
    if output.is_empty() {
        Vec::new()
    } else {
        output.lines().map(str::to_string).collect()
    }
}

impl MemoryTerminal {
    pub fn new(prompt: &str) -> Self {
        let state = TerminalState {
            connected: true,
            prompt: prompt.to_string(),
            lines: vec![prompt.to_string()],
            ..TerminalState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// `command` completes immediately with `output`.
    pub fn reply(&self, command: &str, output: &str) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert(command.to_string(), Reply::Complete(split_output(output)));
    }

    /// `command` prints `output` and never returns to the prompt.
    pub fn hang(&self, command: &str, output: &str) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert(command.to_string(), Reply::Hang(split_output(output)));
    }

    pub fn push_lines(&self, lines: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.lines.extend(lines.iter().map(|line| line.to_string()));
    }

    pub fn print_prompt(&self) {
        let mut state = self.state.lock().unwrap();
        let prompt = state.prompt.clone();
        state.lines.push(prompt);
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().unwrap().connected = connected;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }
}

#[async_trait]
impl ScrollbackTerminal for MemoryTerminal {
    async fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn write(&self, data: &str) -> Result<(), ChannelError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(data.to_string());
        let command = data.trim_end_matches('\n').to_string();
        match state.lines.last_mut() {
            Some(last) => last.push_str(&command),
            None => state.lines.push(command.clone()),
        }
        let reply = state
            .replies
            .get(&command)
            .cloned()
            .unwrap_or(Reply::Complete(Vec::new()));
        match reply {
            Reply::Complete(output) => {
                state.lines.extend(output);
                let prompt = state.prompt.clone();
                state.lines.push(prompt);
            }
            Reply::Hang(output) => state.lines.extend(output),
        }
        Ok(())
    }

    async fn lines(&self) -> Result<Vec<String>, ChannelError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(ChannelError::Transport("pane went away".into()));
        }
        let mut lines = state.lines.clone();
        lines.push(String::new());
        Ok(lines)
    }
}

#[derive(Debug, Default)]
struct ExecScript {
    connected: bool,
    exec_delay: Option<Duration>,
    execs: VecDeque<Result<ExecResponse, ChannelError>>,
    inputs: VecDeque<Result<InputResponse, ChannelError>>,
    exec_calls: Vec<(String, String)>,
    sent_inputs: Vec<(String, String)>,
}

/// Remote exec service replaying queued responses.
///
/// With nothing queued, `exec` completes with empty output and exit 0.
#[derive(Debug, Clone)]
pub struct ScriptedExecService {
    script: Arc<Mutex<ExecScript>>,
}

impl Default for ScriptedExecService {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecService {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(ExecScript {
                connected: true,
                ..ExecScript::default()
            })),
        }
    }

    pub fn push_exec(&self, response: Result<ExecResponse, ChannelError>) {
        self.script.lock().unwrap().execs.push_back(response);
    }

    pub fn push_input(&self, response: Result<InputResponse, ChannelError>) {
        self.script.lock().unwrap().inputs.push_back(response);
    }

    pub fn set_connected(&self, connected: bool) {
        self.script.lock().unwrap().connected = connected;
    }

    pub fn set_exec_delay(&self, delay: Duration) {
        self.script.lock().unwrap().exec_delay = Some(delay);
    }

    pub fn exec_calls(&self) -> Vec<(String, String)> {
        self.script.lock().unwrap().exec_calls.clone()
    }

    pub fn inputs(&self) -> Vec<(String, String)> {
        self.script.lock().unwrap().sent_inputs.clone()
    }
}

#[async_trait]
impl RemoteExecService for ScriptedExecService {
    async fn is_connected(&self) -> bool {
        self.script.lock().unwrap().connected
    }

    async fn exec(
        &self,
        target: &str,
        command: &str,
        _timeout: Duration,
    ) -> Result<ExecResponse, ChannelError> {
        let delay = {
            let mut script = self.script.lock().unwrap();
            script
                .exec_calls
                .push((target.to_string(), command.to_string()));
            script.exec_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .execs
            .pop_front()
            .unwrap_or(Ok(ExecResponse::Completed {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
            }))
    }

    async fn send_input(
        &self,
        process_id: &str,
        text: &str,
    ) -> Result<InputResponse, ChannelError> {
        let mut script = self.script.lock().unwrap();
        script
            .sent_inputs
            .push((process_id.to_string(), text.to_string()));
        script.inputs.pop_front().unwrap_or(Ok(InputResponse {
            completed: true,
            output: String::new(),
            exit_code: Some(0),
        }))
    }
}

/// Build one SSE body: a `chunk` record per piece, then `[DONE]`.
pub fn sse_reply(pieces: &[&str]) -> String {
    let mut body = String::new();
    for piece in pieces {
        let record = serde_json::json!({"type": "chunk", "text": piece});
        body.push_str(&sse_data_block(&record.to_string()));
    }
    body.push_str(sse_done_block());
    body
}

#[derive(Debug)]
enum ScriptedTurn {
    Chunks(Vec<String>),
    /// Replays the chunks, then never finishes.
    Stall(Vec<String>),
    Fail(u16, String),
}

#[derive(Debug, Default)]
struct AssistantScript {
    turns: VecDeque<ScriptedTurn>,
    requests: Vec<TurnRequest>,
}

/// Assistant replaying queued SSE bodies, one per turn.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAssistant {
    script: Arc<Mutex<AssistantScript>>,
}

impl ScriptedAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a turn delivered as the given raw byte chunks.
    pub fn push_turn(&self, chunks: &[&str]) {
        let chunks = chunks.iter().map(|c| c.to_string()).collect();
        self.script
            .lock()
            .unwrap()
            .turns
            .push_back(ScriptedTurn::Chunks(chunks));
    }

    pub fn push_stalled_turn(&self, chunks: &[&str]) {
        let chunks = chunks.iter().map(|c| c.to_string()).collect();
        self.script
            .lock()
            .unwrap()
            .turns
            .push_back(ScriptedTurn::Stall(chunks));
    }

    pub fn push_failure(&self, status: u16, body: &str) {
        self.script
            .lock()
            .unwrap()
            .turns
            .push_back(ScriptedTurn::Fail(status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.script.lock().unwrap().requests.clone()
    }
}

struct StalledTurnStream {
    inner: ChunkedTurnStream,
}

#[async_trait]
impl TurnStream for StalledTurnStream {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, ApiError> {
        match self.inner.next_event().await? {
            Some(event) => Ok(Some(event)),
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl TurnSource for ScriptedAssistant {
    async fn open_turn(&self, request: &TurnRequest) -> Result<Box<dyn TurnStream>, ApiError> {
        let turn = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request.clone());
            script.turns.pop_front()
        };
        match turn {
            Some(ScriptedTurn::Chunks(chunks)) => Ok(Box::new(ChunkedTurnStream::new(chunks))),
            Some(ScriptedTurn::Stall(chunks)) => Ok(Box::new(StalledTurnStream {
                inner: ChunkedTurnStream::new(chunks),
            })),
            Some(ScriptedTurn::Fail(status, body)) => Err(ApiError::Status(status, body)),
            None => Err(ApiError::Status(500, "no scripted turn".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_fixture_writes_and_resolves_paths() {
        let fixture = TestTempDir::new("fixture");
        let file = fixture.write_text("nested/file.txt", "hello");
        assert_eq!(fs::read_to_string(file).unwrap(), "hello");
    }

    #[test]
    fn sse_helpers_emit_expected_wire_format() {
        let block = sse_event_block("message", r#"{"type":"done"}"#);
        assert!(block.starts_with("event: message\n"));
        assert!(block.ends_with("\n\n"));
        assert_eq!(sse_data_block("x"), "data: x\n\n");
        assert_eq!(sse_done_block(), "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn memory_terminal_echoes_and_prompts() {
        let term = MemoryTerminal::new("$ ");
        term.reply("whoami", "root");
        term.write("whoami\n").await.unwrap();
        let lines = term.lines().await.unwrap();
        assert_eq!(lines, vec!["$ whoami", "root", "$ ", ""]);
    }
}
