//! End-to-end console flow over in-process fakes: a scripted assistant
//! stream and a scripted remote exec service.

use async_trait::async_trait;
use opsdesk::channel::remote::{ExecResponse, InputResponse};
use opsdesk::channel::{RemoteExecChannel, RemoteExecService, RunOutcome};
use opsdesk::config::Config;
use opsdesk::console::Console;
use opsdesk::error::{ApiError, ChannelError};
use opsdesk::events::{drain, ConsoleEvent, EventSink, QueueEvent, ReplyEvent};
use opsdesk::outbound::{MessageOrigin, OutboundMessage};
use opsdesk::queue::{ItemStatus, QueueId, RenderedCard, RenderedCards};
use opsdesk::stream::{ChunkedTurnStream, TurnRequest, TurnSource, TurnStream};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Assistant {
    turns: Arc<Mutex<VecDeque<String>>>,
    seen: Arc<Mutex<Vec<TurnRequest>>>,
}

impl Assistant {
    fn reply(&self, records: &[serde_json::Value]) {
        let mut body = String::new();
        for record in records {
            body.push_str(&format!("data: {record}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        self.turns.lock().unwrap().push_back(body);
    }
}

#[async_trait]
impl TurnSource for Assistant {
    async fn open_turn(&self, request: &TurnRequest) -> Result<Box<dyn TurnStream>, ApiError> {
        self.seen.lock().unwrap().push(request.clone());
        let body = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::Status(500, "no reply scripted".into()))?;
        // Deliver in small pieces so tags straddle chunk boundaries.
        let chunks = body
            .as_bytes()
            .chunks(7)
            .map(|c| c.to_vec())
            .collect::<Vec<_>>();
        Ok(Box::new(ChunkedTurnStream::new(chunks)))
    }
}

#[derive(Clone, Default)]
struct ExecService {
    replies: Arc<Mutex<VecDeque<ExecResponse>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl RemoteExecService for ExecService {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn exec(
        &self,
        target: &str,
        command: &str,
        _timeout: Duration,
    ) -> Result<ExecResponse, ChannelError> {
        self.calls
            .lock()
            .unwrap()
            .push((target.to_string(), command.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChannelError::Transport("no exec reply scripted".into()))
    }

    async fn send_input(
        &self,
        _process_id: &str,
        text: &str,
    ) -> Result<InputResponse, ChannelError> {
        Ok(InputResponse {
            completed: true,
            output: format!("got {text}"),
            exit_code: Some(0),
        })
    }
}

struct Screen(Vec<RenderedCard>);

impl RenderedCards for Screen {
    fn cards_for(&self, _queue_id: &QueueId) -> Vec<RenderedCard> {
        self.0.clone()
    }
}

fn chunk(text: &str) -> serde_json::Value {
    serde_json::json!({"type": "chunk", "text": text})
}

fn console() -> (
    Console,
    Assistant,
    ExecService,
    tokio::sync::mpsc::UnboundedReceiver<opsdesk::events::ConsoleEventEnvelope>,
) {
    let assistant = Assistant::default();
    let exec = ExecService::default();
    let channel = RemoteExecChannel::new(exec.clone(), Duration::from_secs(5));
    let (sink, rx) = EventSink::channel();
    let console = Console::new(
        Arc::new(assistant.clone()),
        Arc::new(channel),
        sink,
        &Config::default(),
    );
    (console, assistant, exec, rx)
}

#[tokio::test]
async fn batch_of_two_reports_back_once_and_resumes_the_conversation() {
    let (mut console, assistant, exec, mut rx) = console();
    assistant.reply(&[
        serde_json::json!({"type": "session", "session_id": "conv-42"}),
        chunk("Memory looks tight.\n[CMD_CARD]{\"command\":\"free -m\",\"server\":\"app-2\"}[/CMD_CARD]\n"),
        chunk("[CMD_CARD]{\"command\":\"dmesg | tail\",\"server\":\"app-2\"}[/CMD_CARD]"),
    ]);
    assistant.reply(&[chunk("The OOM killer fired; raise the limit.")]);
    exec.replies.lock().unwrap().push_back(ExecResponse::Completed {
        stdout: "Mem: 7972 7801 171".into(),
        stderr: String::new(),
        exit_code: Some(0),
    });

    let turn = console
        .run_turn(&OutboundMessage::operator("app-2 keeps restarting"))
        .await
        .expect("first turn");
    assert_eq!(turn.display_text, "Memory looks tight.");
    let queue_id = turn.queue_id.expect("batch");
    assert_eq!(console.queue().queue(&queue_id).unwrap().items.len(), 2);

    let outcome = console.queue_mut().execute(&queue_id, 1).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Finished(_)));
    assert!(console.next_outbound().is_none(), "batch not settled yet");

    console.queue_mut().skip(&queue_id, 2).unwrap();
    let report = console.next_outbound().expect("aggregated report");
    assert_eq!(
        report.origin,
        MessageOrigin::QueueReport {
            queue_id: queue_id.clone()
        }
    );
    assert!(report.text.contains("✓ `free -m` on app-2"));
    assert!(report.text.contains("⊘ `dmesg | tail` on app-2"));
    assert!(!console.queue_mut().maybe_auto_continue(&queue_id));

    let follow = console.run_turn(&report).await.expect("second turn");
    assert_eq!(follow.display_text, "The OOM killer fired; raise the limit.");
    assert_eq!(follow.queue_id, None);

    let seen = assistant.seen.lock().unwrap().clone();
    assert_eq!(seen[0].session_id, None);
    assert_eq!(seen[1].session_id.as_deref(), Some("conv-42"));
    assert_eq!(
        exec.calls.lock().unwrap().clone(),
        vec![("app-2".to_string(), "free -m".to_string())]
    );

    let events = drain(&mut rx);
    let auto = events
        .iter()
        .filter(|e| matches!(e, ConsoleEvent::Queue(QueueEvent::AutoContinued { .. })))
        .count();
    assert_eq!(auto, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, ConsoleEvent::Reply(ReplyEvent::Finished { .. }))));
}

#[tokio::test]
async fn transport_failure_is_folded_into_the_report() {
    let (mut console, assistant, _exec, _rx) = console();
    assistant.reply(&[chunk(
        "[CMD_CARD]{\"command\":\"systemctl status nginx\",\"server\":\"web-3\"}[/CMD_CARD]",
    )]);
    let queue_id = console
        .run_turn(&OutboundMessage::operator("502s"))
        .await
        .unwrap()
        .queue_id
        .unwrap();

    // Nothing scripted: the service fails the call.
    let outcome = console.queue_mut().execute(&queue_id, 1).await.unwrap();
    let RunOutcome::Finished(result) = outcome else {
        panic!("expected finished outcome");
    };
    assert_eq!(result.exit_code, Some(-1));

    let report = console.next_outbound().unwrap();
    assert!(report.text.contains("✗ `systemctl status nginx` on web-3 (exit -1)"));
    assert!(report.text.contains("[execution failed]"));
}

#[tokio::test]
async fn lost_batch_is_rebuilt_from_the_screen() {
    let (mut console, _assistant, _exec, _rx) = console();
    let queue_id = QueueId::from("q7");
    let screen = Screen(vec![
        RenderedCard {
            command: "uptime".into(),
            server: "db-1".into(),
            status_label: "executed".into(),
            output: Some("up 12 days".into()),
        },
        RenderedCard {
            command: "iostat".into(),
            server: "db-1".into(),
            status_label: "skipped".into(),
            output: None,
        },
    ]);

    assert!(console
        .queue_mut()
        .reconstruct_from_display(&queue_id, &screen)
        .unwrap());
    let queue = console.queue().queue(&queue_id).unwrap();
    assert_eq!(queue.items[1].status, ItemStatus::Skipped);

    let report = console.next_outbound().expect("settled batch reports");
    assert!(report.text.contains("up 12 days"));
    assert!(!console
        .queue_mut()
        .reconstruct_from_display(&queue_id, &screen)
        .unwrap());
}
