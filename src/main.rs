//! CLI entry point for opsdesk.

mod cli;

use clap::Parser;
use opsdesk::agent::SessionStatus;
use opsdesk::channel::{
    CancelFlag, ExecutionChannel, ExecutionResult, RemoteExecChannel, RunOutcome,
    ScrollbackChannel, TmuxTerminal,
};
use opsdesk::config::{load_config, Config};
use opsdesk::console::Console;
use opsdesk::directive::DirectiveDecoder;
use opsdesk::error::{ApiError, ChannelError, QueueError};
use opsdesk::events::{ConsoleEventEnvelope, EventSink};
use opsdesk::queue::QueueId;
use opsdesk::render::{Renderer, Tone};
use opsdesk::session::SessionIdStore;
use opsdesk::stream::{ChunkedTurnStream, HttpAssistant, StreamEvent, TurnStream};
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

use cli::{Args, ChannelArgs, Command};

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    if args.no_color {
        config.display.color = false;
    }
    let renderer = Renderer::new(config.display.color);

    let result = match args.command {
        Command::Decode { file } => run_decode(file.as_deref(), &config).await,
        Command::Exec { channel, command } => {
            run_exec(&channel, &command, &config, renderer).await
        }
        Command::Chat {
            channel,
            agent,
            new_session,
            message,
        } => run_chat(&channel, agent, new_session, message, &config, renderer).await,
    };
    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            renderer.error(&e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr, filtered by `OPSDESK_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("OPSDESK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_channel(
    args: &ChannelArgs,
    config: &Config,
) -> Result<(Arc<dyn ExecutionChannel>, String), String> {
    if let Some(target) = &args.remote {
        let channel: Arc<dyn ExecutionChannel> =
            Arc::new(RemoteExecChannel::from_config(&config.exec));
        return Ok((channel, target.clone()));
    }
    let Some(pane) = &args.pane else {
        return Err("choose a channel with --pane <id> or --remote <target>".to_string());
    };
    let terminal = match &args.ssh {
        Some(host) => {
            let control_path = args
                .control_path
                .clone()
                .unwrap_or_else(|| default_control_path(host));
            TmuxTerminal::ssh(pane.as_str(), host.as_str(), control_path)
        }
        None => TmuxTerminal::local(pane.as_str()),
    };
    let channel: Arc<dyn ExecutionChannel> =
        Arc::new(ScrollbackChannel::new(terminal, &config.scrollback));
    Ok((channel, pane.clone()))
}

fn default_control_path(host: &str) -> PathBuf {
    let safe = host
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' { ch } else { '_' })
        .collect::<String>();
    std::env::temp_dir().join(format!("opsdesk-ssh-{safe}.sock"))
}

async fn run_decode(file: Option<&Path>, config: &Config) -> Result<i32, String> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            raw
        }
    };

    let mut decoder = DirectiveDecoder::from_config(&config.decoder);
    if raw.lines().any(|line| line.starts_with("data:")) {
        let mut stream = ChunkedTurnStream::new([raw.into_bytes()]);
        while let Some(event) = stream.next_event().await.map_err(|e| e.to_string())? {
            if let StreamEvent::Chunk { text } = event {
                decoder.feed(&text);
            }
        }
    } else {
        decoder.feed(&raw);
    }
    let full_text = decoder.buffer().to_string();
    let finalized = decoder.finalize(&full_text);
    let out = serde_json::json!({
        "display_text": finalized.display_text,
        "events": finalized.events,
    });
    let rendered = serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?;
    println!("{rendered}");
    Ok(0)
}

async fn run_exec(
    args: &ChannelArgs,
    command: &str,
    config: &Config,
    renderer: Renderer,
) -> Result<i32, String> {
    let (channel, target) = build_channel(args, config)?;
    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = channel
        .run(command, &target, &cancel)
        .await
        .map_err(|e| e.to_string())?;
    let result = match outcome {
        RunOutcome::Finished(result) => result,
        RunOutcome::TimedOut { partial, resume } => {
            renderer.warn("no prompt before the timeout; capturing what is on screen");
            match channel.capture_now(&resume).await {
                Ok(result) => result,
                Err(ChannelError::Unsupported(_)) => partial,
                Err(e) => return Err(e.to_string()),
            }
        }
        RunOutcome::Cancelled => {
            renderer.warn("cancelled");
            return Ok(130);
        }
        RunOutcome::Interactive(process) => {
            println!("{}", process.output);
            let mut input = Input::stdin();
            loop {
                let Some(line) = input.ask(renderer, "input").await? else {
                    return Ok(1);
                };
                let reply = channel
                    .send_input(&process, &line)
                    .await
                    .map_err(|e| e.to_string())?;
                if reply.completed {
                    break reply.into_result();
                }
                println!("{}", reply.output);
            }
        }
    };
    print_result(&result, renderer);
    Ok(match result.exit_code {
        Some(0) => 0,
        Some(code) if code > 0 => code,
        _ => 1,
    })
}

fn print_result(result: &ExecutionResult, renderer: Renderer) {
    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    let exit = result
        .exit_code
        .map(|code| format!("exit {code}"))
        .unwrap_or_else(|| "exit unknown".to_string());
    renderer.status(Tone::Muted, &exit);
}

/// Line reader over stdin.
struct Input {
    lines: Lines<BufReader<Stdin>>,
}

impl Input {
    fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// `None` at end of input.
    async fn ask(&mut self, renderer: Renderer, question: &str) -> Result<Option<String>, String> {
        renderer.prompt(question);
        self.lines
            .next_line()
            .await
            .map(|line| line.map(|l| l.trim().to_string()))
            .map_err(|e| format!("failed to read input: {e}"))
    }
}

/// Drive `fut` while rendering console events as they arrive.
async fn with_events<F: Future>(
    fut: F,
    rx: &mut UnboundedReceiver<ConsoleEventEnvelope>,
    renderer: Renderer,
) -> F::Output {
    tokio::pin!(fut);
    let output = loop {
        tokio::select! {
            output = &mut fut => break output,
            Some(envelope) = rx.recv() => renderer.event(&envelope.event),
        }
    };
    while let Ok(envelope) = rx.try_recv() {
        renderer.event(&envelope.event);
    }
    output
}

async fn run_chat(
    args: &ChannelArgs,
    agent_target: Option<String>,
    new_session: bool,
    message: String,
    config: &Config,
    renderer: Renderer,
) -> Result<i32, String> {
    let (channel, _) = build_channel(args, config)?;
    if !channel.is_connected().await {
        renderer.warn("execution channel is not connected; commands will fail until it is");
    }
    let assistant = Arc::new(HttpAssistant::from_config(&config.assistant));
    let (events, mut rx) = EventSink::channel();
    let store = SessionIdStore::from_config(&config.session);
    let mut console = Console::new(assistant, channel, events, config).with_session_store(store);
    if new_session {
        console.reset_session();
    }
    if let Some(target) = agent_target {
        let id = console.start_agent(target);
        renderer.status(Tone::Muted, &format!("agent session {id}"));
    }

    let handle = console.handle();
    let on_interrupt = handle.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.abort_reply();
        }
    });

    let mut input = Input::stdin();
    handle.submit(message);
    loop {
        let Some(outbound) = console.next_outbound() else {
            match input.ask(renderer, "message (empty to quit)").await? {
                Some(text) if !text.is_empty() => {
                    handle.submit(text);
                    continue;
                }
                _ => break,
            }
        };

        match with_events(console.run_turn(&outbound), &mut rx, renderer).await {
            Ok(summary) => {
                if let Some(queue_id) = summary.queue_id {
                    review_queue(&mut console, &queue_id, &mut rx, &mut input, renderer).await?;
                }
            }
            Err(ApiError::Aborted) => renderer.status(Tone::Muted, "reply abandoned"),
            // Rendered from the `Failed` reply event.
            Err(_) => {}
        }
        review_agent(&mut console, &mut rx, &mut input, renderer).await?;
    }
    Ok(0)
}

async fn review_queue(
    console: &mut Console,
    queue_id: &QueueId,
    rx: &mut UnboundedReceiver<ConsoleEventEnvelope>,
    input: &mut Input,
    renderer: Renderer,
) -> Result<(), String> {
    loop {
        let Some(item) = console
            .queue()
            .queue(queue_id)
            .and_then(|queue| queue.items.iter().find(|item| item.is_pending()))
        else {
            return Ok(());
        };
        let item_id = item.id;
        let question = format!(
            "#{item_id} `{}`: [r]un, [s]kip, skip [a]ll, [q]uit review",
            item.command
        );
        let Some(answer) = input.ask(renderer, &question).await? else {
            return Ok(());
        };
        match answer.as_str() {
            "" | "r" | "run" => {
                let outcome =
                    with_events(console.queue_mut().execute(queue_id, item_id), rx, renderer).await;
                match outcome {
                    Ok(RunOutcome::Finished(result)) => renderer.output_block(&result.output),
                    Ok(RunOutcome::TimedOut { .. }) => {
                        finish_capture(console, queue_id, item_id, rx, input, renderer).await?
                    }
                    Ok(RunOutcome::Interactive(_)) => {
                        feed_input(console, queue_id, item_id, rx, input, renderer).await?
                    }
                    Ok(RunOutcome::Cancelled) => renderer.status(Tone::Muted, "run cancelled"),
                    Err(QueueError::Channel(e @ ChannelError::NotConnected(_))) => {
                        renderer.error(&format!("{e}; reconnect, then run again"));
                    }
                    Err(e) => renderer.error(&e.to_string()),
                }
            }
            "s" | "skip" => report(console.queue_mut().skip(queue_id, item_id), rx, renderer),
            "a" | "all" => report(
                console.queue_mut().skip_all(queue_id).map(|_| ()),
                rx,
                renderer,
            ),
            "q" | "quit" => return Ok(()),
            other => renderer.warn(&format!("unknown choice `{other}`")),
        }
    }
}

fn report(
    result: Result<(), QueueError>,
    rx: &mut UnboundedReceiver<ConsoleEventEnvelope>,
    renderer: Renderer,
) {
    while let Ok(envelope) = rx.try_recv() {
        renderer.event(&envelope.event);
    }
    if let Err(e) = result {
        renderer.error(&e.to_string());
    }
}

async fn finish_capture(
    console: &mut Console,
    queue_id: &QueueId,
    item_id: u32,
    rx: &mut UnboundedReceiver<ConsoleEventEnvelope>,
    input: &mut Input,
    renderer: Renderer,
) -> Result<(), String> {
    let question = format!("#{item_id}: [c]apture now, [l]eave pending");
    let Some(answer) = input.ask(renderer, &question).await? else {
        return Ok(());
    };
    if answer != "c" && answer != "capture" {
        return Ok(());
    }
    let captured =
        with_events(console.queue_mut().complete_capture(queue_id, item_id), rx, renderer).await;
    match captured {
        Ok(result) => renderer.output_block(&result.output),
        Err(e) => renderer.error(&e.to_string()),
    }
    Ok(())
}

async fn feed_input(
    console: &mut Console,
    queue_id: &QueueId,
    item_id: u32,
    rx: &mut UnboundedReceiver<ConsoleEventEnvelope>,
    input: &mut Input,
    renderer: Renderer,
) -> Result<(), String> {
    loop {
        let Some(line) = input.ask(renderer, &format!("#{item_id} input")).await? else {
            return Ok(());
        };
        let reply =
            with_events(console.queue_mut().send_input(queue_id, item_id, &line), rx, renderer)
                .await;
        match reply {
            Ok(reply) if reply.completed => {
                renderer.output_block(&reply.output);
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                renderer.error(&e.to_string());
                return Ok(());
            }
        }
    }
}

async fn review_agent(
    console: &mut Console,
    rx: &mut UnboundedReceiver<ConsoleEventEnvelope>,
    input: &mut Input,
    renderer: Renderer,
) -> Result<(), String> {
    loop {
        match console.agent().map(|agent| agent.status()) {
            Some(SessionStatus::AwaitingApproval) => {}
            Some(SessionStatus::AwaitingInput) => {
                let Some(line) = input.ask(renderer, "step input").await? else {
                    return Ok(());
                };
                let reply = with_events(console.send_agent_input(&line), rx, renderer).await;
                match reply {
                    Ok(reply) if reply.completed => renderer.output_block(&reply.output),
                    Ok(_) => {}
                    Err(e) => {
                        renderer.error(&e.to_string());
                        return Ok(());
                    }
                }
                while let Ok(envelope) = rx.try_recv() {
                    renderer.event(&envelope.event);
                }
                continue;
            }
            _ => return Ok(()),
        }
        let Some(answer) = input
            .ask(renderer, "approve step? [y]es, [n]o, [s]top session")
            .await?
        else {
            return Ok(());
        };
        match answer.as_str() {
            "y" | "yes" => {
                if let Err(e) = with_events(console.approve_step(), rx, renderer).await {
                    renderer.error(&e.to_string());
                    if matches!(e, opsdesk::error::SessionError::Channel(_)) {
                        return Ok(());
                    }
                }
            }
            "n" | "no" => {
                let reason = input.ask(renderer, "reason (optional)").await?;
                let reason = reason.filter(|r| !r.is_empty());
                if let Err(e) = console.reject_step(reason) {
                    renderer.error(&e.to_string());
                }
            }
            "s" | "stop" => {
                if let Err(e) = console.stop_agent() {
                    renderer.error(&e.to_string());
                }
            }
            other => renderer.warn(&format!("unknown choice `{other}`")),
        }
        while let Ok(envelope) = rx.try_recv() {
            renderer.event(&envelope.event);
        }
    }
}
