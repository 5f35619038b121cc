//! Per-conversation orchestration.
//!
//! [`Console`] is the single owner of everything one conversation needs: the
//! assistant stream, a fresh directive decoder per reply turn, the queue
//! coordinator, an optional agent session, the shared cancellation flag and
//! the persisted session id. Frontends observe it through the [`EventSink`]
//! and drive it through its methods plus a cloneable [`ConsoleHandle`].

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent::{AgentSession, AgentSessionMachine, AgentStep, PlannerMessage};
use crate::channel::{
    wait_for_cancellation, CancelFlag, ExecutionChannel, ExecutionResult, InputReply,
};
use crate::config::Config;
use crate::directive::{CommandSuggestion, DirectiveDecoder, DirectiveEvent, DisplayUpdate};
use crate::error::{ApiError, SessionError};
use crate::events::{ConsoleEvent, EventSink, ReplyEvent};
use crate::outbound::{
    outbound_channel, MessageOrigin, OutboundMessage, OutboundReceiver, OutboundSender,
};
use crate::queue::{QueueCoordinator, QueueId};
use crate::session::{generate_session_id, SessionIdStore};
use crate::stream::{StreamEvent, TurnRequest, TurnSource};

/// What one completed reply turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    pub display_text: String,
    /// Every directive event of the reply, in closing-tag order.
    pub events: Vec<DirectiveEvent>,
    /// Batch opened from the reply's command cards, if any.
    pub queue_id: Option<QueueId>,
}

/// Cloneable control surface usable while the console is busy.
#[derive(Debug, Clone)]
pub struct ConsoleHandle {
    cancel: CancelFlag,
    abort: CancelFlag,
    outbound: OutboundSender,
}

impl ConsoleHandle {
    /// Queue a new top-level operator message.
    ///
    /// Any in-flight scrollback poll resolves as cancelled.
    pub fn submit(&self, text: impl Into<String>) {
        self.cancel.cancel();
        if self.outbound.send(OutboundMessage::operator(text)).is_err() {
            warn!("console dropped; operator message discarded");
        }
    }

    /// Queue a follow-up suggestion the operator picked.
    pub fn submit_follow_up(&self, text: impl Into<String>) {
        self.cancel.cancel();
        let message = OutboundMessage {
            text: text.into(),
            origin: MessageOrigin::FollowUp,
        };
        if self.outbound.send(message).is_err() {
            warn!("console dropped; follow-up discarded");
        }
    }

    /// Stop reading the in-flight reply stream.
    pub fn abort_reply(&self) {
        self.abort.cancel();
    }
}

pub struct Console {
    assistant: Arc<dyn TurnSource>,
    channel: Arc<dyn ExecutionChannel>,
    cancel: CancelFlag,
    abort: CancelFlag,
    queue: QueueCoordinator,
    agent: Option<AgentSessionMachine>,
    planner_tx: mpsc::UnboundedSender<PlannerMessage>,
    planner_rx: mpsc::UnboundedReceiver<PlannerMessage>,
    outbound_tx: OutboundSender,
    outbound_rx: OutboundReceiver,
    events: EventSink,
    session_id: Option<String>,
    store: Option<SessionIdStore>,
    deny_list: Vec<String>,
    auto_approve: bool,
}

impl Console {
    pub fn new(
        assistant: Arc<dyn TurnSource>,
        channel: Arc<dyn ExecutionChannel>,
        events: EventSink,
        config: &Config,
    ) -> Self {
        let cancel = CancelFlag::new();
        let (outbound_tx, outbound_rx) = outbound_channel();
        let (planner_tx, planner_rx) = mpsc::unbounded_channel();
        let queue = QueueCoordinator::new(
            channel.clone(),
            cancel.clone(),
            outbound_tx.clone(),
            events.clone(),
            &config.queue,
        );
        Self {
            assistant,
            channel,
            cancel,
            abort: CancelFlag::new(),
            queue,
            agent: None,
            planner_tx,
            planner_rx,
            outbound_tx,
            outbound_rx,
            events,
            session_id: None,
            store: None,
            deny_list: config.decoder.tool_deny_list.clone(),
            auto_approve: config.agent.auto_approve,
        }
    }

    /// Persist the session id in `store` and resume from what it holds.
    pub fn with_session_store(mut self, store: SessionIdStore) -> Self {
        match store.load() {
            Ok(Some(id)) => {
                info!(session = %id, "resuming stored session");
                self.session_id = Some(id);
            }
            Ok(None) => {}
            Err(e) => self.events.warn(format!("ignoring stored session id: {e}")),
        }
        self.store = Some(store);
        self
    }

    pub fn handle(&self) -> ConsoleHandle {
        ConsoleHandle {
            cancel: self.cancel.clone(),
            abort: self.abort.clone(),
            outbound: self.outbound_tx.clone(),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Forget the conversation id so the next turn starts fresh.
    pub fn reset_session(&mut self) {
        self.session_id = None;
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                self.events.warn(e);
            }
        }
    }

    pub fn queue(&self) -> &QueueCoordinator {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut QueueCoordinator {
        &mut self.queue
    }

    pub fn agent(&self) -> Option<&AgentSessionMachine> {
        self.agent.as_ref()
    }

    /// Start a supervised agent session against `target`, replacing any
    /// previous one. Returns the new session id.
    pub fn start_agent(&mut self, target: impl Into<String>) -> String {
        if let Some(previous) = self.agent.as_mut() {
            previous.stop();
        }
        let id = generate_session_id();
        let session = AgentSession::new(id.clone(), target, self.auto_approve);
        self.agent = Some(AgentSessionMachine::new(
            session,
            self.channel.clone(),
            self.cancel.clone(),
            self.planner_tx.clone(),
            self.events.clone(),
        ));
        info!(session = %id, "agent session started");
        id
    }

    fn agent_mut(&mut self) -> Result<&mut AgentSessionMachine, SessionError> {
        self.agent.as_mut().ok_or(SessionError::NoSession)
    }

    /// Hand a planner step to the active agent session.
    pub async fn deliver_agent_step(&mut self, step: AgentStep) -> Result<bool, SessionError> {
        self.agent_mut()?.receive_step(step).await
    }

    pub async fn approve_step(&mut self) -> Result<Option<ExecutionResult>, SessionError> {
        self.agent_mut()?.approve().await
    }

    /// Answer the prompt an agent step's process is blocked on.
    pub async fn send_agent_input(&mut self, text: &str) -> Result<InputReply, SessionError> {
        self.agent_mut()?.send_input(text).await
    }

    pub fn reject_step(&mut self, reason: Option<String>) -> Result<(), SessionError> {
        self.agent_mut()?.reject(reason)
    }

    pub fn stop_agent(&mut self) -> Result<(), SessionError> {
        self.agent_mut()?.stop();
        Ok(())
    }

    /// Next message waiting to re-enter the chat stream.
    ///
    /// Planner messages produced by the agent session are forwarded first.
    pub fn next_outbound(&mut self) -> Option<OutboundMessage> {
        self.forward_planner_messages();
        self.outbound_rx.try_recv().ok()
    }

    fn forward_planner_messages(&mut self) {
        while let Ok(message) = self.planner_rx.try_recv() {
            let (session_id, step_number) = match &message {
                PlannerMessage::StepResult {
                    session_id,
                    step_number,
                    ..
                }
                | PlannerMessage::StepRejected {
                    session_id,
                    step_number,
                    ..
                } => (session_id.clone(), *step_number),
            };
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    self.events
                        .warn(format!("failed to encode planner message: {e}"));
                    continue;
                }
            };
            let outbound = OutboundMessage {
                text,
                origin: MessageOrigin::Planner {
                    session_id,
                    step_number,
                },
            };
            if self.outbound_tx.send(outbound).is_err() {
                warn!("outbound receiver closed; planner message dropped");
            }
        }
    }

    /// Run one reply turn for `message`.
    ///
    /// Stream failures are reported as a `Failed` reply event and returned.
    pub async fn run_turn(&mut self, message: &OutboundMessage) -> Result<TurnSummary, ApiError> {
        self.abort.clear();
        let request = TurnRequest {
            message: message.text.clone(),
            session_id: self.session_id.clone(),
        };
        debug!(origin = ?message.origin, "opening reply turn");

        let mut stream = match self.assistant.open_turn(&request).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail_turn(e)),
        };

        let mut decoder = DirectiveDecoder::new(self.deny_list.clone());
        let mut suggestions = Vec::new();
        let mut abort_rx = self.abort.subscribe();
        loop {
            let next = tokio::select! {
                biased;
                _ = wait_for_cancellation(&mut abort_rx) => {
                    info!("reply stream aborted by operator");
                    self.events.emit(ConsoleEvent::Reply(ReplyEvent::Aborted));
                    return Err(ApiError::Aborted);
                }
                next = stream.next_event() => next,
            };
            let event = match next {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) => return Err(self.fail_turn(e)),
            };
            match event {
                StreamEvent::Session { session_id } => self.assign_session(session_id),
                StreamEvent::Chunk { text } => {
                    let update = decoder.feed(&text);
                    match update.display {
                        DisplayUpdate::Unchanged => {}
                        DisplayUpdate::Append(delta) => self
                            .events
                            .emit(ConsoleEvent::Reply(ReplyEvent::TextAppended { delta })),
                        DisplayUpdate::Replace(text) => self
                            .events
                            .emit(ConsoleEvent::Reply(ReplyEvent::TextReplaced { text })),
                    }
                    self.route_directives(update.events, &mut suggestions);
                }
                StreamEvent::AgentStep { step } => {
                    if let Err(e) = self.deliver_agent_step(step).await {
                        self.events.warn(format!("agent step not delivered: {e}"));
                    }
                }
                StreamEvent::Error { message } => {
                    return Err(self.fail_turn(ApiError::InvalidResponse(message)));
                }
                StreamEvent::Done => break,
                StreamEvent::Unknown => {}
            }
        }

        let full_text = decoder.buffer().to_string();
        let finalized = decoder.finalize(&full_text);
        self.route_directives(finalized.fresh, &mut suggestions);
        self.events.emit(ConsoleEvent::Reply(ReplyEvent::Finished {
            display_text: finalized.display_text.clone(),
        }));

        let queue_id = if suggestions.is_empty() {
            None
        } else {
            Some(self.queue.open_batch(suggestions))
        };
        Ok(TurnSummary {
            display_text: finalized.display_text,
            events: finalized.events,
            queue_id,
        })
    }

    fn fail_turn(&self, err: ApiError) -> ApiError {
        self.events.emit(ConsoleEvent::Reply(ReplyEvent::Failed {
            message: err.to_string(),
        }));
        err
    }

    fn assign_session(&mut self, session_id: String) {
        if self.session_id.as_deref() == Some(session_id.as_str()) {
            return;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&session_id) {
                self.events.warn(format!("session id not persisted: {e}"));
            }
        }
        info!(session = %session_id, "session assigned");
        self.session_id = Some(session_id.clone());
        self.events
            .emit(ConsoleEvent::Reply(ReplyEvent::SessionAssigned { session_id }));
    }

    fn route_directives(
        &mut self,
        events: Vec<DirectiveEvent>,
        suggestions: &mut Vec<CommandSuggestion>,
    ) {
        for event in events {
            if let DirectiveEvent::CommandSuggestion(card) = &event {
                suggestions.push(card.clone());
            }
            self.events.emit(ConsoleEvent::Directive(event));
        }
    }
}
