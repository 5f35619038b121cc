//! Agent session state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{
    CancelFlag, ExecutionChannel, ExecutionResult, InputReply, InteractiveProcess, RunOutcome,
};
use crate::error::SessionError;
use crate::events::{AgentEvent, ConsoleEvent, EventSink};

use super::{AgentSession, AgentStep, PlannerMessage, SessionStatus, StepStatus, StepType};

/// Stops a session from outside, including while a step is executing.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Drives one [`AgentSession`] through planner steps.
pub struct AgentSessionMachine {
    session: AgentSession,
    channel: Arc<dyn ExecutionChannel>,
    cancel: CancelFlag,
    planner: mpsc::UnboundedSender<PlannerMessage>,
    events: EventSink,
    stop: StopHandle,
    /// Process of the current step while it waits for operator input.
    interactive: Option<InteractiveProcess>,
}

impl AgentSessionMachine {
    pub fn new(
        session: AgentSession,
        channel: Arc<dyn ExecutionChannel>,
        cancel: CancelFlag,
        planner: mpsc::UnboundedSender<PlannerMessage>,
        events: EventSink,
    ) -> Self {
        Self {
            session,
            channel,
            cancel,
            planner,
            events,
            stop: StopHandle::default(),
            interactive: None,
        }
    }

    pub fn session(&self) -> &AgentSession {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn set_status(&mut self, to: SessionStatus) {
        let from = self.session.status;
        if from == to {
            return;
        }
        self.session.status = to;
        debug!(session = %self.session.id, %from, %to, "agent status changed");
        self.events.emit(ConsoleEvent::Agent(AgentEvent::StatusChanged {
            session_id: self.session.id.clone(),
            from,
            to,
        }));
        if to.is_terminal() {
            info!(session = %self.session.id, status = %to, "agent session finished");
            self.events.feedback(
                format!("agent session {}", self.session.id),
                to == SessionStatus::Completed,
            );
        }
    }

    /// Apply a stop requested through a [`StopHandle`].
    fn observe_stop(&mut self) {
        if self.stop.is_requested() && !self.session.status.is_terminal() {
            if let Some(process) = self.interactive.take() {
                debug!(
                    session = %self.session.id,
                    process = %process.process_id,
                    "abandoning interactive step"
                );
            }
            self.set_status(SessionStatus::Stopped);
        }
    }

    fn send_to_planner(&self, message: PlannerMessage) {
        if self.planner.send(message).is_err() {
            warn!(session = %self.session.id, "planner receiver closed; message dropped");
        }
    }

    fn ignore(&self, step: &AgentStep, why: &str) {
        self.events.warn(format!(
            "agent session {}: step {} ignored ({why})",
            self.session.id, step.step_number
        ));
    }

    fn resolve_last(&mut self, status: StepStatus, result: Option<&ExecutionResult>) {
        let session_id = self.session.id.clone();
        let Some(step) = self.session.steps.last_mut() else {
            return;
        };
        step.status = status;
        if let Some(result) = result {
            step.output = Some(result.output.clone());
            step.exit_code = result.exit_code;
        }
        self.events.emit(ConsoleEvent::Agent(AgentEvent::StepResolved {
            session_id,
            step_number: step.step_number,
            status,
            exit_code: step.exit_code,
        }));
    }

    /// Accept the planner's next step.
    ///
    /// Returns `Ok(false)` when the step was ignored: the session is over, the
    /// previous step is unresolved, or the step number does not increase.
    pub async fn receive_step(&mut self, step: AgentStep) -> Result<bool, SessionError> {
        self.observe_stop();
        if self.session.status.is_terminal() {
            self.ignore(&step, &format!("session {}", self.session.status));
            return Ok(false);
        }
        if let Some(last) = self.session.last_step() {
            if !last.is_resolved() {
                self.ignore(&step, &format!("step {} unresolved", last.step_number));
                return Ok(false);
            }
            if step.step_number <= last.step_number {
                self.ignore(&step, "out of order");
                return Ok(false);
            }
        }

        let mut step = step;
        step.status = StepStatus::Pending;
        step.output = None;
        step.exit_code = None;
        let step_type = step.step_type;
        self.events.emit(ConsoleEvent::Agent(AgentEvent::StepCreated {
            session_id: self.session.id.clone(),
            step_number: step.step_number,
            step_type,
        }));
        self.session.steps.push(step);

        match step_type {
            StepType::Complete => {
                self.resolve_last(StepStatus::Executed, None);
                self.set_status(SessionStatus::Completed);
            }
            StepType::Failed => {
                self.resolve_last(StepStatus::Failed, None);
                self.set_status(SessionStatus::Failed);
            }
            StepType::Command if self.session.auto_approve => {
                self.run_pending_step().await?;
            }
            StepType::Command => self.request_approval(),
        }
        Ok(true)
    }

    fn request_approval(&mut self) {
        self.set_status(SessionStatus::AwaitingApproval);
        if let Some(step) = self.session.last_step() {
            self.events.emit(ConsoleEvent::Agent(AgentEvent::ApprovalRequested {
                session_id: self.session.id.clone(),
                step_number: step.step_number,
                command: step.content.clone(),
                reasoning: step.reasoning.clone(),
            }));
        }
    }

    fn pending_command(&self) -> Result<(), SessionError> {
        if self.session.status.is_terminal() {
            return Err(SessionError::Finished(self.session.status.to_string()));
        }
        let awaiting = self.session.status == SessionStatus::AwaitingApproval
            && self.session.last_step().is_some_and(|step| {
                step.step_type == StepType::Command && !step.is_resolved()
            });
        if awaiting {
            Ok(())
        } else {
            Err(SessionError::NoPendingStep)
        }
    }

    /// Run the step awaiting approval and report it to the planner.
    ///
    /// Returns `None` when nothing is reported (cancelled or stopped).
    pub async fn approve(&mut self) -> Result<Option<ExecutionResult>, SessionError> {
        self.observe_stop();
        self.pending_command()?;
        self.run_pending_step().await
    }

    /// Refuse the step awaiting approval; the planner reconsiders.
    pub fn reject(&mut self, reason: Option<String>) -> Result<(), SessionError> {
        self.observe_stop();
        self.pending_command()?;
        self.resolve_last(StepStatus::Rejected, None);
        if let Some(step) = self.session.last_step() {
            self.send_to_planner(PlannerMessage::StepRejected {
                session_id: self.session.id.clone(),
                step_number: step.step_number,
                reason,
            });
        }
        self.set_status(SessionStatus::Thinking);
        Ok(())
    }

    /// Force the session to `Stopped`. No-op once terminal.
    pub fn stop(&mut self) {
        self.stop.stop();
        self.observe_stop();
    }

    /// Cancel the in-flight command run, if any.
    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    async fn run_pending_step(&mut self) -> Result<Option<ExecutionResult>, SessionError> {
        let Some(step) = self.session.last_step() else {
            return Err(SessionError::NoPendingStep);
        };
        let command = step.content.clone();
        let step_number = step.step_number;
        let target = self.session.target.clone();

        self.set_status(SessionStatus::Executing);
        self.cancel.clear();
        let outcome = match self.channel.run(&command, &target, &self.cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.request_approval();
                return Err(SessionError::Channel(err));
            }
        };

        let result = match outcome {
            RunOutcome::Finished(result) => Some(result),
            RunOutcome::TimedOut { partial, .. } => Some(partial),
            RunOutcome::Interactive(process) if !self.stop.is_requested() => {
                self.await_input(step_number, process);
                return Ok(None);
            }
            RunOutcome::Interactive(process) => Some(ExecutionResult {
                output: process.output,
                exit_code: None,
                timed_out: false,
            }),
            RunOutcome::Cancelled => None,
        };

        if self.stop.is_requested() {
            // Keep the local record but stop listening.
            match &result {
                Some(result) => self.resolve_last(StepStatus::Executed, Some(result)),
                None => self.resolve_last(StepStatus::Failed, None),
            }
            self.set_status(SessionStatus::Stopped);
            return Ok(None);
        }

        let Some(result) = result else {
            self.resolve_last(StepStatus::Failed, None);
            self.events.warn(format!(
                "agent session {}: step {step_number} cancelled before completion",
                self.session.id
            ));
            self.set_status(SessionStatus::Thinking);
            return Ok(None);
        };

        self.report_result(step_number, command, &result);
        Ok(Some(result))
    }

    fn await_input(&mut self, step_number: u32, process: InteractiveProcess) {
        self.set_status(SessionStatus::AwaitingInput);
        self.events.emit(ConsoleEvent::Agent(AgentEvent::AwaitingInput {
            session_id: self.session.id.clone(),
            step_number,
            process_id: process.process_id.clone(),
            output: process.output.clone(),
        }));
        self.interactive = Some(process);
    }

    fn report_result(&mut self, step_number: u32, command: String, result: &ExecutionResult) {
        self.resolve_last(StepStatus::Executed, Some(result));
        self.events.feedback(command, result.succeeded());
        self.send_to_planner(PlannerMessage::StepResult {
            session_id: self.session.id.clone(),
            step_number,
            output: result.output.clone(),
            exit_code: result.exit_code,
            timed_out: result.timed_out,
        });
        self.set_status(SessionStatus::Thinking);
    }

    /// Answer the prompt the current step's process is blocked on.
    ///
    /// The planner hears about the step only once the process completes;
    /// until then the step stays pending and the session awaits more input.
    pub async fn send_input(&mut self, text: &str) -> Result<InputReply, SessionError> {
        self.observe_stop();
        if self.session.status.is_terminal() {
            return Err(SessionError::Finished(self.session.status.to_string()));
        }
        let Some(process) = self.interactive.take() else {
            return Err(SessionError::NoPendingInput);
        };
        let (step_number, command) = match self.session.last_step() {
            Some(step) => (step.step_number, step.content.clone()),
            None => return Err(SessionError::NoPendingInput),
        };

        let reply = match self.channel.send_input(&process, text).await {
            Ok(reply) => reply,
            Err(err) => {
                self.interactive = Some(process);
                return Err(SessionError::Channel(err));
            }
        };

        let mut transcript = process.output.clone();
        if !reply.output.is_empty() {
            if !transcript.is_empty() && !transcript.ends_with('\n') {
                transcript.push('\n');
            }
            transcript.push_str(&reply.output);
        }

        if reply.completed {
            let result = ExecutionResult {
                output: transcript,
                exit_code: reply.exit_code,
                timed_out: false,
            };
            if self.stop.is_requested() {
                self.resolve_last(StepStatus::Executed, Some(&result));
                self.set_status(SessionStatus::Stopped);
            } else {
                self.report_result(step_number, command, &result);
            }
        } else if self.stop.is_requested() {
            self.set_status(SessionStatus::Stopped);
        } else {
            self.events.emit(ConsoleEvent::Agent(AgentEvent::AwaitingInput {
                session_id: self.session.id.clone(),
                step_number,
                process_id: process.process_id.clone(),
                output: reply.output.clone(),
            }));
            self.interactive = Some(InteractiveProcess {
                output: transcript,
                ..process
            });
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::remote::{ExecResponse, InputResponse};
    use crate::channel::RemoteExecChannel;
    use crate::error::ChannelError;
    use crate::events::{drain, ConsoleEventEnvelope, FeedbackEvent};
    use crate::testsupport::ScriptedExecService;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        machine: AgentSessionMachine,
        planner: UnboundedReceiver<PlannerMessage>,
        events: UnboundedReceiver<ConsoleEventEnvelope>,
        service: ScriptedExecService,
    }

    fn harness(auto_approve: bool) -> Harness {
        let service = ScriptedExecService::new();
        let channel = Arc::new(RemoteExecChannel::new(service.clone(), Duration::from_secs(30)));
        let (planner_tx, planner) = mpsc::unbounded_channel();
        let (sink, events) = EventSink::channel();
        Harness {
            machine: AgentSessionMachine::new(
                AgentSession::new("s1", "web-1", auto_approve),
                channel,
                CancelFlag::new(),
                planner_tx,
                sink,
            ),
            planner,
            events,
            service,
        }
    }

    fn ok(stdout: &str, exit_code: i32) -> Result<ExecResponse, ChannelError> {
        Ok(ExecResponse::Completed {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(exit_code),
        })
    }

    #[tokio::test]
    async fn command_step_waits_for_approval_then_reports() {
        let mut h = harness(false);
        h.service.push_exec(ok("active (running)", 0));

        assert!(h
            .machine
            .receive_step(AgentStep::command(1, "systemctl status nginx"))
            .await
            .unwrap());
        assert_eq!(h.machine.status(), SessionStatus::AwaitingApproval);
        assert!(h.service.exec_calls().is_empty());

        let result = h.machine.approve().await.unwrap().unwrap();
        assert_eq!(result.output, "active (running)");
        assert_eq!(h.machine.status(), SessionStatus::Thinking);
        assert_eq!(
            h.planner.try_recv().unwrap(),
            PlannerMessage::StepResult {
                session_id: "s1".into(),
                step_number: 1,
                output: "active (running)".into(),
                exit_code: Some(0),
                timed_out: false,
            }
        );
        let step = &h.machine.session().steps[0];
        assert_eq!(step.status, StepStatus::Executed);
        assert_eq!(step.exit_code, Some(0));
    }

    #[tokio::test]
    async fn auto_approve_skips_awaiting_approval() {
        let mut h = harness(true);
        h.machine
            .receive_step(AgentStep::command(1, "uptime"))
            .await
            .unwrap();

        let statuses = drain(&mut h.events)
            .into_iter()
            .filter_map(|event| match event {
                ConsoleEvent::Agent(AgentEvent::StatusChanged { to, .. }) => Some(to),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![SessionStatus::Executing, SessionStatus::Thinking]
        );
        assert!(h.planner.try_recv().is_ok());
    }

    #[tokio::test]
    async fn next_step_is_ignored_until_previous_resolves() {
        let mut h = harness(false);
        h.machine
            .receive_step(AgentStep::command(1, "df -h"))
            .await
            .unwrap();
        assert!(!h
            .machine
            .receive_step(AgentStep::command(2, "du -sh /var"))
            .await
            .unwrap());
        assert_eq!(h.machine.session().steps.len(), 1);

        h.machine.reject(Some("too broad".into())).unwrap();
        assert!(h
            .machine
            .receive_step(AgentStep::command(2, "du -sh /var"))
            .await
            .unwrap());

        let created = drain(&mut h.events)
            .into_iter()
            .filter_map(|event| match event {
                ConsoleEvent::Agent(AgentEvent::StepCreated { step_number, .. }) => {
                    Some(format!("created {step_number}"))
                }
                ConsoleEvent::Agent(AgentEvent::StepResolved {
                    step_number,
                    status,
                    ..
                }) => Some(format!("resolved {step_number} {status:?}")),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(created, vec!["created 1", "resolved 1 Rejected", "created 2"]);
    }

    #[tokio::test]
    async fn reject_notifies_planner() {
        let mut h = harness(false);
        h.machine
            .receive_step(AgentStep::command(1, "rm -rf /var/cache"))
            .await
            .unwrap();
        h.machine.reject(Some("destructive".into())).unwrap();

        assert_eq!(h.machine.status(), SessionStatus::Thinking);
        assert_eq!(h.machine.session().steps[0].status, StepStatus::Rejected);
        assert_eq!(
            h.planner.try_recv().unwrap(),
            PlannerMessage::StepRejected {
                session_id: "s1".into(),
                step_number: 1,
                reason: Some("destructive".into()),
            }
        );
        assert!(h.service.exec_calls().is_empty());
    }

    #[tokio::test]
    async fn out_of_order_step_is_ignored() {
        let mut h = harness(true);
        h.machine.receive_step(AgentStep::command(3, "ls")).await.unwrap();
        assert!(!h.machine.receive_step(AgentStep::command(3, "ls")).await.unwrap());
        assert!(!h.machine.receive_step(AgentStep::command(2, "ls")).await.unwrap());
        assert_eq!(h.machine.session().steps.len(), 1);
    }

    #[tokio::test]
    async fn complete_step_ends_session_with_feedback() {
        let mut h = harness(false);
        h.machine
            .receive_step(AgentStep::new(1, StepType::Complete, "nginx restarted"))
            .await
            .unwrap();
        assert_eq!(h.machine.status(), SessionStatus::Completed);
        assert!(drain(&mut h.events).contains(&ConsoleEvent::Feedback(FeedbackEvent {
            reference: "agent session s1".into(),
            success: true,
        })));
        assert!(!h.machine.receive_step(AgentStep::command(2, "ls")).await.unwrap());
    }

    #[tokio::test]
    async fn failed_step_ends_session() {
        let mut h = harness(false);
        h.machine
            .receive_step(AgentStep::new(1, StepType::Failed, "cannot reach db"))
            .await
            .unwrap();
        assert_eq!(h.machine.status(), SessionStatus::Failed);
        assert_eq!(h.machine.session().steps[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn approve_without_connection_keeps_step_pending() {
        let mut h = harness(false);
        h.service.set_connected(false);
        h.machine
            .receive_step(AgentStep::command(1, "uptime"))
            .await
            .unwrap();

        let err = h.machine.approve().await.unwrap_err();
        assert_eq!(
            err,
            SessionError::Channel(ChannelError::NotConnected("web-1".into()))
        );
        assert_eq!(h.machine.status(), SessionStatus::AwaitingApproval);
        assert!(!h.machine.session().steps[0].is_resolved());

        h.service.set_connected(true);
        assert!(h.machine.approve().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn approve_without_pending_step_is_an_error() {
        let mut h = harness(false);
        assert_eq!(
            h.machine.approve().await.unwrap_err(),
            SessionError::NoPendingStep
        );
        h.machine.stop();
        assert_eq!(
            h.machine.approve().await.unwrap_err(),
            SessionError::Finished("stopped".into())
        );
    }

    #[tokio::test]
    async fn stop_mid_execution_drops_the_report() {
        let mut h = harness(false);
        h.service.set_exec_delay(Duration::from_millis(50));
        h.machine
            .receive_step(AgentStep::command(1, "sleep 1"))
            .await
            .unwrap();
        let handle = h.machine.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.stop();
        });

        assert_eq!(h.machine.approve().await.unwrap(), None);
        assert_eq!(h.machine.status(), SessionStatus::Stopped);
        assert!(h.planner.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancelled_step_fails_without_report() {
        let mut h = harness(false);
        h.service.set_exec_delay(Duration::from_secs(5));
        h.machine
            .receive_step(AgentStep::command(1, "sleep 60"))
            .await
            .unwrap();
        let cancel = h.machine.cancel_flag().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        assert_eq!(h.machine.approve().await.unwrap(), None);
        assert_eq!(h.machine.session().steps[0].status, StepStatus::Failed);
        assert_eq!(h.machine.status(), SessionStatus::Thinking);
        assert!(h.planner.try_recv().is_err());
    }

    #[tokio::test]
    async fn blocked_step_waits_for_input_before_reporting() {
        let mut h = harness(false);
        h.service.push_exec(Ok(ExecResponse::Timeout {
            process_id: "p-1".into(),
            output: "Proceed? [y/N]".into(),
        }));
        h.service.push_input(Ok(InputResponse {
            completed: false,
            output: "Are you sure? [y/N]".into(),
            exit_code: None,
        }));
        h.service.push_input(Ok(InputResponse {
            completed: true,
            output: "upgraded 3 packages".into(),
            exit_code: Some(0),
        }));
        h.machine
            .receive_step(AgentStep::command(1, "apt-get upgrade"))
            .await
            .unwrap();

        assert_eq!(h.machine.approve().await.unwrap(), None);
        assert_eq!(h.machine.status(), SessionStatus::AwaitingInput);
        assert_eq!(h.machine.session().steps[0].status, StepStatus::Pending);
        assert!(h.planner.try_recv().is_err());
        assert!(drain(&mut h.events).contains(&ConsoleEvent::Agent(AgentEvent::AwaitingInput {
            session_id: "s1".into(),
            step_number: 1,
            process_id: "p-1".into(),
            output: "Proceed? [y/N]".into(),
        })));
        assert!(!h.machine.receive_step(AgentStep::command(2, "ls")).await.unwrap());

        let first = h.machine.send_input("y").await.unwrap();
        assert!(!first.completed);
        assert_eq!(h.machine.status(), SessionStatus::AwaitingInput);
        assert!(h.planner.try_recv().is_err());

        let second = h.machine.send_input("y").await.unwrap();
        assert!(second.completed);
        assert_eq!(h.machine.status(), SessionStatus::Thinking);
        assert_eq!(
            h.service.inputs(),
            vec![("p-1".into(), "y".into()), ("p-1".into(), "y".into())]
        );
        assert_eq!(
            h.planner.try_recv().unwrap(),
            PlannerMessage::StepResult {
                session_id: "s1".into(),
                step_number: 1,
                output: "Proceed? [y/N]\nAre you sure? [y/N]\nupgraded 3 packages".into(),
                exit_code: Some(0),
                timed_out: false,
            }
        );
        assert_eq!(h.machine.session().steps[0].status, StepStatus::Executed);
    }

    #[tokio::test]
    async fn input_without_blocked_step_is_an_error() {
        let mut h = harness(false);
        h.machine
            .receive_step(AgentStep::command(1, "uptime"))
            .await
            .unwrap();
        assert_eq!(
            h.machine.send_input("y").await.unwrap_err(),
            SessionError::NoPendingInput
        );
    }

    #[tokio::test]
    async fn failed_input_keeps_the_process_outstanding() {
        let mut h = harness(false);
        h.service.push_exec(Ok(ExecResponse::Timeout {
            process_id: "p-2".into(),
            output: "Password:".into(),
        }));
        h.machine
            .receive_step(AgentStep::command(1, "sudo -k true"))
            .await
            .unwrap();
        h.machine.approve().await.unwrap();

        h.service.set_connected(false);
        assert_eq!(
            h.machine.send_input("secret").await.unwrap_err(),
            SessionError::Channel(ChannelError::NotConnected("web-1".into()))
        );
        assert_eq!(h.machine.status(), SessionStatus::AwaitingInput);
        assert!(h.service.inputs().is_empty());

        h.machine.stop();
        assert_eq!(h.machine.status(), SessionStatus::Stopped);
        assert_eq!(
            h.machine.send_input("again").await.unwrap_err(),
            SessionError::Finished("stopped".into())
        );
        assert!(h.planner.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_planner_receiver_does_not_break_reporting() {
        let mut h = harness(false);
        h.machine
            .receive_step(AgentStep::command(1, "uptime"))
            .await
            .unwrap();
        h.planner.close();
        assert!(h.machine.approve().await.unwrap().is_some());
        assert_eq!(h.machine.status(), SessionStatus::Thinking);
    }
}
