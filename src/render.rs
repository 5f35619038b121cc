//! Terminal rendering of console events.
//!
//! Assistant text goes to stdout; status lines, warnings and prompts go to
//! stderr so piping the reply stays clean.

use crossterm::style::{Color, Stylize};
use std::io::{self, Write};
use tracing::debug;

use crate::directive::DirectiveEvent;
use crate::events::{AgentEvent, ConsoleEvent, QueueEvent, QueueItemView, ReplyEvent};

const LABEL_WARNING: &str = "warning:";
const LABEL_ERROR: &str = "error:";
const PROMPT_SYMBOL: &str = ">";
const INDENT_1: &str = "  ";

/// Visual weight of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Accent,
    Muted,
    Warning,
    Error,
}

impl Tone {
    fn color(self) -> Color {
        match self {
            Self::Info => Color::Grey,
            Self::Accent => Color::Cyan,
            Self::Muted => Color::DarkGrey,
            Self::Warning => Color::Yellow,
            Self::Error => Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Print a question and leave the cursor after the prompt symbol.
    pub fn prompt(&self, question: &str) {
        if self.color {
            eprint!("\r{} {} ", question.bold(), PROMPT_SYMBOL.with(Color::Cyan));
        } else {
            eprint!("\r{question} {PROMPT_SYMBOL} ");
        }
        let _ = io::stderr().flush();
    }

    pub fn warn(&self, msg: &str) {
        if self.color {
            eprintln!("\r{} {msg}", LABEL_WARNING.with(Tone::Warning.color()).bold());
        } else {
            eprintln!("\r{LABEL_WARNING} {msg}");
        }
    }

    pub fn error(&self, msg: &str) {
        if self.color {
            eprintln!("\r{} {msg}", LABEL_ERROR.with(Tone::Error.color()).bold());
        } else {
            eprintln!("\r{LABEL_ERROR} {msg}");
        }
    }

    pub fn status(&self, tone: Tone, line: &str) {
        match tone {
            Tone::Warning => self.warn(line),
            Tone::Error => self.error(line),
            _ if self.color => eprintln!("\r{}", line.with(tone.color())),
            _ => eprintln!("\r{line}"),
        }
    }

    /// Indented block of command output.
    pub fn output_block(&self, text: &str) {
        for line in text.lines() {
            if self.color {
                eprintln!("{INDENT_1}{}", line.with(Tone::Muted.color()));
            } else {
                eprintln!("{INDENT_1}{line}");
            }
        }
    }

    pub fn event(&self, event: &ConsoleEvent) {
        match event {
            ConsoleEvent::Reply(ReplyEvent::TextAppended { delta }) => {
                print!("{delta}");
                let _ = io::stdout().flush();
            }
            ConsoleEvent::Reply(ReplyEvent::TextReplaced { text }) => {
                println!();
                self.status(Tone::Muted, "(reply revised)");
                print!("{text}");
                let _ = io::stdout().flush();
            }
            ConsoleEvent::Reply(ReplyEvent::Finished { .. }) => println!(),
            ConsoleEvent::Queue(QueueEvent::NeedsManualCapture { partial_output, .. })
            | ConsoleEvent::Queue(QueueEvent::AwaitingInput {
                output: partial_output,
                ..
            })
            | ConsoleEvent::Agent(AgentEvent::AwaitingInput {
                output: partial_output,
                ..
            }) => {
                if let Some((tone, line)) = status_line(event) {
                    self.status(tone, &line);
                }
                self.output_block(partial_output);
            }
            ConsoleEvent::Feedback(feedback) => {
                debug!(reference = %feedback.reference, success = feedback.success, "feedback");
            }
            _ => {
                if let Some((tone, line)) = status_line(event) {
                    self.status(tone, &line);
                }
            }
        }
    }
}

fn item_lines(items: &[QueueItemView]) -> String {
    items
        .iter()
        .map(|item| {
            let server = if item.server.is_empty() {
                "default target"
            } else {
                item.server.as_str()
            };
            format!("\n{INDENT_1}{}. {} @ {server}", item.id, item.command)
        })
        .collect()
}

/// One-line description of a non-text event, if it has one.
pub fn status_line(event: &ConsoleEvent) -> Option<(Tone, String)> {
    let line = match event {
        ConsoleEvent::Reply(reply) => match reply {
            ReplyEvent::SessionAssigned { session_id } => {
                (Tone::Muted, format!("session {session_id}"))
            }
            ReplyEvent::Aborted => (Tone::Warning, "reply aborted".to_string()),
            ReplyEvent::Failed { message } => (Tone::Error, message.clone()),
            _ => return None,
        },
        ConsoleEvent::Directive(directive) => match directive {
            DirectiveEvent::CommandSuggestion(_) => return None,
            DirectiveEvent::FollowUpSuggestions { items } => {
                let list = items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| format!("\n{INDENT_1}{}. {}", idx + 1, item.text))
                    .collect::<String>();
                (Tone::Accent, format!("Follow-ups:{list}"))
            }
            DirectiveEvent::FileOpen { path } => (Tone::Info, format!("file: {path}")),
            DirectiveEvent::ChangesetRef { id } => (Tone::Info, format!("changeset: {id}")),
            DirectiveEvent::ProgressUpdate { payload } => {
                (Tone::Muted, format!("progress: {payload}"))
            }
            DirectiveEvent::ReasoningStep(step) => {
                let mut line = format!("[{}]", step.phase);
                if let Some(thought) = &step.thought {
                    line.push(' ');
                    line.push_str(thought);
                }
                if let Some(tool) = &step.tool {
                    line.push_str(&format!(" ({tool})"));
                }
                (Tone::Muted, line)
            }
        },
        ConsoleEvent::Queue(queue) => match queue {
            QueueEvent::Opened { queue_id, items } => (
                Tone::Accent,
                format!("Queued commands ({queue_id}):{}", item_lines(items)),
            ),
            QueueEvent::Reconstructed { queue_id, items } => (
                Tone::Accent,
                format!("Recovered commands ({queue_id}):{}", item_lines(items)),
            ),
            QueueEvent::ItemUpdated {
                item_id,
                status,
                exit_code,
                ..
            } => {
                let exit = exit_code.map(|code| format!(" (exit {code})")).unwrap_or_default();
                (Tone::Info, format!("#{item_id} {}{exit}", status.label()))
            }
            QueueEvent::NeedsManualCapture { item_id, .. } => (
                Tone::Warning,
                format!("#{item_id} still running; capture manually when it finishes"),
            ),
            QueueEvent::AwaitingInput { item_id, .. } => {
                (Tone::Accent, format!("#{item_id} is waiting for input"))
            }
            QueueEvent::AutoContinued { queue_id } => {
                (Tone::Muted, format!("results for {queue_id} sent to the assistant"))
            }
        },
        ConsoleEvent::Agent(agent) => match agent {
            AgentEvent::StepCreated {
                step_number,
                step_type,
                ..
            } => (
                Tone::Muted,
                format!("step {step_number}: {}", format!("{step_type:?}").to_lowercase()),
            ),
            AgentEvent::ApprovalRequested {
                step_number,
                command,
                reasoning,
                ..
            } => {
                let why = reasoning
                    .as_deref()
                    .map(|r| format!("\n{INDENT_1}{r}"))
                    .unwrap_or_default();
                (
                    Tone::Accent,
                    format!("step {step_number} wants to run `{command}`{why}"),
                )
            }
            AgentEvent::AwaitingInput { step_number, .. } => {
                (Tone::Accent, format!("step {step_number} is waiting for input"))
            }
            AgentEvent::StepResolved {
                step_number,
                status,
                exit_code,
                ..
            } => {
                let exit = exit_code.map(|code| format!(" (exit {code})")).unwrap_or_default();
                (
                    Tone::Info,
                    format!(
                        "step {step_number} {}{exit}",
                        format!("{status:?}").to_lowercase()
                    ),
                )
            }
            AgentEvent::StatusChanged { to, .. } => (Tone::Muted, format!("agent {to}")),
        },
        ConsoleEvent::Warning(warning) => (Tone::Warning, warning.message.clone()),
        ConsoleEvent::Feedback(_) => return None,
    };
    Some(line)
}
