//! opsdesk: client-side orchestration for an AI troubleshooting console.
//!
//! Assistant replies stream in with bracketed directives embedded in the
//! text. This crate decodes them incrementally, turns command suggestions
//! into a reviewable queue, runs the commands through a tmux scrollback or
//! remote exec channel, and feeds the results back into the conversation.
//! A supervised agent mode runs planner-issued steps with per-step approval.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use opsdesk::channel::RemoteExecChannel;
//! use opsdesk::config::load_config;
//! use opsdesk::console::Console;
//! use opsdesk::events::EventSink;
//! use opsdesk::outbound::OutboundMessage;
//! use opsdesk::stream::HttpAssistant;
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let assistant = Arc::new(HttpAssistant::from_config(&config.assistant));
//! let channel = Arc::new(RemoteExecChannel::from_config(&config.exec));
//! let (events, _rx) = EventSink::channel();
//! let mut console = Console::new(assistant, channel, events, &config);
//! let turn = console
//!     .run_turn(&OutboundMessage::operator("nginx returns 502 on web-1"))
//!     .await
//!     .unwrap();
//! println!("{}", turn.display_text);
//! # }
//! ```

pub mod agent;
pub mod channel;
pub mod config;
pub mod console;
pub mod directive;
pub mod error;
pub mod events;
mod http;
pub mod outbound;
pub mod queue;
pub mod render;
pub mod session;
pub mod stream;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
