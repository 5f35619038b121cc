//! Unified error types for the console.

use std::fmt;

// ---------------------------------------------------------------------------
// DirectiveError
// ---------------------------------------------------------------------------

/// A directive tag whose payload could not be parsed.
///
/// Never fatal: the decoder logs it and drops that one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveError {
    pub tag: String,
    pub message: String,
}

impl DirectiveError {
    pub fn new(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DirectiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} payload: {}", self.tag, self.message)
    }
}

impl std::error::Error for DirectiveError {}

// ---------------------------------------------------------------------------
// ChannelError
// ---------------------------------------------------------------------------

/// Errors from the execution channel layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// No live connection to the execution target. Blocking; not retried.
    NotConnected(String),
    /// The channel kind does not offer this operation.
    Unsupported(&'static str),
    /// Transport-level failure outside of a running command.
    Transport(String),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected(target) => write!(f, "channel not connected: {target}"),
            Self::Unsupported(op) => write!(f, "operation not supported by this channel: {op}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

impl std::error::Error for ChannelError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Errors from the assistant chat-stream transport.
#[derive(Debug)]
pub enum ApiError {
    /// Network / reqwest-level error.
    Http(reqwest::Error),
    /// Non-2xx status from the service.
    Status(u16, String),
    /// Payload did not match the stream protocol.
    InvalidResponse(String),
    /// No response headers arrived within the configured bound.
    Timeout(std::time::Duration),
    /// The operator aborted the in-flight stream read.
    Aborted,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Status(code, body) => write!(f, "status {code}: {body}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            Self::Timeout(after) => write!(f, "no response within {}s", after.as_secs()),
            Self::Aborted => write!(f, "stream aborted"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// QueueError
// ---------------------------------------------------------------------------

/// Errors from command-queue operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    UnknownQueue(String),
    UnknownItem { queue: String, item: String },
    /// The item already reached a terminal status.
    NotPending { queue: String, item: String },
    /// The item has no outstanding manual capture or interactive process.
    NothingOutstanding { queue: String, item: String },
    /// Display recovery found no rendered cards for the batch.
    NothingToReconstruct(String),
    Channel(ChannelError),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownQueue(queue) => write!(f, "unknown queue `{queue}`"),
            Self::UnknownItem { queue, item } => write!(f, "unknown item `{item}` in {queue}"),
            Self::NotPending { queue, item } => {
                write!(f, "item `{item}` in {queue} is no longer pending")
            }
            Self::NothingOutstanding { queue, item } => {
                write!(f, "item `{item}` in {queue} has nothing awaiting completion")
            }
            Self::NothingToReconstruct(queue) => {
                write!(f, "no rendered cards found for {queue}")
            }
            Self::Channel(e) => write!(f, "channel: {e}"),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<ChannelError> for QueueError {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Errors from agent-session control operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `approve`/`reject` without a step awaiting approval.
    NoPendingStep,
    /// `send_input` without a step blocked on interactive input.
    NoPendingInput,
    /// The session already reached a terminal status.
    Finished(String),
    /// No agent session is active on the console.
    NoSession,
    Channel(ChannelError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPendingStep => write!(f, "no step is awaiting approval"),
            Self::NoPendingInput => write!(f, "no step is waiting for input"),
            Self::Finished(status) => write!(f, "session already {status}"),
            Self::NoSession => write!(f, "no agent session is active"),
            Self::Channel(e) => write!(f, "channel: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ChannelError> for SessionError {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}
