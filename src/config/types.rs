//! Configuration data model.
//!
//! Struct/enum definitions plus default values. Source discovery and env
//! overrides live in `loader` and `env`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::{
    default_prompt_suffixes, default_tool_deny_list, DEFAULT_ASSISTANT_TIMEOUT_SECS,
    DEFAULT_ASSISTANT_URL, DEFAULT_EXEC_TIMEOUT_SECS, DEFAULT_EXEC_URL,
    DEFAULT_OUTPUT_HEAD_CHARS, DEFAULT_OUTPUT_TAIL_CHARS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SCROLLBACK_TIMEOUT_SECS, DEFAULT_STATE_DIR,
};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub exec: ExecConfig,
    pub scrollback: ScrollbackConfig,
    pub decoder: DecoderConfig,
    pub queue: QueueConfig,
    pub agent: AgentConfig,
    pub session: SessionConfig,
    pub display: DisplayConfig,
}

/// Assistant chat-stream service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ASSISTANT_URL.to_string(),
            timeout_secs: DEFAULT_ASSISTANT_TIMEOUT_SECS,
        }
    }
}

impl AssistantConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Remote-exec service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub base_url: String,
    /// Server-side bound sent with each request; expiry hands back a process
    /// handle for interactive input.
    pub timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EXEC_URL.to_string(),
            timeout_secs: DEFAULT_EXEC_TIMEOUT_SECS,
        }
    }
}

/// Scrollback (interactive terminal) polling policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrollbackConfig {
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
    /// Extra line endings treated as a shell prompt besides `$`, `#`, `>`.
    pub prompt_suffixes: Vec<String>,
}

impl Default for ScrollbackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_secs: DEFAULT_SCROLLBACK_TIMEOUT_SECS,
            prompt_suffixes: default_prompt_suffixes(),
        }
    }
}

impl ScrollbackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Directive decoder policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Tool names that must never be accepted as a suggested shell command.
    pub tool_deny_list: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            tool_deny_list: default_tool_deny_list(),
        }
    }
}

/// Queue report sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub output_head_chars: usize,
    pub output_tail_chars: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            output_head_chars: DEFAULT_OUTPUT_HEAD_CHARS,
            output_tail_chars: DEFAULT_OUTPUT_TAIL_CHARS,
        }
    }
}

/// Supervised-autonomy defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub auto_approve: bool,
}

/// Client-local persisted state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub state_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

/// Display / rendering preferences.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub color: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { color: true }
    }
}
