//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`OPSDESK_ASSISTANT_URL`, `OPSDESK_EXEC_URL`,
//!    `OPSDESK_AUTO_APPROVE`, `OPSDESK_STATE_DIR`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./opsdesk.toml in the current directory
//! 4. $XDG_CONFIG_HOME/opsdesk/opsdesk.toml (platform config dir)
//! 5. Built-in defaults

mod defaults;
mod env;
mod loader;
mod types;

pub use loader::load_config;
pub use types::{
    AgentConfig, AssistantConfig, Config, DecoderConfig, DisplayConfig, ExecConfig, QueueConfig,
    ScrollbackConfig, SessionConfig,
};
