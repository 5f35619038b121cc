//! CLI argument parsing via clap.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Troubleshooting console client: stream assistant replies, review the
/// commands they suggest, and run them on your hosts.
#[derive(Debug, Parser)]
#[command(name = "opsdesk", version)]
pub struct Args {
    /// Path to config file (default: ./opsdesk.toml or ~/.config/opsdesk/opsdesk.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Disable color output.
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a saved reply (plain text or an SSE capture) and print the
    /// display text plus decoded events as JSON.
    Decode {
        /// Transcript file; reads stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Run one command through an execution channel.
    Exec {
        #[command(flatten)]
        channel: ChannelArgs,
        /// Shell command to run.
        command: String,
    },
    /// Chat with the assistant and work through the commands it suggests.
    Chat {
        #[command(flatten)]
        channel: ChannelArgs,
        /// Start a supervised agent session against this target.
        #[arg(long = "agent", value_name = "TARGET")]
        agent: Option<String>,
        /// Forget the stored session id and start a new conversation.
        #[arg(long = "new")]
        new_session: bool,
        /// First message to send.
        message: String,
    },
}

/// Which execution channel to drive.
#[derive(Debug, Clone, ClapArgs)]
pub struct ChannelArgs {
    /// tmux pane to type into and scrape (scrollback channel).
    #[arg(long = "pane", conflicts_with = "remote")]
    pub pane: Option<String>,

    /// Reach the tmux pane over SSH on this host.
    #[arg(long = "ssh", requires = "pane")]
    pub ssh: Option<String>,

    /// SSH ControlPath socket for multiplexed connections.
    #[arg(long = "control-path", requires = "ssh")]
    pub control_path: Option<PathBuf>,

    /// Run through the remote exec service against this target.
    #[arg(long = "remote", value_name = "TARGET")]
    pub remote: Option<String>,
}
