//! CLI definition using clap derive.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "qsync", about = "real-time question sync client")]
pub struct Cli {
    /// State directory for the persisted session
    /// (default: $XDG_STATE_HOME/qsync or ~/.local/state/qsync)
    #[arg(long, global = true)]
    pub state_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a session token for the push stream
    Login(LoginOpts),
    /// Destroy the persisted session
    Logout,
    /// Show the persisted session, if any
    Status(StatusOpts),
    /// Connect to the push stream and log state changes
    Watch(WatchOpts),
}

#[derive(clap::Args)]
pub struct LoginOpts {
    /// Bearer token issued by the dashboard backend
    #[arg(long, env = "QSYNC_TOKEN")]
    pub token: String,

    /// User id
    #[arg(long)]
    pub user_id: String,

    /// Display name
    #[arg(long)]
    pub name: String,

    /// Role: client, expert, admin, super_admin, admin_editor
    #[arg(long, default_value = "client")]
    pub role: String,
}

#[derive(clap::Args)]
pub struct StatusOpts {
    /// Emit JSON instead of plain text
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct WatchOpts {
    /// Push stream endpoint
    #[arg(long, env = "QSYNC_URL", default_value = "ws://127.0.0.1:9001/events")]
    pub url: String,

    /// Heartbeat timeout in seconds
    #[arg(long, default_value = "45")]
    pub heartbeat_secs: u64,
}

/// Per-user state dir, following the XDG layout.
pub fn default_state_dir() -> String {
    if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
        return format!("{dir}/qsync");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.local/state/qsync")
}
