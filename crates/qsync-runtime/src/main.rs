//! qsync: question-lifecycle sync client binary.
//! Single-process binary embedding the connection manager and pipeline.

use std::path::PathBuf;

use clap::Parser;

mod cli;
mod cmd_session;
mod cmd_watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let state_dir = PathBuf::from(args.state_dir.unwrap_or_else(cli::default_state_dir));

    match args.command {
        cli::Command::Login(opts) => cmd_session::cmd_login(&state_dir, &opts)?,
        cli::Command::Logout => cmd_session::cmd_logout(&state_dir)?,
        cli::Command::Status(opts) => cmd_session::cmd_status(&state_dir, &opts)?,
        cli::Command::Watch(opts) => {
            let filter = std::env::var("QSYNC_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("qsync watch starting");
            cmd_watch::cmd_watch(&state_dir, &opts).await?;
        }
    }

    Ok(())
}
