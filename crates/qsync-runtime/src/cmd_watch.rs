//! `qsync watch`: run the connection manager and pipeline in-process,
//! logging link transitions and registry changes until interrupted.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use qsync_conn::{ConnectionConfig, ConnectionManager, EventPipeline, TracingSink};
use qsync_core::registry::LiveQuestionRegistry;
use qsync_session::{FileSessionStorage, RehydrateOutcome, SessionStore};

use crate::cli::WatchOpts;

pub async fn cmd_watch(state_dir: &Path, opts: &WatchOpts) -> anyhow::Result<()> {
    let mut store = SessionStore::new(Box::new(FileSessionStorage::new(state_dir)));
    match store.rehydrate()? {
        RehydrateOutcome::Restored(session) => {
            tracing::info!(user = %session.display_name, role = %session.role, "session restored");
        }
        RehydrateOutcome::Absent => {
            tracing::warn!("no persisted session; run `qsync login` first");
        }
        RehydrateOutcome::Corrupt(e) => {
            tracing::warn!("persisted session was corrupt and has been cleared: {e}");
        }
    }
    let session = Arc::new(Mutex::new(store));

    let registry = Arc::new(Mutex::new(LiveQuestionRegistry::new()));
    let pipeline = EventPipeline::new(Arc::clone(&registry), Arc::new(TracingSink), 256);
    let handle = pipeline.handle();
    let worker = tokio::spawn(pipeline.run());

    let mut config = ConnectionConfig::new(opts.url.as_str());
    config.heartbeat_timeout = Duration::from_secs(opts.heartbeat_secs);

    let cancel = CancellationToken::new();
    let (manager, mut state_rx) = ConnectionManager::new(config, session, cancel);
    let manager = Arc::new(manager);
    let runner = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run(handle).await })
    };

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut last_version = 0;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = sigterm.recv() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::info!(state = %*state_rx.borrow_and_update(), "link");
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                let registry = registry.lock().await;
                if registry.version() != last_version {
                    last_version = registry.version();
                    let snap = registry.snapshot();
                    tracing::info!(
                        live = snap.live_count(),
                        history = snap.history.len(),
                        unread = snap.counters.notifications,
                        credits = snap.counters.credits,
                        "registry changed"
                    );
                }
            }
        }
    }

    tracing::info!("shutting down");
    manager.shutdown();
    runner.await?;
    worker.await?;
    Ok(())
}
