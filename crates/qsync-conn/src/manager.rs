//! WebSocket connection manager.
//!
//! Owns the single logical push-event connection: token-gated connect,
//! bearer handshake, heartbeat supervision, reconnect with bounded
//! exponential backoff (+jitter), and idempotent cancellation. Decoding
//! happens downstream in the pipeline; a frame that fails to parse never
//! tears the connection down.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use qsync_core::link::{LinkAction, LinkFsm, LinkState, ReconnectPolicy, jittered};
use qsync_session::SessionStore;

use crate::pipeline::PipelineHandle;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Heartbeat silence is a transport error, same path as a close.
#[derive(Debug, thiserror::Error)]
#[error("no frame within heartbeat window ({0:?})")]
struct HeartbeatTimeout(Duration);

// ─── Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Push stream endpoint (ws:// or wss://).
    pub url: String,
    /// Max silence before the connection is declared dead.
    pub heartbeat_timeout: Duration,
    /// How often to re-check for a token while unauthenticated.
    pub token_recheck: Duration,
    pub policy: ReconnectPolicy,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_timeout: Duration::from_secs(45),
            token_recheck: Duration::from_secs(1),
            policy: ReconnectPolicy::default(),
        }
    }
}

// ─── Manager ──────────────────────────────────────────────────────

/// Drives the connection FSM against the real transport. Exactly one
/// connection is live at a time; `run()` blocks until shutdown.
pub struct ConnectionManager {
    config: ConnectionConfig,
    session: Arc<Mutex<SessionStore>>,
    cancel: CancellationToken,
    state_tx: watch::Sender<LinkState>,
}

impl ConnectionManager {
    /// Returns the manager and a watch receiver publishing the current
    /// [`LinkState`] (for a passive "reconnecting" indicator).
    pub fn new(
        config: ConnectionConfig,
        session: Arc<Mutex<SessionStore>>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<LinkState>) {
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        (
            Self {
                config,
                session,
                cancel,
                state_tx,
            },
            state_rx,
        )
    }

    /// Idempotent shutdown: cancels pending backoff sleeps and any live
    /// connection; no further frames are forwarded afterward.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Connect/listen/reconnect until cancelled.
    ///
    /// Without a bearer token no attempt is made — the manager idles in
    /// `Disconnected` and re-checks periodically.
    pub async fn run(&self, pipeline: PipelineHandle) {
        let mut fsm = LinkFsm::new(self.config.policy.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let token = {
                let session = self.session.lock().await;
                session.bearer_token().map(ToOwned::to_owned)
            };
            let Some(token) = token else {
                self.state_tx.send_replace(LinkState::Disconnected);
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = sleep(self.config.token_recheck) => {}
                }
                continue;
            };

            let LinkAction::StartConnect { generation } = fsm.connect_requested(true) else {
                break;
            };
            self.state_tx.send_replace(LinkState::Connecting);

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.open(&token) => result,
            };
            match opened {
                Ok(ws) => {
                    fsm.established(generation);
                    self.state_tx.send_replace(LinkState::Connected);
                    tracing::info!(url = %self.config.url, "connected to push stream");

                    match self.listen(ws, &pipeline).await {
                        Ok(()) => tracing::info!("push stream closed"),
                        Err(e) => tracing::warn!("push stream transport error: {e}"),
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.config.url, "connect failed: {e}");
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }

            let LinkAction::ScheduleReconnect { delay_ms } = fsm.transport_error(generation)
            else {
                break;
            };
            self.state_tx.send_replace(LinkState::Disconnected);

            let delay = jittered(delay_ms, self.config.policy.jitter_pct, jitter_unit());
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(Duration::from_millis(delay)) => {
                    tracing::info!(delay_ms = delay, "reconnecting");
                }
            }
        }

        fsm.shutdown();
        self.state_tx.send_replace(LinkState::Disconnected);
        tracing::info!("connection manager stopped");
    }

    /// Single connection attempt with the bearer handshake.
    async fn open(&self, token: &str) -> Result<WsStream, BoxError> {
        let mut request = self.config.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        Ok(ws)
    }

    /// Read frames until close, transport error, heartbeat silence, or
    /// cancellation. Text frames are forwarded raw; the pipeline decodes
    /// and drops malformed ones without affecting the connection.
    async fn listen(&self, ws: WsStream, pipeline: &PipelineHandle) -> Result<(), BoxError> {
        let (_write, mut read) = ws.split();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                next = timeout(self.config.heartbeat_timeout, read.next()) => {
                    match next {
                        Err(_elapsed) => {
                            return Err(Box::new(HeartbeatTimeout(self.config.heartbeat_timeout)));
                        }
                        Ok(Some(Ok(Message::Text(text)))) => {
                            if pipeline.push_frame(text).await.is_err() {
                                tracing::warn!("pipeline closed, dropping connection");
                                return Ok(());
                            }
                        }
                        // Pings are answered by tungstenite; binary frames
                        // are not part of the protocol.
                        Ok(Some(Ok(_other))) => {}
                        Ok(Some(Err(e))) => return Err(Box::new(e)),
                        Ok(None) => return Ok(()),
                    }
                }
            }
        }
    }
}

/// Uniform-ish jitter sample from the subsecond clock. Good enough to
/// spread reconnect storms without a rand dependency.
fn jitter_unit() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos) / 1e9
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ConnectionConfig::new("ws://localhost:9001/events");
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(45));
        assert_eq!(config.token_recheck, Duration::from_secs(1));
        assert_eq!(config.policy, ReconnectPolicy::default());
    }

    #[test]
    fn jitter_unit_in_range() {
        for _ in 0..100 {
            let unit = jitter_unit();
            assert!((0.0..1.0).contains(&unit), "got {unit}");
        }
    }
}
