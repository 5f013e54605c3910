//! Connection state machine and reconnect backoff.
//!
//! Pure, deterministic state machines with no IO or async dependencies.
//! The runtime layer drives them from the transport callbacks and applies
//! jitter to the returned (pre-jitter) delays.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Reconnect Policy ─────────────────────────────────────────────

/// Bounded exponential backoff configuration.
///
/// Jitter (`jitter_pct`) is declared here but MUST be applied by the
/// runtime caller — the pure state machine returns pre-jitter delays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Initial backoff delay in milliseconds (default 1000).
    pub initial_delay_ms: u64,
    /// Backoff multiplier per attempt (default 2.0).
    pub multiplier: f64,
    /// Maximum backoff delay in milliseconds (default 30000).
    pub max_delay_ms: u64,
    /// Jitter percentage applied by the runtime layer (default 0.20 = +/-20%).
    pub jitter_pct: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_pct: 0.20,
        }
    }
}

/// Apply jitter to a pre-jitter delay. `unit` is a uniform sample in
/// [0, 1); the result lies in `delay * (1 ± jitter_pct)`.
pub fn jittered(delay_ms: u64, jitter_pct: f64, unit: f64) -> u64 {
    let spread = 2.0 * jitter_pct * unit.clamp(0.0, 1.0) - jitter_pct;
    let scaled = (delay_ms as f64) * (1.0 + spread);
    scaled.max(0.0) as u64
}

// ─── Reconnect Tracker ────────────────────────────────────────────

/// Tracks consecutive transport failures and computes the next backoff
/// delay. Delays are non-decreasing up to `max_delay_ms`; a successful
/// connection resets the sequence.
#[derive(Debug, Clone)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl ReconnectTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Record a transport failure. Returns the pre-jitter delay to wait
    /// before the next attempt.
    pub fn record_failure(&mut self) -> u64 {
        let raw = (self.policy.initial_delay_ms as f64)
            * self.policy.multiplier.powi(self.attempt as i32);
        let delay = (raw as u64).min(self.policy.max_delay_ms);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Record a successful connection; backoff starts over on the next
    /// failure.
    pub fn record_success(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures since the last success.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

// ─── Link State Machine ───────────────────────────────────────────

/// Connection lifecycle state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action the runtime must take after feeding an input to the FSM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Begin a connection attempt tagged with this generation.
    StartConnect { generation: u64 },
    /// Wait `delay_ms` (plus jitter), then request a new connect.
    ScheduleReconnect { delay_ms: u64 },
    /// Nothing to do (duplicate input, stale generation, or shut down).
    None,
}

/// Explicit finite-state machine for the single logical connection.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`, terminal
/// only on `shutdown()`. Every connection attempt is tagged with a
/// generation; inputs carrying a stale generation are ignored, so results
/// arriving after a shutdown or supersession are discarded rather than
/// applied.
#[derive(Debug, Clone)]
pub struct LinkFsm {
    state: LinkState,
    generation: u64,
    shut_down: bool,
    tracker: ReconnectTracker,
}

impl LinkFsm {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: LinkState::Disconnected,
            generation: 0,
            shut_down: false,
            tracker: ReconnectTracker::new(policy),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Whether a result tagged with `generation` is still current.
    pub fn is_current(&self, generation: u64) -> bool {
        !self.shut_down && generation == self.generation
    }

    /// Request a connection. No-op while already connecting/connected,
    /// after shutdown, or without a token (no credential, no attempt).
    pub fn connect_requested(&mut self, has_token: bool) -> LinkAction {
        if self.shut_down || self.state != LinkState::Disconnected {
            return LinkAction::None;
        }
        if !has_token {
            return LinkAction::None;
        }
        self.generation += 1;
        self.state = LinkState::Connecting;
        LinkAction::StartConnect {
            generation: self.generation,
        }
    }

    /// The attempt tagged `generation` established a connection.
    pub fn established(&mut self, generation: u64) -> LinkAction {
        if !self.is_current(generation) || self.state != LinkState::Connecting {
            return LinkAction::None;
        }
        self.state = LinkState::Connected;
        self.tracker.record_success();
        LinkAction::None
    }

    /// Transport error, server close, or heartbeat timeout on the attempt
    /// tagged `generation`. Schedules a reconnect with bounded backoff.
    pub fn transport_error(&mut self, generation: u64) -> LinkAction {
        if !self.is_current(generation) || self.state == LinkState::Disconnected {
            return LinkAction::None;
        }
        self.state = LinkState::Disconnected;
        let delay_ms = self.tracker.record_failure();
        LinkAction::ScheduleReconnect { delay_ms }
    }

    /// Terminal shutdown. Idempotent, safe from any state; bumps the
    /// generation so in-flight results become stale.
    pub fn shutdown(&mut self) {
        self.shut_down = true;
        self.state = LinkState::Disconnected;
        self.generation += 1;
    }
}

// ─── Tests ────────────────────────────────────────────────────────
