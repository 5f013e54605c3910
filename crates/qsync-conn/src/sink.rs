//! Notification sink: the seam between dispatcher intents and the UI.
//!
//! The core only emits intents; rendering and audio live behind this
//! trait so tests can swap in a recorder.

use qsync_core::dispatch::{Intent, NotifyKind};

/// Consumer of dispatcher side effects. Implemented by the UI layer.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NotifyKind, text: &str);
    fn play_sound(&self, kind: NotifyKind);
}

/// Default sink: structured log lines only. Useful headless and as the
/// fallback when no UI is attached.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, kind: NotifyKind, text: &str) {
        tracing::info!(?kind, %text, "notify");
    }

    fn play_sound(&self, kind: NotifyKind) {
        tracing::debug!(?kind, "play sound");
    }
}

/// Deliver a batch of intents to the sink. Diagnostics never reach the
/// sink; they are log-only by contract.
pub fn deliver(sink: &dyn NotificationSink, intents: &[Intent]) {
    for intent in intents {
        match intent {
            Intent::Notify { kind, text } => sink.notify(*kind, text),
            Intent::PlaySound { kind } => sink.play_sound(*kind),
            Intent::Diagnostic { detail } => {
                tracing::debug!(%detail, "dispatch diagnostic");
            }
        }
    }
}

// ─── Test Support ─────────────────────────────────────────────────

/// Records every call for assertions. Crate-internal test double.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub notifications: std::sync::Mutex<Vec<(NotifyKind, String)>>,
    pub sounds: std::sync::Mutex<Vec<NotifyKind>>,
}

#[cfg(test)]
impl NotificationSink for RecordingSink {
    fn notify(&self, kind: NotifyKind, text: &str) {
        if let Ok(mut log) = self.notifications.lock() {
            log.push((kind, text.to_owned()));
        }
    }

    fn play_sound(&self, kind: NotifyKind) {
        if let Ok(mut log) = self.sounds.lock() {
            log.push(kind);
        }
    }
}
