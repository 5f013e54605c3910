//! Single-writer domain state container.
//!
//! [`RegistrySnapshot`] is the immutable value the dispatcher transforms;
//! [`LiveQuestionRegistry`] holds the committed snapshot, a monotonic
//! version counter for cheap change polling, and the derived queries
//! consumers need. Only the serialized event pipeline calls [`commit`].
//!
//! [`commit`]: LiveQuestionRegistry::commit

use std::collections::BTreeMap;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{Counters, LiveQuestion, RecentAnswer};

/// Capacity of the recent-answer history; inserting beyond this evicts
/// the oldest entry.
pub const RECENT_ANSWER_CAP: usize = 8;

// ─── Snapshot ─────────────────────────────────────────────────────

/// Immutable view of the domain state at one point in the event stream.
///
/// Invariant: an id is never present in both `live` and `history`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// In-flight questions keyed by id (BTreeMap for deterministic order).
    pub live: BTreeMap<String, LiveQuestion>,
    /// Recently delivered answers, newest first, capacity [`RECENT_ANSWER_CAP`].
    pub history: VecDeque<RecentAnswer>,
    pub counters: Counters,
}

impl RegistrySnapshot {
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn contains_live(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    pub fn history_contains(&self, id: &str) -> bool {
        self.history.iter().any(|a| a.id == id)
    }

    /// Live questions in deterministic (id) order.
    pub fn live_questions(&self) -> impl Iterator<Item = &LiveQuestion> {
        self.live.values()
    }
}

// ─── Registry ─────────────────────────────────────────────────────

/// Version counter for change tracking.
pub type StateVersion = u64;

/// Holds the committed snapshot. Single writer: only the serialized
/// event-processing path commits; readers receive cloned snapshots.
#[derive(Debug, Default)]
pub struct LiveQuestionRegistry {
    snapshot: RegistrySnapshot,
    version: StateVersion,
}

impl LiveQuestionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state as an immutable view.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.snapshot.clone()
    }

    /// Commit the next snapshot. Bumps the version only when the state
    /// actually changed, so pollers can skip no-op commits.
    pub fn commit(&mut self, next: RegistrySnapshot) -> StateVersion {
        if next != self.snapshot {
            self.snapshot = next;
            self.version += 1;
        }
        self.version
    }

    /// Monotonic version, bumped per state-changing commit.
    pub fn version(&self) -> StateVersion {
        self.version
    }

    // ── Derived queries ─────────────────────────────────────────

    pub fn live_count(&self) -> usize {
        self.snapshot.live_count()
    }

    pub fn unread_notifications(&self) -> u32 {
        self.snapshot.counters.notifications
    }

    pub fn credits(&self) -> u64 {
        self.snapshot.counters.credits
    }
}

// ─── Tests ────────────────────────────────────────────────────────
