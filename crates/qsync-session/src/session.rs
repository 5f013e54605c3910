//! The authenticated session and its store.

use serde::{Deserialize, Serialize};

use qsync_core::types::Role;

use crate::storage::{SessionStorage, StorageError};

// ─── Session ──────────────────────────────────────────────────────

/// The authenticated identity. Exactly one is live per store; created on
/// login or startup rehydration, destroyed on logout or corrupt-record
/// recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    /// Opaque bearer credential for outbound requests and the connection
    /// handshake.
    pub token: String,
    /// Whether this session has been written to durable storage.
    pub persisted: bool,
}

/// Initials derived on demand from the display name (first letter of the
/// first two words). Pure derivation, never a cached field.
pub fn initials(display_name: &str) -> String {
    display_name
        .split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

// ─── Persisted Form ───────────────────────────────────────────────

/// On-disk payload under the `auth-storage` key:
/// `{user, token, isAuthenticated}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    user: StoredUser,
    token: String,
    is_authenticated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredUser {
    id: String,
    display_name: String,
    role: Role,
}

// ─── Rehydration ──────────────────────────────────────────────────

/// The persisted record could not be parsed. The store has already
/// erased it; the caller routes the user to re-authenticate.
#[derive(Debug, thiserror::Error)]
#[error("persisted session is corrupt: {detail}")]
pub struct CorruptSessionError {
    pub detail: String,
}

/// Result of a startup rehydration attempt.
#[derive(Debug)]
pub enum RehydrateOutcome {
    Restored(Session),
    /// Nothing persisted.
    Absent,
    /// Record was unparseable; it has been erased and no session is live.
    Corrupt(CorruptSessionError),
}

// ─── Store ────────────────────────────────────────────────────────

/// Owns the current session and its durable persistence. Explicitly
/// constructed with an injected backend — never an ambient global.
pub struct SessionStore {
    current: Option<Session>,
    storage: Box<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(storage: Box<dyn SessionStorage>) -> Self {
        Self {
            current: None,
            storage,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.current.as_ref().is_some_and(|s| s.role == role)
    }

    /// Bearer credential for outbound requests and the next connect
    /// attempt. `None` suppresses connection attempts entirely.
    pub fn bearer_token(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.token.as_str())
    }

    /// Install a session and persist `{user, token, isAuthenticated}`.
    pub fn set_session(&mut self, mut session: Session) -> Result<(), StorageError> {
        let stored = StoredSession {
            user: StoredUser {
                id: session.user_id.clone(),
                display_name: session.display_name.clone(),
                role: session.role,
            },
            token: session.token.clone(),
            is_authenticated: true,
        };
        // StoredSession serialization cannot fail: plain strings and enums.
        let payload = serde_json::to_string(&stored).map_err(std::io::Error::other)?;
        self.storage.save(&payload)?;
        session.persisted = true;
        self.current = Some(session);
        Ok(())
    }

    /// Destroy the live session and erase the durable record.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.current = None;
        self.storage.erase()
    }

    /// Reconstruct the session from durable storage on process start.
    ///
    /// A payload that fails to parse is erased and reported as
    /// [`RehydrateOutcome::Corrupt`]; a half-populated session is never
    /// produced and corruption is never fatal.
    pub fn rehydrate(&mut self) -> Result<RehydrateOutcome, StorageError> {
        let Some(payload) = self.storage.load()? else {
            self.current = None;
            return Ok(RehydrateOutcome::Absent);
        };

        let stored: StoredSession = match serde_json::from_str(&payload) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("corrupt persisted session, clearing: {e}");
                self.storage.erase()?;
                self.current = None;
                return Ok(RehydrateOutcome::Corrupt(CorruptSessionError {
                    detail: e.to_string(),
                }));
            }
        };

        if !stored.is_authenticated {
            self.current = None;
            return Ok(RehydrateOutcome::Absent);
        }

        let session = Session {
            user_id: stored.user.id,
            display_name: stored.user.display_name,
            role: stored.user.role,
            token: stored.token,
            persisted: true,
        };
        self.current = Some(session.clone());
        Ok(RehydrateOutcome::Restored(session))
    }
}

// ─── Tests ────────────────────────────────────────────────────────
