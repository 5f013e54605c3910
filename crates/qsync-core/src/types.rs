use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Role ─────────────────────────────────────────────────────────

/// Authenticated user role. Drives permission checks in consumers;
/// the sync subsystem itself only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Role {
    Client,
    Expert,
    Admin,
    SuperAdmin,
    AdminEditor,
}

impl Role {
    pub const ALL: [Self; 5] = [
        Self::Client,
        Self::Expert,
        Self::Admin,
        Self::SuperAdmin,
        Self::AdminEditor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Expert => "expert",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
            Self::AdminEditor => "admin_editor",
        }
    }

    /// Whether this role belongs to the administrative family
    /// (admin, super_admin, admin_editor).
    pub fn is_admin_class(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin | Self::AdminEditor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "expert" => Ok(Self::Expert),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            "admin_editor" => Ok(Self::AdminEditor),
            _ => Err(ParseEnumError {
                kind: "role",
                value: s.to_owned(),
            }),
        }
    }
}

// ─── Stage ────────────────────────────────────────────────────────

/// Lifecycle stage of a question. Ordered: a question's recorded stage
/// is monotonically non-decreasing over this ordering for a given id.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Stage {
    #[default]
    Processing = 0,
    Reviewing = 1,
    Typing = 2,
    Delivered = 3,
}

impl Stage {
    pub const ALL: [Self; 4] = [
        Self::Processing,
        Self::Reviewing,
        Self::Typing,
        Self::Delivered,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Reviewing => "reviewing",
            Self::Typing => "typing",
            Self::Delivered => "delivered",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "reviewing" => Ok(Self::Reviewing),
            "typing" => Ok(Self::Typing),
            "delivered" => Ok(Self::Delivered),
            _ => Err(ParseEnumError {
                kind: "stage",
                value: s.to_owned(),
            }),
        }
    }
}

// ─── Domain Records ───────────────────────────────────────────────

/// Expert identity attached to an in-flight question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertRef {
    pub name: String,
    pub avatar: Option<String>,
}

/// A question not yet delivered, tracked for real-time display.
///
/// Keyed by `id`, unique across the registry. Removed from the live set
/// exactly when it is promoted into answer history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveQuestion {
    pub id: String,
    pub subject: String,
    pub stage: Stage,
    pub expert: Option<ExpertRef>,
    pub last_updated: DateTime<Utc>,
    pub preview: Option<String>,
}

/// A delivered question retained briefly for display/history.
///
/// Immutable once inserted except for `rating`, settable exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentAnswer {
    pub id: String,
    pub question_text: String,
    pub answer_text: String,
    pub expert_name: String,
    pub subject: String,
    pub rating: Option<u8>,
    pub delivered_at: DateTime<Utc>,
    pub image: Option<String>,
}

/// Aggregate counters surfaced to the UI.
///
/// `notifications` increments on notification-worthy events and resets
/// only via an explicit mark-all-read action. `credits` is set wholesale
/// by authoritative events, never adjusted relatively by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub notifications: u32,
    pub credits: u64,
}

// ─── Error ────────────────────────────────────────────────────────

/// Failed to parse an enum value from its wire string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serde_roundtrip() {
        for r in Role::ALL {
            let json = serde_json::to_string(&r).expect("serialize");
            let back: Role = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(r, back);
        }
    }

    #[test]
    fn role_display_and_parse() {
        for r in Role::ALL {
            let s = r.to_string();
            let parsed = s.parse::<Role>().expect("parse");
            assert_eq!(r, parsed);
        }
    }

    #[test]
    fn role_admin_class() {
        assert!(Role::Admin.is_admin_class());
        assert!(Role::SuperAdmin.is_admin_class());
        assert!(Role::AdminEditor.is_admin_class());
        assert!(!Role::Client.is_admin_class());
        assert!(!Role::Expert.is_admin_class());
    }

    #[test]
    fn role_unknown_string_fails() {
        let err = "moderator".parse::<Role>().unwrap_err();
        assert!(err.to_string().contains("moderator"));
    }

    #[test]
    fn stage_ordering_is_lifecycle_order() {
        assert!(Stage::Processing < Stage::Reviewing);
        assert!(Stage::Reviewing < Stage::Typing);
        assert!(Stage::Typing < Stage::Delivered);
    }

    #[test]
    fn stage_serde_uses_lowercase() {
        let json = serde_json::to_string(&Stage::Reviewing).expect("serialize");
        assert_eq!(json, "\"reviewing\"");
        let back: Stage = serde_json::from_str("\"typing\"").expect("deserialize");
        assert_eq!(back, Stage::Typing);
    }

    #[test]
    fn stage_display_and_parse() {
        for s in Stage::ALL {
            let parsed = s.to_string().parse::<Stage>().expect("parse");
            assert_eq!(s, parsed);
        }
    }

    #[test]
    fn stage_default_is_processing() {
        assert_eq!(Stage::default(), Stage::Processing);
    }

    #[test]
    fn counters_default_zero() {
        let c = Counters::default();
        assert_eq!(c.notifications, 0);
        assert_eq!(c.credits, 0);
    }

    #[test]
    fn live_question_serde_roundtrip() {
        let q = LiveQuestion {
            id: "q-1".into(),
            subject: "Calculus".into(),
            stage: Stage::Typing,
            expert: Some(ExpertRef {
                name: "A. Lee".into(),
                avatar: Some("avatars/lee.png".into()),
            }),
            last_updated: chrono::Utc::now(),
            preview: Some("partial answer…".into()),
        };
        let json = serde_json::to_string(&q).expect("serialize");
        let back: LiveQuestion = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(q, back);
    }
}
