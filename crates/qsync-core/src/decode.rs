//! Decodes raw push frames into typed [`PushEvent`]s.
//!
//! Frames are JSON objects discriminated by a `type` field, with camelCase
//! payload fields. A frame that fails to parse or lacks `type` is an error
//! the caller logs and drops; a frame with an unrecognized `type` decodes
//! to [`DecodedFrame::Unknown`] and is passed through as a no-op.

use serde::{Deserialize, Serialize};

use crate::types::Stage;

// ─── Push Events ──────────────────────────────────────────────────

/// A typed inbound push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// Expert newly assigned to a question.
    #[serde(rename_all = "camelCase")]
    ExpertAssignment {
        question_id: String,
        subject: String,
        expert_name: String,
        expert_avatar: Option<String>,
    },
    /// Lifecycle progress for an in-flight question.
    #[serde(rename_all = "camelCase")]
    StatusUpdate {
        question_id: String,
        stage: Stage,
        preview: Option<String>,
    },
    /// Terminal delivery carrying the full answer payload.
    #[serde(rename_all = "camelCase")]
    AnswerDelivered {
        question_id: String,
        question_text: String,
        answer_text: String,
        expert_name: String,
        subject: String,
        image_ref: Option<String>,
    },
    /// Authoritative credit balance refresh (wholesale, not a delta).
    CreditsUpdate { credits: u64 },
    /// Generic notice, always notification-worthy.
    Notification { message: String },
}

/// Event types the decoder recognizes, matching the serde tag values.
const KNOWN_TYPES: &[&str] = &[
    "expert_assignment",
    "status_update",
    "answer_delivered",
    "credits_update",
    "notification",
];

/// Result of decoding one raw frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// A recognized, fully decoded event.
    Event(PushEvent),
    /// A structurally valid frame with an unrecognized `type`.
    /// No-op for state; diagnostic side effect only.
    Unknown { event_type: String },
}

// ─── Errors ───────────────────────────────────────────────────────

/// A frame that must be dropped. Never fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("malformed {event_type} frame: {detail}")]
    Malformed { event_type: String, detail: String },
}

// ─── Decode ───────────────────────────────────────────────────────

/// Decode one raw frame.
///
/// Two-step: extract the `type` discriminator first so an unrecognized
/// type can be distinguished from a recognized type with missing fields.
pub fn decode_frame(raw: &str) -> Result<DecodedFrame, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;

    let event_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingType)?
        .to_owned();

    if !KNOWN_TYPES.contains(&event_type.as_str()) {
        return Ok(DecodedFrame::Unknown { event_type });
    }

    match serde_json::from_value::<PushEvent>(value) {
        Ok(event) => Ok(DecodedFrame::Event(event)),
        Err(e) => Err(DecodeError::Malformed {
            event_type,
            detail: e.to_string(),
        }),
    }
}

// ─── Tests ────────────────────────────────────────────────────────
