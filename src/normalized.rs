//! Transcript change events streamed to the browser.
//!
//! Every mutation a [`TranscriptController`](crate::session::TranscriptController)
//! performs is published as one [`TranscriptEvent`]. The page subscribes over
//! SSE, receives a [`TranscriptEvent::Snapshot`] first, and then applies the
//! incremental events in order.
//!
//! # Example
//!
//! ```rust
//! use flashchat::normalized::{TranscriptEvent, event_name};
//!
//! let event = TranscriptEvent::TranscriptCleared;
//! assert_eq!(event_name(&event), "transcript.cleared");
//! ```

use axum::response::sse::Event;
use serde::{Deserialize, Serialize};

use crate::session::{TranscriptSnapshot, Turn, TurnId};

/// Monotonic identifier of one generation attempt within a session.
pub type GenerationId = u64;

/// Change notifications for a session's transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum TranscriptEvent {
    /// Full read-only view; sent first on every subscription.
    #[serde(rename = "snapshot")]
    Snapshot(TranscriptSnapshot),

    /// A turn was appended at the end of the transcript.
    #[serde(rename = "turn.appended")]
    TurnAppended {
        /// The new turn.
        turn: Turn,
    },

    /// Text was appended to an existing turn.
    #[serde(rename = "turn.delta")]
    TurnDelta {
        /// Target turn.
        turn_id: TurnId,
        /// The fragment to append.
        text: String,
    },

    /// A generation request was started; the session is loading.
    #[serde(rename = "generation.started")]
    GenerationStarted {
        /// Generation attempt.
        generation: GenerationId,
        /// Placeholder receiving the fragments.
        placeholder_id: TurnId,
    },

    /// The generation stream completed.
    #[serde(rename = "generation.done")]
    GenerationDone {
        /// Generation attempt.
        generation: GenerationId,
    },

    /// The generation request failed.
    #[serde(rename = "generation.error")]
    GenerationFailed {
        /// Generation attempt.
        generation: GenerationId,
        /// User-facing error message.
        message: String,
    },

    /// The transcript was reset to empty.
    #[serde(rename = "transcript.cleared")]
    TranscriptCleared,
}

/// Get the SSE event name for a [`TranscriptEvent`].
pub fn event_name(evt: &TranscriptEvent) -> &'static str {
    match evt {
        TranscriptEvent::Snapshot(_) => "snapshot",
        TranscriptEvent::TurnAppended { .. } => "turn.appended",
        TranscriptEvent::TurnDelta { .. } => "turn.delta",
        TranscriptEvent::GenerationStarted { .. } => "generation.started",
        TranscriptEvent::GenerationDone { .. } => "generation.done",
        TranscriptEvent::GenerationFailed { .. } => "generation.error",
        TranscriptEvent::TranscriptCleared => "transcript.cleared",
    }
}

/// Convert a [`TranscriptEvent`] into an axum SSE event.
///
/// The `event:` field carries [`event_name`]; `data:` carries the JSON form.
pub fn sse_event(evt: &TranscriptEvent) -> Event {
    let json = serde_json::to_string(evt).unwrap_or_else(|e| {
        serde_json::json!({ "type": "generation.error", "data": { "message": e.to_string() } })
            .to_string()
    });

    Event::default().event(event_name(evt)).data(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_serialization() {
        let turn_id = TurnId::new();
        let event = TranscriptEvent::TurnDelta {
            turn_id,
            text: "Hello".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "turn.delta");
        assert_eq!(json["data"]["text"], "Hello");
        assert_eq!(json["data"]["turn_id"], turn_id.to_string());
    }

    #[test]
    fn test_event_names_match_serde_tags() {
        let events = [
            TranscriptEvent::TranscriptCleared,
            TranscriptEvent::GenerationDone { generation: 1 },
            TranscriptEvent::GenerationFailed {
                generation: 1,
                message: "x".to_string(),
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event_name(&event));
        }
    }
}
