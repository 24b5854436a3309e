//! Single-writer conversation state.
//!
//! A [`TranscriptController`] owns one transcript together with its loading
//! flag and session-level error. It is mutated only through the operations
//! below; readers get a [`TranscriptSnapshot`] plus a change notification via
//! [`TranscriptController::subscribe`].

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::llm::PromptTurn;
use crate::normalized::{GenerationId, TranscriptEvent};

use super::transcript::{Transcript, Turn, TurnId};

/// Message shown to the user when a generation request fails.
pub const GENERATION_FAILED_MESSAGE: &str =
    "Failed to generate response. Please check your connection.";

/// Capacity of the per-session change-notification channel.
const EVENT_CAPACITY: usize = 1024;

/// Work order produced by an accepted submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Generation attempt this request belongs to.
    pub generation: GenerationId,
    /// Placeholder that receives the streamed fragments.
    pub placeholder_id: TurnId,
    /// Transcript as of just after the new user turn (placeholder excluded).
    pub prompt: Vec<PromptTurn>,
}

/// Read-only view of a session's conversation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSnapshot {
    /// Turns in display order.
    pub turns: Vec<Turn>,
    /// Whether a generation request is in flight.
    pub loading: bool,
    /// Session-level error message, if the last attempt failed.
    pub error: Option<String>,
    /// Number of mutations applied so far.
    pub revision: u64,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    generation: GenerationId,
    placeholder_id: TurnId,
}

/// Owner of one conversation's state.
#[derive(Debug)]
pub struct TranscriptController {
    transcript: Transcript,
    in_flight: Option<InFlight>,
    error: Option<String>,
    next_generation: GenerationId,
    revision: u64,
    events: broadcast::Sender<TranscriptEvent>,
}

impl Default for TranscriptController {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptController {
    /// Create a controller with an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transcript: Transcript::new(),
            in_flight: None,
            error: None,
            next_generation: 1,
            revision: 0,
            events,
        }
    }

    /// Append a user turn and an assistant placeholder, and start loading.
    ///
    /// Returns `None` without touching any state when `text` is blank or a
    /// generation is already in flight.
    pub fn submit_user_text(&mut self, text: &str) -> Option<GenerationRequest> {
        if text.trim().is_empty() || self.in_flight.is_some() {
            return None;
        }

        let user = Turn::user(text);
        self.transcript.push(user.clone());
        self.publish(TranscriptEvent::TurnAppended { turn: user });

        let prompt = self.transcript.to_prompt();

        let placeholder = Turn::placeholder();
        let placeholder_id = placeholder.id();
        self.transcript.push(placeholder.clone());
        self.publish(TranscriptEvent::TurnAppended { turn: placeholder });

        let generation = self.next_generation;
        self.next_generation += 1;
        self.in_flight = Some(InFlight {
            generation,
            placeholder_id,
        });
        self.error = None;
        self.publish(TranscriptEvent::GenerationStarted {
            generation,
            placeholder_id,
        });

        Some(GenerationRequest {
            generation,
            placeholder_id,
            prompt,
        })
    }

    /// Append a streamed fragment to the turn with `turn_id`.
    ///
    /// Returns `false`, changing nothing, when the turn no longer exists.
    pub fn on_fragment(&mut self, turn_id: TurnId, text: &str) -> bool {
        if self.transcript.append_to(turn_id, text).is_none() {
            return false;
        }
        self.publish(TranscriptEvent::TurnDelta {
            turn_id,
            text: text.to_string(),
        });
        true
    }

    /// End the loading state after a normal stream end.
    ///
    /// Ignored unless `generation` is the one in flight.
    pub fn on_stream_complete(&mut self, generation: GenerationId) -> bool {
        if !self.finish(generation) {
            return false;
        }
        self.publish(TranscriptEvent::GenerationDone { generation });
        true
    }

    /// End the loading state and record `message` as the session error.
    ///
    /// Fragments already received stay in the placeholder. Ignored unless
    /// `generation` is the one in flight.
    pub fn on_stream_error(&mut self, generation: GenerationId, message: impl Into<String>) -> bool {
        if !self.finish(generation) {
            return false;
        }
        let message = message.into();
        self.error = Some(message.clone());
        self.publish(TranscriptEvent::GenerationFailed {
            generation,
            message,
        });
        true
    }

    /// Reset to an empty transcript with no error.
    ///
    /// An in-flight generation keeps the session loading until its stream
    /// ends; its fragments target a turn that no longer exists and are dropped.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.error = None;
        self.publish(TranscriptEvent::TranscriptCleared);
    }

    /// Whether a generation request is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Current session-level error.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The assistant turn currently receiving fragments.
    #[must_use]
    pub fn open_turn(&self) -> Option<&Turn> {
        self.in_flight
            .and_then(|f| self.transcript.get(f.placeholder_id))
    }

    /// Current transcript.
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Read-only copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            turns: self.transcript.turns().to_vec(),
            loading: self.is_loading(),
            error: self.error.clone(),
            revision: self.revision,
        }
    }

    /// Subscribe to change notifications from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.events.subscribe()
    }

    /// Number of live change subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn finish(&mut self, generation: GenerationId) -> bool {
        match self.in_flight {
            Some(f) if f.generation == generation => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }

    fn publish(&mut self, event: TranscriptEvent) {
        self.revision += 1;
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn contents(c: &TranscriptController) -> Vec<(Role, String)> {
        c.transcript()
            .turns()
            .iter()
            .map(|t| (t.role(), t.content().to_string()))
            .collect()
    }

    #[test]
    fn test_submit_appends_user_and_placeholder() {
        let mut c = TranscriptController::new();
        let req = c.submit_user_text("Hi").expect("accepted");

        assert_eq!(
            contents(&c),
            vec![(Role::User, "Hi".to_string()), (Role::Assistant, String::new())]
        );
        assert!(c.is_loading());
        assert_eq!(req.prompt, vec![PromptTurn::user("Hi")]);
        assert_eq!(c.open_turn().map(Turn::id), Some(req.placeholder_id));
    }

    #[test]
    fn test_each_submit_grows_by_two_and_preserves_prior_turns() {
        let mut c = TranscriptController::new();
        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            let before = c.transcript().turns().to_vec();
            let req = c.submit_user_text(text).expect("accepted");
            c.on_fragment(req.placeholder_id, "ok");
            c.on_stream_complete(req.generation);

            assert_eq!(c.transcript().len(), 2 * (i + 1));
            assert_eq!(&c.transcript().turns()[..before.len()], before.as_slice());
        }

        let req = c.submit_user_text("four").unwrap();
        assert_eq!(
            req.prompt,
            vec![
                PromptTurn::user("one"),
                PromptTurn::assistant("ok"),
                PromptTurn::user("two"),
                PromptTurn::assistant("ok"),
                PromptTurn::user("three"),
                PromptTurn::assistant("ok"),
                PromptTurn::user("four"),
            ]
        );
    }

    #[test]
    fn test_blank_submit_is_noop() {
        let mut c = TranscriptController::new();
        assert!(c.submit_user_text("").is_none());
        assert!(c.submit_user_text("  \t\n").is_none());
        assert!(c.transcript().is_empty());
        assert!(!c.is_loading());
        assert_eq!(c.snapshot().revision, 0);
    }

    #[test]
    fn test_submit_while_loading_is_rejected() {
        let mut c = TranscriptController::new();
        c.submit_user_text("first").unwrap();
        let before = c.snapshot();

        assert!(c.submit_user_text("second").is_none());
        assert_eq!(c.snapshot(), before);
    }

    #[test]
    fn test_fragments_concatenate_in_order() {
        let mut c = TranscriptController::new();
        let req = c.submit_user_text("Hi").unwrap();
        for fragment in ["Hel", "lo", " there"] {
            assert!(c.on_fragment(req.placeholder_id, fragment));
        }
        assert_eq!(c.open_turn().unwrap().content(), "Hello there");
    }

    #[test]
    fn test_fragment_after_clear_is_ignored() {
        let mut c = TranscriptController::new();
        let req = c.submit_user_text("Hi").unwrap();
        c.clear();

        assert!(!c.on_fragment(req.placeholder_id, "late"));
        assert!(c.transcript().is_empty());
        assert!(c.error().is_none());
    }

    #[test]
    fn test_error_keeps_partial_content() {
        let mut c = TranscriptController::new();
        let req = c.submit_user_text("Hi").unwrap();
        c.on_fragment(req.placeholder_id, "partial");

        assert!(c.on_stream_error(req.generation, GENERATION_FAILED_MESSAGE));

        let snap = c.snapshot();
        assert!(!snap.loading);
        assert_eq!(snap.error.as_deref(), Some(GENERATION_FAILED_MESSAGE));
        assert_eq!(snap.turns[1].content(), "partial");
    }

    #[test]
    fn test_next_submit_clears_error() {
        let mut c = TranscriptController::new();
        let req = c.submit_user_text("Hi").unwrap();
        c.on_stream_error(req.generation, "failed");

        c.submit_user_text("again").unwrap();
        assert!(c.error().is_none());
        assert_eq!(c.transcript().len(), 4);
    }

    #[test]
    fn test_clear_always_resets() {
        let mut c = TranscriptController::new();
        c.clear();
        assert!(c.transcript().is_empty());

        let req = c.submit_user_text("Hi").unwrap();
        c.on_stream_error(req.generation, "failed");
        c.clear();

        let snap = c.snapshot();
        assert!(snap.turns.is_empty());
        assert!(snap.error.is_none());
        assert!(!snap.loading);
    }

    #[test]
    fn test_clear_mid_stream_keeps_single_generation() {
        let mut c = TranscriptController::new();
        let old = c.submit_user_text("Hi").unwrap();
        c.on_fragment(old.placeholder_id, "Hel");
        c.clear();

        assert!(c.is_loading());
        assert!(c.transcript().is_empty());
        assert!(c.submit_user_text("Hello").is_none());
        assert!(c.transcript().is_empty());

        assert!(!c.on_fragment(old.placeholder_id, "lo"));
        assert!(c.on_stream_complete(old.generation));
        assert!(!c.is_loading());
        assert!(c.transcript().is_empty());

        let next = c.submit_user_text("Hello").unwrap();
        assert_ne!(next.generation, old.generation);
        assert_eq!(next.prompt, vec![PromptTurn::user("Hello")]);
    }

    #[test]
    fn test_stale_generation_signals_are_ignored() {
        let mut c = TranscriptController::new();
        let old = c.submit_user_text("Hi").unwrap();
        c.on_stream_complete(old.generation);
        let new = c.submit_user_text("Again").unwrap();

        assert!(!c.on_stream_error(old.generation, "late failure"));
        assert!(!c.on_stream_complete(old.generation));
        assert!(c.is_loading());
        assert!(c.error().is_none());

        assert!(c.on_stream_complete(new.generation));
        assert!(!c.is_loading());
    }

    #[test]
    fn test_scenario_hi_hello() {
        let mut c = TranscriptController::new();
        let req = c.submit_user_text("Hi").unwrap();
        assert!(c.snapshot().loading);

        c.on_fragment(req.placeholder_id, "He");
        c.on_fragment(req.placeholder_id, "llo");
        assert_eq!(
            contents(&c),
            vec![(Role::User, "Hi".to_string()), (Role::Assistant, "Hello".to_string())]
        );

        c.on_stream_complete(req.generation);
        let snap = c.snapshot();
        assert!(!snap.loading);
        assert!(snap.error.is_none());
    }

    #[test]
    fn test_change_notifications() {
        let mut c = TranscriptController::new();
        let mut rx = c.subscribe();

        let req = c.submit_user_text("Hi").unwrap();
        c.on_fragment(req.placeholder_id, "Yo");
        c.on_stream_complete(req.generation);

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(crate::normalized::event_name(&event));
        }
        assert_eq!(
            names,
            vec![
                "turn.appended",
                "turn.appended",
                "generation.started",
                "turn.delta",
                "generation.done"
            ]
        );
        assert_eq!(c.snapshot().revision, 5);
    }
}
