//! Shared session handles and session storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm::{GenerationClient, GenerationError};
use crate::normalized::{GenerationId, TranscriptEvent};

use super::controller::{
    GENERATION_FAILED_MESSAGE, GenerationRequest, TranscriptController, TranscriptSnapshot,
};

/// A single browser conversation.
///
/// Cloning yields another handle to the same conversation. All mutation goes
/// through the inner [`TranscriptController`], whose lock is never held
/// across an `.await`.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Unique session identifier.
    id: String,
    /// Conversation state.
    controller: Mutex<TranscriptController>,
    /// Last activity time.
    last_activity: RwLock<DateTime<Utc>>,
}

impl Session {
    /// Create a new session with the given ID.
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionInner {
                id,
                controller: Mutex::new(TranscriptController::new()),
                last_activity: RwLock::new(now),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    fn controller(&self) -> MutexGuard<'_, TranscriptController> {
        self.inner
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-only view of the conversation.
    #[must_use]
    pub fn snapshot(&self) -> TranscriptSnapshot {
        let snapshot = self.controller().snapshot();
        self.touch();
        snapshot
    }

    /// Snapshot and change subscription taken atomically, so the receiver
    /// sees exactly the events that follow the snapshot.
    #[must_use]
    pub fn subscribe(&self) -> (TranscriptSnapshot, broadcast::Receiver<TranscriptEvent>) {
        let subscription = {
            let controller = self.controller();
            (controller.snapshot(), controller.subscribe())
        };
        self.touch();
        subscription
    }

    /// Submit user text; see [`TranscriptController::submit_user_text`].
    pub fn submit(&self, text: &str) -> Option<GenerationRequest> {
        let request = self.controller().submit_user_text(text);
        self.touch();
        request
    }

    /// Submit user text and, if accepted, stream the response on a new task.
    pub fn submit_and_spawn(
        &self,
        text: &str,
        client: Arc<dyn GenerationClient>,
    ) -> Option<GenerationRequest> {
        let request = self.submit(text)?;

        let session = self.clone();
        let spawned = request.clone();
        tokio::spawn(async move {
            session.run_generation(client.as_ref(), spawned).await;
        });

        Some(request)
    }

    /// Reset the conversation; see [`TranscriptController::clear`].
    pub fn clear(&self) {
        self.controller().clear();
        self.touch();
    }

    /// Open the generation stream for `request` and fold every fragment
    /// into its placeholder until the stream ends or fails.
    pub async fn run_generation(&self, client: &dyn GenerationClient, request: GenerationRequest) {
        let GenerationRequest {
            generation,
            placeholder_id,
            prompt,
        } = request;

        info!(
            name: "generation.started",
            session_id = %self.id(),
            generation,
            prompt_turns = prompt.len(),
            "Generation started"
        );

        let mut fragments = match client.stream(prompt).await {
            Ok(s) => s,
            Err(e) => {
                self.fail(generation, &e);
                return;
            }
        };

        let mut received = 0usize;
        let mut ignored = 0usize;
        let mut content_length = 0usize;
        while let Some(item) = fragments.next().await {
            match item {
                Ok(text) => {
                    received += 1;
                    content_length += text.len();
                    if !self.controller().on_fragment(placeholder_id, &text) {
                        ignored += 1;
                        debug!(
                            session_id = %self.id(),
                            generation,
                            turn_id = %placeholder_id,
                            "Fragment for missing turn ignored"
                        );
                    }
                    self.touch();
                }
                Err(e) => {
                    debug!(
                        session_id = %self.id(),
                        generation,
                        fragments = received,
                        content_length,
                        "Stream failed after partial output"
                    );
                    self.fail(generation, &e);
                    return;
                }
            }
        }

        let attached = self.controller().on_stream_complete(generation);
        self.touch();
        info!(
            name: "generation.completed",
            session_id = %self.id(),
            generation,
            fragments = received,
            content_length,
            ignored,
            attached,
            "Generation completed"
        );
    }

    fn fail(&self, generation: GenerationId, error: &GenerationError) {
        warn!(
            name: "generation.failed",
            session_id = %self.id(),
            generation,
            error = %error,
            "Generation failed"
        );
        self.controller()
            .on_stream_error(generation, GENERATION_FAILED_MESSAGE);
        self.touch();
    }

    /// Update the last activity timestamp.
    fn touch(&self) {
        let mut guard = self
            .inner
            .last_activity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Utc::now();
    }

    /// Check if the session has been inactive longer than `timeout`.
    ///
    /// A session with a live event subscriber is an open page and never
    /// expires.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        if self.controller().subscriber_count() > 0 {
            return false;
        }
        let last = *self
            .inner
            .last_activity
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        // Negative duration means clock skew; treat as active.
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }
}

/// Thread-safe store for sessions.
///
/// Provides methods for creating, retrieving, and cleaning up sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a new session store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create a new session and return it.
    #[must_use]
    pub fn create(&self) -> Session {
        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone());
        self.write().insert(id, session.clone());
        session
    }

    /// Get a session by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.read().get(id).cloned()
    }

    /// Remove a session by ID.
    pub fn remove(&self, id: &str) -> Option<Session> {
        self.write().remove(id)
    }

    /// Get the number of active sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions that have been inactive longer than the timeout.
    ///
    /// Returns the number of sessions removed.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = self.write();
        let before = guard.len();
        guard.retain(|_, session| !session.is_expired_with_timeout(timeout));
        before - guard.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ScriptedClient, ScriptedOutcome};

    #[test]
    fn test_session_store() {
        let store = SessionStore::new();

        assert!(store.is_empty());

        let session = store.create();
        assert_eq!(store.len(), 1);

        let retrieved = store.get(session.id()).unwrap();
        assert_eq!(retrieved.id(), session.id());

        store.remove(session.id());
        assert!(store.is_empty());
    }

    #[test]
    fn test_cleanup_expired() {
        let store = SessionStore::new();
        let _ = store.create();

        assert_eq!(store.cleanup_expired_with_timeout(Duration::from_secs(60)), 0);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.cleanup_expired_with_timeout(Duration::ZERO), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_run_generation_streams_into_placeholder() {
        let session = SessionStore::new().create();
        let client = ScriptedClient::completing(["He", "llo"]);

        let request = session.submit("Hi").unwrap();
        session.run_generation(&client, request).await;

        let snap = session.snapshot();
        assert!(!snap.loading);
        assert!(snap.error.is_none());
        assert_eq!(snap.turns[1].content(), "Hello");
        assert_eq!(client.prompts()[0].len(), 1);
    }

    #[tokio::test]
    async fn test_run_generation_failure_to_open() {
        let session = SessionStore::new().create();
        let client = ScriptedClient::new(Vec::<String>::new(), ScriptedOutcome::FailToOpen("down".into()));

        let request = session.submit("Hi").unwrap();
        session.run_generation(&client, request).await;

        let snap = session.snapshot();
        assert!(!snap.loading);
        assert_eq!(snap.error.as_deref(), Some(GENERATION_FAILED_MESSAGE));
        assert_eq!(snap.turns[1].content(), "");
    }

    #[tokio::test]
    async fn test_run_generation_partial_then_error() {
        let session = SessionStore::new().create();
        let client = ScriptedClient::new(
            ["Par", "tial"],
            ScriptedOutcome::FailAfterFragments("reset by peer".into()),
        );

        let request = session.submit("Hi").unwrap();
        session.run_generation(&client, request).await;

        let snap = session.snapshot();
        assert!(!snap.loading);
        assert!(snap.error.is_some());
        assert_eq!(snap.turns[1].content(), "Partial");
    }

    #[test]
    fn test_watched_session_is_not_swept() {
        let store = SessionStore::new();
        let session = store.create();
        let (_, rx) = session.subscribe();

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.cleanup_expired_with_timeout(Duration::ZERO), 0);
        assert!(store.get(session.id()).is_some());

        drop(rx);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.cleanup_expired_with_timeout(Duration::ZERO), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_reads_count_as_activity() {
        let store = SessionStore::new();
        let session = store.create();

        std::thread::sleep(Duration::from_millis(30));
        assert!(session.is_expired_with_timeout(Duration::from_millis(25)));

        let _ = session.snapshot();
        assert!(!session.is_expired_with_timeout(Duration::from_millis(25)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_during_generation_drops_late_fragments() {
        let session = SessionStore::new().create();
        let client = ScriptedClient::completing(["late"]);

        let request = session.submit("Hi").unwrap();
        session.clear();
        assert!(session.snapshot().loading);
        session.run_generation(&client, request).await;

        let snap = session.snapshot();
        assert!(snap.turns.is_empty());
        assert!(snap.error.is_none());
        assert!(!snap.loading);
    }

    #[tokio::test]
    async fn test_submit_after_clear_waits_for_open_stream() {
        let session = SessionStore::new().create();
        let client: Arc<dyn GenerationClient> =
            Arc::new(ScriptedClient::new(["one"], ScriptedOutcome::Hang));

        assert!(session.submit_and_spawn("one", Arc::clone(&client)).is_some());
        session.clear();
        assert!(session.submit_and_spawn("two", Arc::clone(&client)).is_none());

        let snap = session.snapshot();
        assert!(snap.loading);
        assert!(snap.turns.is_empty());
    }
}
