//! Conversation turns and the ordered transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::PromptTurn;

/// Opaque identifier of a [`Turn`], stable for the turn's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(Uuid);

impl TurnId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TurnId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human input.
    User,
    /// Generated response.
    Assistant,
}

/// One utterance in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    id: TurnId,
    role: Role,
    content: String,
    created_at: DateTime<Utc>,
}

impl Turn {
    /// A user turn with fixed content.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// An empty assistant turn, grown by [`Transcript::append_to`].
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(Role::Assistant, String::new())
    }

    fn new(role: Role, content: String) -> Self {
        Self {
            id: TurnId::new(),
            role,
            content,
            created_at: Utc::now(),
        }
    }

    /// Identifier of this turn.
    #[must_use]
    pub fn id(&self) -> TurnId {
        self.id
    }

    /// Author of this turn.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current text body.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Capture time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The request-payload form of this turn.
    #[must_use]
    pub fn to_prompt(&self) -> PromptTurn {
        match self.role {
            Role::User => PromptTurn::user(self.content.clone()),
            Role::Assistant => PromptTurn::assistant(self.content.clone()),
        }
    }
}

/// Ordered, append-only sequence of turns.
///
/// Insertion order is display order. The only in-place mutation is content
/// growth through [`Transcript::append_to`]; the only removal is
/// [`Transcript::clear`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn at the end.
    pub fn push(&mut self, turn: Turn) {
        debug_assert!(self.get(turn.id()).is_none(), "duplicate turn id");
        self.turns.push(turn);
    }

    /// Append `text` to the turn with `id`.
    ///
    /// Returns the turn's new content length, or `None` if no such turn exists.
    pub fn append_to(&mut self, id: TurnId, text: &str) -> Option<usize> {
        let turn = self.turns.iter_mut().find(|t| t.id == id)?;
        turn.content.push_str(text);
        Some(turn.content.len())
    }

    /// Look up a turn by id.
    #[must_use]
    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    /// All turns in display order.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether there are no turns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Remove every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Request payload for the whole transcript.
    #[must_use]
    pub fn to_prompt(&self) -> Vec<PromptTurn> {
        self.turns.iter().map(Turn::to_prompt).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_to_matching_turn() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::user("Hi"));
        let placeholder = Turn::placeholder();
        let id = placeholder.id();
        transcript.push(placeholder);

        assert_eq!(transcript.append_to(id, "He"), Some(2));
        assert_eq!(transcript.append_to(id, "llo"), Some(5));
        assert_eq!(transcript.get(id).unwrap().content(), "Hello");
        assert_eq!(transcript.turns()[0].content(), "Hi");
    }

    #[test]
    fn test_append_to_missing_turn() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::user("Hi"));
        let before = transcript.clone();

        assert_eq!(transcript.append_to(TurnId::new(), "ignored"), None);
        assert_eq!(transcript, before);
    }

    #[test]
    fn test_prompt_roles() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::user("Hi"));
        transcript.push(Turn::placeholder());

        let prompt = transcript.to_prompt();
        assert_eq!(prompt, vec![PromptTurn::user("Hi"), PromptTurn::assistant("")]);
    }

    #[test]
    fn test_turn_id_round_trips_through_display() {
        let id = TurnId::new();
        assert_eq!(id.to_string().parse::<TurnId>().unwrap(), id);
    }
}
