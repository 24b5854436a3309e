//! Generation client adapters.
//!
//! This module translates a conversation transcript into the request shape a
//! hosted text-generation service expects, opens a streaming call, and hands
//! back the response as a lazy stream of text fragments.
//!
//! # Overview
//!
//! The [`GenerationClient`] trait is the single seam between the transcript
//! controller and the remote service. Implementations return a
//! [`FragmentStream`]: finite, single-pass, yielding fragments in arrival
//! order and ending either normally or after exactly one `Err`.
//!
//! # Clients
//!
//! - [`GeminiDriver`]: Gemini `streamGenerateContent` (`alt=sse`)
//! - [`ChatCompletionsDriver`]: OpenAI-compatible `/v1/chat/completions`
//! - [`EchoClient`]: offline client that streams the last user turn back
//! - [`ScriptedClient`]: deterministic replay client for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use flashchat::llm::{GenerationSettings, build_client};
//!
//! let client = build_client(&settings)?;
//! let mut fragments = client.stream(prompt).await?;
//! ```

pub mod chat_completions;
pub mod gemini;
pub mod provider;
pub mod scripted;
pub mod sse;

pub use chat_completions::ChatCompletionsDriver;
pub use gemini::GeminiDriver;
pub use provider::Provider;
pub use scripted::{EchoClient, ScriptedClient, ScriptedOutcome};

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};

/// Sampling parameters attached to every generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Softmax temperature.
    pub temperature: f32,
    /// Nucleus-sampling threshold.
    pub top_p: f32,
    /// Top-k truncation.
    pub top_k: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

/// Connection and model settings for the generation service.
#[derive(Clone)]
pub struct GenerationSettings {
    /// Base URL of the service (e.g., `https://generativelanguage.googleapis.com`).
    pub base_url: String,
    /// Service credential, supplied out of band.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Provider the settings target.
    pub provider: Provider,
    /// Fixed sampling configuration.
    pub sampling: SamplingConfig,
}

impl std::fmt::Debug for GenerationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("sampling", &self.sampling)
            .finish()
    }
}

/// Speaker of a prompt turn, as seen by the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    /// The human side of the conversation.
    User,
    /// The model side of the conversation.
    Assistant,
}

/// One `{role, text}` pair of the request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    /// Who said it.
    pub role: SpeakerRole,
    /// What was said.
    pub text: String,
}

impl PromptTurn {
    /// Create a user prompt turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: SpeakerRole::User,
            text: text.into(),
        }
    }

    /// Create an assistant prompt turn.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: SpeakerRole::Assistant,
            text: text.into(),
        }
    }
}

/// Failure of a generation request.
///
/// The variants carry detail for logs only; callers treat every variant as
/// "generation request failed".
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The HTTP exchange itself failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as far as it could be read.
        body: String,
    },

    /// The service reported an error inside the stream.
    #[error("service error: {0}")]
    Service(String),

    /// A stream payload could not be decoded.
    #[error("malformed stream payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Lazy, single-pass sequence of generated text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// A remote text-generation capability.
///
/// Implementations must yield each received fragment exactly once, in
/// arrival order, and must not yield anything after an `Err` or after the
/// stream ends.
#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    /// Open a streaming generation call for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call cannot be opened.
    async fn stream(&self, prompt: Vec<PromptTurn>) -> Result<FragmentStream, GenerationError>;
}

/// Build the client for the configured provider.
#[must_use]
pub fn build_client(settings: &GenerationSettings) -> Arc<dyn GenerationClient> {
    match settings.provider {
        Provider::Gemini => Arc::new(GeminiDriver::new(settings.clone())),
        Provider::Echo => Arc::new(EchoClient::default()),
        Provider::OpenAI | Provider::OpenRouter | Provider::Groq | Provider::Generic => {
            Arc::new(ChatCompletionsDriver::new(settings.clone()))
        }
    }
}
