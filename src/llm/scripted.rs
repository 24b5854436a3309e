//! In-process generation clients.
//!
//! [`EchoClient`] backs the `echo` provider for local runs without a
//! credential; [`ScriptedClient`] replays a fixed script and is what the test
//! suites drive the server with.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::{StreamExt, stream};

use super::{FragmentStream, GenerationClient, GenerationError, PromptTurn, SpeakerRole};

/// Streams the most recent user turn back, one word per fragment.
#[derive(Debug, Clone)]
pub struct EchoClient {
    delay: Duration,
}

impl Default for EchoClient {
    fn default() -> Self {
        Self::new(Duration::from_millis(40))
    }
}

impl EchoClient {
    /// Create an echo client pausing `delay` between fragments.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl GenerationClient for EchoClient {
    async fn stream(&self, prompt: Vec<PromptTurn>) -> Result<FragmentStream, GenerationError> {
        let last = prompt
            .iter()
            .rev()
            .find(|t| t.role == SpeakerRole::User)
            .map(|t| t.text.clone())
            .ok_or_else(|| GenerationError::InvalidRequest("no user turn to echo".to_string()))?;

        let delay = self.delay;
        let fragments = last
            .split_inclusive(char::is_whitespace)
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        let out = stream::iter(fragments).then(move |fragment| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, GenerationError>(fragment)
        });

        Ok(Box::pin(out))
    }
}

/// How a [`ScriptedClient`] stream ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// All fragments are delivered, then the stream ends.
    Complete,
    /// The call fails before any fragment is delivered.
    FailToOpen(String),
    /// All fragments are delivered, then one error.
    FailAfterFragments(String),
    /// All fragments are delivered, then the stream never ends.
    Hang,
}

/// Deterministic client replaying fixed fragments and recording prompts.
#[derive(Debug)]
pub struct ScriptedClient {
    fragments: Vec<String>,
    outcome: ScriptedOutcome,
    prompts: Mutex<Vec<Vec<PromptTurn>>>,
}

impl ScriptedClient {
    /// Create a client that yields `fragments` and then ends as `outcome`.
    #[must_use]
    pub fn new<I, S>(fragments: I, outcome: ScriptedOutcome) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            outcome,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a stream that delivers `fragments` and completes.
    #[must_use]
    pub fn completing<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(fragments, ScriptedOutcome::Complete)
    }

    /// Every prompt this client has been called with, oldest first.
    #[must_use]
    pub fn prompts(&self) -> Vec<Vec<PromptTurn>> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl GenerationClient for ScriptedClient {
    async fn stream(&self, prompt: Vec<PromptTurn>) -> Result<FragmentStream, GenerationError> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt);

        let head = stream::iter(self.fragments.clone().into_iter().map(Ok::<_, GenerationError>));

        match &self.outcome {
            ScriptedOutcome::Complete => Ok(Box::pin(head)),
            ScriptedOutcome::FailToOpen(message) => Err(GenerationError::Service(message.clone())),
            ScriptedOutcome::FailAfterFragments(message) => {
                let tail = stream::once(futures::future::ready(Err(GenerationError::Service(
                    message.clone(),
                ))));
                Ok(Box::pin(head.chain(tail)))
            }
            ScriptedOutcome::Hang => Ok(Box::pin(head.chain(stream::pending()))),
        }
    }
}
