//! OpenAI Chat Completions API driver.
//!
//! This module implements [`GenerationClient`] for OpenAI-compatible
//! `/v1/chat/completions` endpoints, streaming assistant text deltas.

use futures::StreamExt;
use serde_json::{Value, json};

use super::sse::data_payloads;
use super::{
    FragmentStream, GenerationClient, GenerationError, GenerationSettings, PromptTurn, SpeakerRole,
};

/// Driver for the OpenAI Chat Completions API.
///
/// Connects to `/v1/chat/completions` with `stream: true` and yields each
/// non-empty `delta.content` as a fragment.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: GenerationSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: GenerationSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Build the JSON request body for `prompt`.
    #[must_use]
    pub fn request_body(&self, prompt: &[PromptTurn]) -> Value {
        let provider = self.settings.provider;
        let messages = prompt
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    SpeakerRole::User => "user",
                    SpeakerRole::Assistant => provider.assistant_role(),
                };
                json!({ "role": role, "content": turn.text })
            })
            .collect::<Vec<_>>();

        let sampling = &self.settings.sampling;
        let mut body = json!({
            "model": self.settings.model,
            "stream": true,
            "messages": messages,
            "temperature": sampling.temperature,
            "top_p": sampling.top_p,
        });
        if provider.supports_top_k() {
            body["top_k"] = json!(sampling.top_k);
        }
        body
    }
}

/// Interpret one streamed chunk; `Ok(None)` means "nothing to emit".
fn delta_text(chunk: &Value) -> Result<Option<String>, GenerationError> {
    if let Some(err) = chunk.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(GenerationError::Service(message));
    }

    Ok(chunk["choices"][0]["delta"]
        .get("content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string))
}

#[async_trait::async_trait]
impl GenerationClient for ChatCompletionsDriver {
    async fn stream(&self, prompt: Vec<PromptTurn>) -> Result<FragmentStream, GenerationError> {
        let url = self
            .settings
            .provider
            .build_stream_url(&self.settings.base_url, &self.settings.model);
        let url = url::Url::parse(&url)
            .map_err(|e| GenerationError::InvalidRequest(format!("{url}: {e}")))?;

        let body = self.request_body(&prompt);

        let mut rb = self.http.post(url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payloads = data_payloads(resp.bytes_stream());

        let out = async_stream::try_stream! {
            futures::pin_mut!(payloads);
            while let Some(data) = payloads.next().await {
                let data = data?;
                if data.trim() == "[DONE]" {
                    break;
                }

                let v = serde_json::from_str::<Value>(&data).map_err(GenerationError::from)?;
                if let Some(text) = delta_text(&v)? {
                    yield text;
                }
            }
        };

        Ok(Box::pin(out))
    }
}
