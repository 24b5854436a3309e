//! Gemini `streamGenerateContent` driver.
//!
//! This module implements [`GenerationClient`] for the Gemini REST API using
//! the SSE variant of the streaming endpoint (`?alt=sse`).

use futures::StreamExt;
use serde_json::{Value, json};

use super::provider::Provider;
use super::sse::data_payloads;
use super::{
    FragmentStream, GenerationClient, GenerationError, GenerationSettings, PromptTurn, SpeakerRole,
};

/// Driver for the Gemini streaming API.
#[derive(Clone)]
pub struct GeminiDriver {
    http: reqwest::Client,
    settings: GenerationSettings,
}

impl std::fmt::Debug for GeminiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl GeminiDriver {
    /// Create a new Gemini driver with the given settings.
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
        let contents = prompt
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    SpeakerRole::User => "user",
                    SpeakerRole::Assistant => Provider::Gemini.assistant_role(),
                };
                json!({ "role": role, "parts": [{ "text": turn.text }] })
            })
            .collect::<Vec<_>>();

        let sampling = &self.settings.sampling;
        json!({
            "contents": contents,
            "generationConfig": {
                "temperature": sampling.temperature,
                "topP": sampling.top_p,
                "topK": sampling.top_k,
            }
        })
    }
}

/// Extract the text carried by one streamed `GenerateContentResponse`.
///
/// Returns `Ok(None)` for chunks without text (e.g. the final chunk that only
/// carries `finishReason` and usage metadata).
fn chunk_text(chunk: &Value) -> Result<Option<String>, GenerationError> {
    if let Some(err) = chunk.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(GenerationError::Service(message));
    }

    let text = chunk["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}

#[async_trait::async_trait]
impl GenerationClient for GeminiDriver {
    async fn stream(&self, prompt: Vec<PromptTurn>) -> Result<FragmentStream, GenerationError> {
        let url = Provider::Gemini.build_stream_url(&self.settings.base_url, &self.settings.model);
        let url = url::Url::parse(&url)
            .map_err(|e| GenerationError::InvalidRequest(format!("{url}: {e}")))?;

        let body = self.request_body(&prompt);

        let mut rb = self.http.post(url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = rb.header("x-goog-api-key", k);
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
                let v = serde_json::from_str::<Value>(&data).map_err(GenerationError::from)?;
                if let Some(text) = chunk_text(&v)? {
                    yield text;
                }
            }
        };

        Ok(Box::pin(out))
    }
}
