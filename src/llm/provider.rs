//! Provider-specific configuration and detection.
//!
//! This module handles differences between generation services, including
//! URL patterns, authentication headers, role labels, and sampling support.

/// Supported generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Google Gemini (generativelanguage.googleapis.com)
    Gemini,
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// `OpenRouter` (openrouter.ai)
    OpenRouter,
    /// Groq (groq.com)
    Groq,
    /// Generic OpenAI-compatible provider
    Generic,
    /// Local echo client, no network
    Echo,
}

impl Provider {
    /// Detect provider from base URL.
    ///
    /// # Example
    ///
    /// ```rust
    /// use flashchat::llm::Provider;
    ///
    /// let provider = Provider::detect_from_url("https://generativelanguage.googleapis.com");
    /// assert_eq!(provider, Provider::Gemini);
    /// ```
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("generativelanguage.googleapis.com") {
            Self::Gemini
        } else if lower.contains("openrouter.ai") {
            Self::OpenRouter
        } else if lower.contains("groq.com") {
            Self::Groq
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Resolve a configured provider name; `auto` falls back to URL detection.
    ///
    /// Returns `None` for unknown names.
    #[must_use]
    pub fn from_name(name: &str, base_url: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "" | "auto" => Some(Self::detect_from_url(base_url)),
            "gemini" | "google" => Some(Self::Gemini),
            "openai" => Some(Self::OpenAI),
            "openrouter" => Some(Self::OpenRouter),
            "groq" => Some(Self::Groq),
            "generic" | "openai-compatible" => Some(Self::Generic),
            "echo" => Some(Self::Echo),
            _ => None,
        }
    }

    /// Whether this provider needs a credential to be usable.
    #[must_use]
    pub fn requires_api_key(self) -> bool {
        matches!(self, Self::Gemini | Self::OpenAI | Self::OpenRouter | Self::Groq)
    }

    /// Whether the provider accepts a top-k sampling parameter.
    #[must_use]
    pub fn supports_top_k(self) -> bool {
        match self {
            Self::Gemini | Self::OpenRouter | Self::Generic => true,
            Self::OpenAI | Self::Groq | Self::Echo => false,
        }
    }

    /// Role label the provider uses for the model side of the conversation.
    #[must_use]
    pub fn assistant_role(self) -> &'static str {
        match self {
            Self::Gemini => "model",
            _ => "assistant",
        }
    }

    /// Build the streaming endpoint URL for this provider.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL (trailing slashes are ignored)
    /// * `model` - The model name
    #[must_use]
    pub fn build_stream_url(self, base_url: &str, model: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::Gemini => {
                format!("{base}/v1beta/models/{model}:streamGenerateContent?alt=sse")
            }
            _ if base.ends_with("/v1") => format!("{base}/chat/completions"),
            _ => format!("{base}/v1/chat/completions"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_gemini() {
        let provider = Provider::detect_from_url("https://generativelanguage.googleapis.com");
        assert_eq!(provider, Provider::Gemini);
    }

    #[test]
    fn test_detect_openai() {
        let provider = Provider::detect_from_url("https://api.openai.com");
        assert_eq!(provider, Provider::OpenAI);
    }

    #[test]
    fn test_detect_openrouter() {
        let provider = Provider::detect_from_url("https://openrouter.ai/api");
        assert_eq!(provider, Provider::OpenRouter);
    }

    #[test]
    fn test_detect_generic() {
        let provider = Provider::detect_from_url("http://localhost:8000");
        assert_eq!(provider, Provider::Generic);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Provider::from_name("auto", "https://api.groq.com"), Some(Provider::Groq));
        assert_eq!(Provider::from_name("Echo", ""), Some(Provider::Echo));
        assert_eq!(Provider::from_name("bogus", ""), None);
    }

    #[test]
    fn test_build_url_gemini() {
        let url = Provider::Gemini.build_stream_url(
            "https://generativelanguage.googleapis.com/",
            "gemini-2.5-flash-lite-latest",
        );
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-lite-latest:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_build_url_openai() {
        let url = Provider::OpenAI.build_stream_url("https://api.openai.com", "gpt-4o");
        assert_eq!(url, "https://api.openai.com/v1/chat/completions");

        let url = Provider::Generic.build_stream_url("http://localhost:8000/v1/", "m");
        assert_eq!(url, "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(Provider::Gemini.assistant_role(), "model");
        assert_eq!(Provider::OpenAI.assistant_role(), "assistant");
    }
}
