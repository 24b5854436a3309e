use std::path::Path;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::llm::{GenerationSettings, Provider, SamplingConfig};

/// Environment variable prefix for configuration keys, e.g. `FLASHCHAT_SERVER__PORT`.
pub const ENV_PREFIX: &str = "FLASHCHAT";

/// Plain environment variables consulted for the service credential, in order.
pub const API_KEY_ENV_VARS: [&str; 3] = ["API_KEY", "GEMINI_API_KEY", "OPENAI_API_KEY"];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Generation provider: auto, gemini, openai, openrouter, groq, generic, echo
    #[arg(long, env = "LLM_PROVIDER")]
    pub provider: Option<String>,

    /// Model identifier
    #[arg(long, env = "LLM_MODEL")]
    pub model: Option<String>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,
}

/// Errors raised while assembling configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Command-line arguments could not be parsed.
    #[error("invalid arguments: {0}")]
    Cli(#[from] clap::Error),

    /// A source could not be read or deserialized.
    #[error("invalid configuration: {0}")]
    Source(#[from] config::ConfigError),

    /// `generation.provider` names no known provider.
    #[error("unknown generation provider: {0}")]
    UnknownProvider(String),

    /// The selected provider needs a credential and none was supplied.
    #[error("missing API key for provider {0:?}; set API_KEY or generation.api_key")]
    MissingApiKey(Provider),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub resilience: ResilienceConfig,
    pub session: SessionConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Deserialize, Clone)]
pub struct GenerationConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args)?;

        // Priority: CLI flag > CLI env var > prefixed env > config file > defaults.
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 30)?
            .set_default("session.idle_timeout_secs", 30 * 60)?
            .set_default("session.sweep_interval_secs", 60)?
            .set_default("generation.provider", "auto")?
            .set_default(
                "generation.base_url",
                "https://generativelanguage.googleapis.com",
            )?
            .set_default("generation.model", "gemini-2.5-flash-lite-latest")?
            .set_default("generation.temperature", 0.7)?
            .set_default("generation.top_p", 0.8)?
            .set_default("generation.top_k", 40)?;

        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None if Path::new("config.yaml").exists() => {
                builder.add_source(File::with_name("config.yaml").required(false))
            }
            None => builder,
        };

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(provider) = cli.provider {
            builder = builder.set_override("generation.provider", provider)?;
        }
        if let Some(model) = cli.model {
            builder = builder.set_override("generation.model", model)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }

        let mut cfg: Self = builder.build()?.try_deserialize()?;

        // The credential is supplied out of band; plain env vars fill the gap.
        if cfg.generation.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            cfg.generation.api_key = API_KEY_ENV_VARS
                .iter()
                .find_map(|name| std::env::var(name).ok())
                .filter(|k| !k.trim().is_empty());
        }

        Ok(cfg)
    }

    /// Socket address the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Per-request timeout, or `None` when disabled.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (!self.resilience.timeout_disabled)
            .then(|| Duration::from_secs(self.resilience.request_timeout_secs))
    }

    #[must_use]
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session.idle_timeout_secs)
    }

    #[must_use]
    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session.sweep_interval_secs.max(1))
    }

    /// Resolve the generation settings, validating provider and credential.
    pub fn generation_settings(&self) -> Result<GenerationSettings, ConfigError> {
        let g = &self.generation;
        let provider = Provider::from_name(&g.provider, &g.base_url)
            .ok_or_else(|| ConfigError::UnknownProvider(g.provider.clone()))?;

        let api_key = g.api_key.clone().filter(|k| !k.trim().is_empty());
        if provider.requires_api_key() && api_key.is_none() {
            return Err(ConfigError::MissingApiKey(provider));
        }

        Ok(GenerationSettings {
            base_url: g.base_url.clone(),
            api_key,
            model: g.model.clone(),
            provider,
            sampling: SamplingConfig {
                temperature: g.temperature,
                top_p: g.top_p,
                top_k: g.top_k,
            },
        })
    }
}
