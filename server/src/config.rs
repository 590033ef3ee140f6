// Configuration for the server and the prompt pipeline, read from the environment

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use image_core::providers::{
    OpenAiImagesProvider, PollinationsProvider, DEFAULT_OPENAI_IMAGES_URL,
    DEFAULT_OPENAI_IMAGE_MODEL, DEFAULT_POLLINATIONS_URL,
};
use image_core::{ImageDefaults, ImageProvider, ProviderChain};
use llm_core::{ModelPicker, OpenAiCompatClient, DEFAULT_MODEL};
use prompt_core::{EngineSettings, Pipeline, PipelineSettings, PromptEngine, DEFAULT_PREAMBLE};
use tracing::{info, warn};

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 120,
            max_body_bytes: 8 * 1024 * 1024,
            cors_allowed_origins: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_or("PORT", defaults.port),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            cors_allowed_origins: env_list("CORS_ALLOWED_ORIGINS"),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub llm_models: Vec<String>,
    pub llm_max_tokens: u16,
    pub llm_timeout_secs: u64,
    pub preamble: String,
    pub window_size: usize,
    pub cooldown_ms: u64,
    pub fragment_separator: String,
    pub max_conversations: usize,
    pub conversation_idle_secs: u64,
    pub max_turn_chars: usize,
    pub max_prompt_chars: usize,
    pub providers: Vec<ProviderConfig>,
    pub image_width: u32,
    pub image_height: u32,
    pub image_format: String,
    pub provider_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        let pipeline = PipelineSettings::default();
        let image = ImageDefaults::default();
        Self {
            llm_models: vec![DEFAULT_MODEL.to_string()],
            llm_max_tokens: engine.max_tokens,
            llm_timeout_secs: engine.timeout.as_secs(),
            preamble: DEFAULT_PREAMBLE.to_string(),
            window_size: pipeline.window_size,
            cooldown_ms: pipeline.cooldown.as_millis() as u64,
            fragment_separator: pipeline.separator,
            max_conversations: pipeline.max_conversations,
            conversation_idle_secs: pipeline.idle_timeout.as_secs(),
            max_turn_chars: engine.max_turn_chars,
            max_prompt_chars: engine.max_prompt_chars,
            providers: vec![
                ProviderConfig {
                    id: "openai".to_string(),
                    base_url: DEFAULT_OPENAI_IMAGES_URL.to_string(),
                    api_key: None,
                    model: Some(DEFAULT_OPENAI_IMAGE_MODEL.to_string()),
                },
                ProviderConfig {
                    id: "pollinations".to_string(),
                    base_url: DEFAULT_POLLINATIONS_URL.to_string(),
                    api_key: None,
                    model: None,
                },
            ],
            image_width: image.width,
            image_height: image.height,
            image_format: image.format,
            provider_timeout_secs: 45,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let order = env_list("IMAGE_PROVIDERS")
            .unwrap_or_else(|| d.providers.iter().map(|p| p.id.clone()).collect());
        let providers = order
            .into_iter()
            .filter_map(|id| match id.as_str() {
                "openai" => Some(ProviderConfig {
                    id,
                    base_url: env_string("OPENAI_IMAGES_URL")
                        .unwrap_or_else(|| DEFAULT_OPENAI_IMAGES_URL.to_string()),
                    api_key: env_string("OPENAI_API_KEY"),
                    model: Some(
                        env_string("OPENAI_IMAGE_MODEL")
                            .unwrap_or_else(|| DEFAULT_OPENAI_IMAGE_MODEL.to_string()),
                    ),
                }),
                "pollinations" => Some(ProviderConfig {
                    id,
                    base_url: env_string("POLLINATIONS_URL")
                        .unwrap_or_else(|| DEFAULT_POLLINATIONS_URL.to_string()),
                    api_key: None,
                    model: None,
                }),
                other => {
                    warn!("Unknown image provider '{}' in IMAGE_PROVIDERS, skipping", other);
                    None
                }
            })
            .collect();

        Self {
            llm_models: env_list("LLM_MODELS").unwrap_or(d.llm_models),
            llm_max_tokens: env_or("LLM_MAX_TOKENS", d.llm_max_tokens),
            llm_timeout_secs: env_or("LLM_TIMEOUT_SECS", d.llm_timeout_secs),
            preamble: env_string("PREAMBLE").unwrap_or(d.preamble),
            window_size: env_or("WINDOW_SIZE", d.window_size),
            cooldown_ms: env_or("COOLDOWN_MS", d.cooldown_ms),
            // separator is taken verbatim, whitespace included
            fragment_separator: std::env::var("FRAGMENT_SEPARATOR")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(d.fragment_separator),
            max_conversations: env_or("MAX_CONVERSATIONS", d.max_conversations),
            conversation_idle_secs: env_or("CONVERSATION_IDLE_SECS", d.conversation_idle_secs),
            max_turn_chars: env_or("MAX_TURN_CHARS", d.max_turn_chars),
            max_prompt_chars: env_or("MAX_PROMPT_CHARS", d.max_prompt_chars),
            providers,
            image_width: env_or("IMAGE_WIDTH", d.image_width),
            image_height: env_or("IMAGE_HEIGHT", d.image_height),
            image_format: env_string("IMAGE_FORMAT").unwrap_or(d.image_format),
            provider_timeout_secs: env_or("PROVIDER_TIMEOUT_SECS", d.provider_timeout_secs),
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            preamble: self.preamble.clone(),
            window_size: self.window_size,
            cooldown: Duration::from_millis(self.cooldown_ms),
            separator: self.fragment_separator.clone(),
            max_conversations: self.max_conversations,
            idle_timeout: Duration::from_secs(self.conversation_idle_secs),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_tokens: self.llm_max_tokens,
            max_turn_chars: self.max_turn_chars,
            max_prompt_chars: self.max_prompt_chars,
            timeout: self.llm_timeout(),
        }
    }

    pub fn image_defaults(&self) -> ImageDefaults {
        ImageDefaults {
            width: self.image_width,
            height: self.image_height,
            format: self.image_format.clone(),
        }
    }

    /// Instantiates the configured providers in order. A provider missing its
    /// credential is left out of the chain rather than failing every call.
    pub fn build_providers(&self) -> Vec<Arc<dyn ImageProvider>> {
        let timeout = self.provider_timeout();
        let mut providers: Vec<Arc<dyn ImageProvider>> = Vec::new();
        for provider in &self.providers {
            let built: Result<Arc<dyn ImageProvider>, _> = match provider.id.as_str() {
                "openai" => OpenAiImagesProvider::new(
                    &provider.base_url,
                    provider.api_key.as_deref().unwrap_or_default(),
                    provider.model.as_deref().unwrap_or(DEFAULT_OPENAI_IMAGE_MODEL),
                    timeout,
                )
                .map(|p| Arc::new(p) as Arc<dyn ImageProvider>),
                "pollinations" => PollinationsProvider::new(&provider.base_url, timeout)
                    .map(|p| Arc::new(p) as Arc<dyn ImageProvider>),
                other => {
                    warn!("No implementation for image provider '{}'", other);
                    continue;
                }
            };
            match built {
                Ok(p) => providers.push(p),
                Err(e) => warn!("Image provider {} disabled: {}", provider.id, e),
            }
        }
        providers
    }

    pub fn build_pipeline(&self) -> anyhow::Result<Pipeline> {
        let client = OpenAiCompatClient::from_env(self.llm_timeout())
            .context("language model client could not be configured")?;
        let picker = ModelPicker::new(self.llm_models.clone())
            .context("LLM_MODELS must name at least one model")?;
        let engine = PromptEngine::new(Arc::new(client), picker, self.engine_settings());

        let providers = self.build_providers();
        if providers.is_empty() {
            warn!("No image providers available, every response will be message-only");
        }
        let chain = ProviderChain::new(providers, self.image_defaults(), self.provider_timeout());
        info!(
            "Pipeline: models={:?}, providers={:?}, window={}, cooldown={}ms",
            self.llm_models,
            chain.provider_names(),
            self.window_size,
            self.cooldown_ms
        );
        Ok(Pipeline::new(self.pipeline_settings(), engine, chain))
    }
}
