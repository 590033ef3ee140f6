mod chain;
mod normalize;
pub mod providers;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use chain::{ChainError, ChainOutcome, ProviderChain};
pub use normalize::{normalize, sniff_mime};

/// Size and format hints handed to every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDefaults {
    pub width: u32,
    pub height: u32,
    pub format: String,
}

impl Default for ImageDefaults {
    fn default() -> Self {
        Self {
            width: 768,
            height: 768,
            format: "png".to_string(),
        }
    }
}

impl ImageDefaults {
    pub fn request(&self, prompt: &str) -> ImageRequest {
        ImageRequest {
            prompt: prompt.to_string(),
            width: self.width,
            height: self.height,
            format: self.format.clone(),
        }
    }
}

/// Raw bytes as returned by a provider, before normalization.
#[derive(Debug, Clone)]
pub struct ImageBytes {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// A successfully synthesized image, self-contained and ready to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub provider_id: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// A single recovered failure inside the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub error: String,
    #[serde(skip)]
    pub kind: ProviderError,
}

impl ProviderFailure {
    pub fn new(provider_id: &str, kind: ProviderError) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            error: kind.to_string(),
            kind,
        }
    }
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider_id, self.error)
    }
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, request: &ImageRequest) -> Result<ImageBytes, ProviderError>;
}

pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
