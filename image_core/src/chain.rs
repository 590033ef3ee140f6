use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::{normalize, GeneratedImage, ImageDefaults, ImageProvider, ProviderError, ProviderFailure};

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("no image providers configured")]
    NoProviders,

    #[error("all {} image providers failed (last: {last})", .failures.len())]
    AllProvidersExhausted {
        last: ProviderFailure,
        failures: Vec<ProviderFailure>,
    },
}

#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub image: GeneratedImage,
    /// Providers that failed before `image.provider_id` succeeded, in order.
    pub failures: Vec<ProviderFailure>,
}

/// Ordered fallback over image providers: one attempt each, first success wins.
pub struct ProviderChain {
    providers: Vec<Arc<dyn ImageProvider>>,
    defaults: ImageDefaults,
    per_call_timeout: Duration,
}

impl ProviderChain {
    pub fn new(
        providers: Vec<Arc<dyn ImageProvider>>,
        defaults: ImageDefaults,
        per_call_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            defaults,
            per_call_timeout,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn generate(&self, prompt: &str) -> Result<ChainOutcome, ChainError> {
        let request = self.defaults.request(prompt);
        let mut failures: Vec<ProviderFailure> = Vec::new();

        for provider in &self.providers {
            let name = provider.name();
            let started = Instant::now();
            let attempt = match tokio::time::timeout(self.per_call_timeout, provider.generate(&request)).await {
                Ok(result) => result.and_then(|raw| normalize(name, raw)),
                Err(_) => Err(ProviderError::Timeout(self.per_call_timeout)),
            };

            match attempt {
                Ok(image) => {
                    info!(
                        "Image from {} in {:.2}s ({}x{}, {}, {} bytes)",
                        name,
                        started.elapsed().as_secs_f64(),
                        image.width,
                        image.height,
                        image.mime_type,
                        image.bytes.len()
                    );
                    return Ok(ChainOutcome { image, failures });
                }
                Err(err) => {
                    warn!("Image provider {} failed, trying next: {}", name, err);
                    failures.push(ProviderFailure::new(name, err));
                }
            }
        }

        match failures.last().cloned() {
            Some(last) => Err(ChainError::AllProvidersExhausted { last, failures }),
            None => Err(ChainError::NoProviders),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImageBytes, ImageRequest};
    use async_trait::async_trait;

    struct Broken;

    #[async_trait]
    impl ImageProvider for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn generate(&self, _request: &ImageRequest) -> Result<ImageBytes, ProviderError> {
            Err(ProviderError::Http {
                status: 503,
                body: "down".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_empty_chain_reports_no_providers() {
        let chain = ProviderChain::new(Vec::new(), ImageDefaults::default(), Duration::from_secs(1));
        assert!(chain.is_empty());
        assert!(matches!(chain.generate("x").await, Err(ChainError::NoProviders)));
    }

    #[tokio::test]
    async fn test_exhausted_error_names_last_provider() {
        let chain = ProviderChain::new(
            vec![Arc::new(Broken)],
            ImageDefaults::default(),
            Duration::from_secs(1),
        );
        let err = chain.generate("x").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "all 1 image providers failed (last: broken: provider returned 503: down)"
        );
    }
}
