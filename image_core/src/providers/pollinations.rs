use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Url};

use super::MAX_ERROR_BODY;
use crate::{truncate_text, ImageBytes, ImageProvider, ImageRequest, ProviderError};

pub const DEFAULT_POLLINATIONS_URL: &str = "https://image.pollinations.ai";

/// Free, keyless text-to-image endpoint. The prompt travels in the URL path
/// and the response body is the image itself.
pub struct PollinationsProvider {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl PollinationsProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn url_for(&self, request: &ImageRequest) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::NotConfigured(format!("bad base url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::NotConfigured(format!("base url {} cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .push("prompt")
            .push(&request.prompt);
        url.query_pairs_mut()
            .append_pair("width", &request.width.to_string())
            .append_pair("height", &request.height.to_string())
            .append_pair("nologo", "true");
        Ok(url)
    }
}

#[async_trait]
impl ImageProvider for PollinationsProvider {
    fn name(&self) -> &str {
        "pollinations"
    }

    async fn generate(&self, request: &ImageRequest) -> Result<ImageBytes, ProviderError> {
        let url = self.url_for(request)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: truncate_text(&body, MAX_ERROR_BODY),
            });
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?
            .to_vec();
        Ok(ImageBytes { bytes, mime_type })
    }
}
