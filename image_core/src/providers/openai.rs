use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::{Deserialize, Serialize};

use super::MAX_ERROR_BODY;
use crate::{truncate_text, ImageBytes, ImageProvider, ImageRequest, ProviderError};

pub const DEFAULT_OPENAI_IMAGES_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_IMAGE_MODEL: &str = "dall-e-3";

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_format: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedDatum>,
}

#[derive(Deserialize)]
struct GeneratedDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Sizes the images API accepts for a model family, `None` when unknown.
fn supported_sizes(model: &str) -> Option<&'static [(u32, u32)]> {
    if model.starts_with("dall-e-3") {
        Some(&[(1024, 1024), (1792, 1024), (1024, 1792)])
    } else if model.starts_with("dall-e-2") {
        Some(&[(256, 256), (512, 512), (1024, 1024)])
    } else if model.starts_with("gpt-image") {
        Some(&[(1024, 1024), (1536, 1024), (1024, 1536)])
    } else {
        None
    }
}

/// Closest supported size: nearest aspect ratio first, then nearest area.
fn fit_size(model: &str, width: u32, height: u32) -> (u32, u32) {
    let Some(sizes) = supported_sizes(model) else {
        return (width, height);
    };
    let aspect = |w: u32, h: u32| (w.max(1) as f64 / h.max(1) as f64).ln();
    let target = aspect(width, height);
    let area = width as i64 * height as i64;
    let score = |&(w, h): &(u32, u32)| {
        (
            (aspect(w, h) - target).abs(),
            (w as i64 * h as i64 - area).unsigned_abs(),
        )
    };
    sizes
        .iter()
        .copied()
        .min_by(|a, b| score(a).partial_cmp(&score(b)).unwrap_or(Ordering::Equal))
        .unwrap_or((width, height))
}

/// Paid, higher-fidelity provider speaking the OpenAI images API.
pub struct OpenAiImagesProvider {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiImagesProvider {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("OpenAI API key is empty".to_string()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/images/generations", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    // gpt-image models always answer with base64 and take an output format;
    // dall-e models need to be asked for base64 explicitly.
    fn payload<'a>(&'a self, request: &'a ImageRequest) -> GenerationRequest<'a> {
        let gpt_image = self.model.starts_with("gpt-image");
        let (width, height) = fit_size(&self.model, request.width, request.height);
        GenerationRequest {
            model: &self.model,
            prompt: &request.prompt,
            n: 1,
            size: format!("{width}x{height}"),
            response_format: (!gpt_image).then_some("b64_json"),
            output_format: gpt_image.then_some(request.format.as_str()),
        }
    }

    async fn download(&self, url: &str) -> Result<ImageBytes, ProviderError> {
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
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?
            .to_vec();
        Ok(ImageBytes { bytes, mime_type })
    }
}

#[async_trait]
impl ImageProvider for OpenAiImagesProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &ImageRequest) -> Result<ImageBytes, ProviderError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(request))
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

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("response has no images".to_string()))?;

        if let Some(b64) = datum.b64_json.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let bytes = BASE64
                .decode(b64.as_bytes())
                .map_err(|e| ProviderError::InvalidResponse(format!("base64 decode failed: {e}")))?;
            return Ok(ImageBytes {
                bytes,
                mime_type: None,
            });
        }
        match datum.url.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(url) => self.download(url).await,
            None => Err(ProviderError::InvalidResponse(
                "image entry has neither b64_json nor url".to_string(),
            )),
        }
    }
}
