//! Scripted collaborators for pipeline tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageOutputFormat, Rgb, RgbImage};
use image_core::{ImageBytes, ImageDefaults, ImageProvider, ImageRequest, ProviderChain, ProviderError};
use llm_core::{ChatModel, CompletionRequest, LlmError, ModelPicker};
use prompt_core::{EngineSettings, Pipeline, PipelineSettings, PromptEngine};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(2, 2, Rgb([255, 200, 0]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
    out.into_inner()
}

/// Replies from a script, then echoes the last user message.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    delay: Duration,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Self::with_delay(replies, Duration::ZERO)
    }

    pub fn with_delay(replies: Vec<Result<String, LlmError>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.replies.lock().unwrap().pop_front();
        match scripted {
            Some(reply) => reply,
            None => Ok(format!(
                "prompt about {}",
                request.messages.last().map(|m| m.content.as_str()).unwrap_or("nothing")
            )),
        }
    }
}

pub struct FixedProvider {
    pub name: &'static str,
    pub result: Result<Vec<u8>, ProviderError>,
    pub prompts: Mutex<Vec<String>>,
}

impl FixedProvider {
    pub fn ok(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Ok(png_bytes()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &'static str, status: u16) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Err(ProviderError::Http {
                status,
                body: "unavailable".to_string(),
            }),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ImageProvider for FixedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, request: &ImageRequest) -> Result<ImageBytes, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.result.clone().map(|bytes| ImageBytes {
            bytes,
            mime_type: Some("image/png".to_string()),
        })
    }
}

pub fn engine(model: Arc<ScriptedModel>) -> PromptEngine {
    PromptEngine::new(
        model,
        ModelPicker::new(["model-a"]).unwrap(),
        EngineSettings {
            max_tokens: 77,
            max_turn_chars: 200,
            max_prompt_chars: 300,
            timeout: Duration::from_secs(5),
        },
    )
    .with_rng(StdRng::seed_from_u64(3))
}

pub fn settings(cooldown: Duration, window_size: usize) -> PipelineSettings {
    PipelineSettings {
        preamble: "PREAMBLE".to_string(),
        window_size,
        cooldown,
        separator: " ".to_string(),
        ..PipelineSettings::default()
    }
}

pub fn pipeline(
    model: Arc<ScriptedModel>,
    providers: Vec<Arc<dyn ImageProvider>>,
    cooldown: Duration,
) -> Pipeline {
    Pipeline::new(
        settings(cooldown, 2),
        engine(model),
        ProviderChain::new(providers, ImageDefaults::default(), Duration::from_secs(5)),
    )
}
