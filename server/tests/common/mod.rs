//! Common utilities for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use image::{ImageOutputFormat, Rgb, RgbImage};
use image_core::{ImageBytes, ImageDefaults, ImageProvider, ImageRequest, ProviderChain, ProviderError};
use llm_core::{ChatModel, CompletionRequest, LlmError, ModelPicker};
use prompt_core::{EngineSettings, Pipeline, PipelineSettings, PromptEngine};
use server::config::ServerConfig;
use server::{build_router, AppState};
use tower::ServiceExt;

pub struct QueueModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl QueueModel {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatModel for QueueModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok("an ever-shifting dreamscape".to_string()))
    }
}

pub struct StubProvider {
    name: &'static str,
    fail: bool,
}

#[async_trait]
impl ImageProvider for StubProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, _request: &ImageRequest) -> Result<ImageBytes, ProviderError> {
        if self.fail {
            return Err(ProviderError::Http {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let img = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
        Ok(ImageBytes {
            bytes: out.into_inner(),
            mime_type: Some("image/png".to_string()),
        })
    }
}

pub fn provider(name: &'static str, fail: bool) -> Arc<dyn ImageProvider> {
    Arc::new(StubProvider { name, fail })
}

/// Create a test app instance backed by scripted collaborators
pub fn create_test_app(
    model: Arc<QueueModel>,
    providers: Vec<Arc<dyn ImageProvider>>,
    cooldown: Duration,
) -> Router {
    let engine = PromptEngine::new(
        model,
        ModelPicker::new(["test-model"]).unwrap(),
        EngineSettings::default(),
    );
    let chain = ProviderChain::new(providers, ImageDefaults::default(), Duration::from_secs(5));
    let pipeline = Pipeline::new(
        PipelineSettings {
            preamble: "PREAMBLE".to_string(),
            window_size: 2,
            cooldown,
            separator: " ".to_string(),
            ..PipelineSettings::default()
        },
        engine,
        chain,
    );
    build_router(AppState::new(pipeline, ServerConfig::default()))
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}
