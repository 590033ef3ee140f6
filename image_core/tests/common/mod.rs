//! Shared helpers for image_core integration tests

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageOutputFormat, Rgb, RgbImage};
use image_core::{ImageBytes, ImageProvider, ImageRequest, ProviderError};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([10, 120, 240]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
    out.into_inner()
}

pub enum Behaviour {
    Succeed(Vec<u8>),
    Fail(ProviderError),
    Hang,
}

/// Scripted provider that records every prompt it was asked for.
pub struct ScriptedProvider {
    name: String,
    behaviour: Behaviour,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behaviour,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &ImageRequest) -> Result<ImageBytes, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        match &self.behaviour {
            Behaviour::Succeed(bytes) => Ok(ImageBytes {
                bytes: bytes.clone(),
                mime_type: Some("image/png".to_string()),
            }),
            Behaviour::Fail(err) => Err(err.clone()),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Transport("unreachable".to_string()))
            }
        }
    }
}
