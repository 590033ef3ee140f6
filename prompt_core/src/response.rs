use image_core::GeneratedImage;
use serde::{Deserialize, Serialize};

use crate::EvolvedPrompt;

/// The unit handed to clients: a prompt and, unless degraded, its image as a data URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub message: String,
    pub image: Option<String>,
}

impl StructuredResponse {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

pub fn assemble(prompt: &EvolvedPrompt, image: &GeneratedImage) -> StructuredResponse {
    StructuredResponse {
        message: prompt.text.clone(),
        image: Some(image.data_uri()),
    }
}

/// Message-only response used when every image provider failed.
pub fn assemble_degraded(prompt: &EvolvedPrompt) -> StructuredResponse {
    StructuredResponse {
        message: prompt.text.clone(),
        image: None,
    }
}
