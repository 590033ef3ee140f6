use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use llm_core::{ChatMessage, ChatModel, CompletionRequest, LlmError, ModelPicker, Role};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::info;

use crate::{clamp_chars, sanitize_turn, Turn};

#[derive(Debug, Error)]
pub enum EvolveError {
    #[error("prompt evolution failed: {0}")]
    Upstream(#[from] LlmError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvolvedPrompt {
    pub text: String,
    /// Conversation turns (preamble excluded) the prompt was evolved from.
    pub source_turn_count: usize,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_tokens: u16,
    pub max_turn_chars: usize,
    pub max_prompt_chars: usize,
    pub timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_tokens: 77,
            max_turn_chars: 1000,
            max_prompt_chars: 600,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct PromptEngine {
    model: Arc<dyn ChatModel>,
    picker: ModelPicker,
    rng: Mutex<StdRng>,
    settings: EngineSettings,
}

impl PromptEngine {
    pub fn new(model: Arc<dyn ChatModel>, picker: ModelPicker, settings: EngineSettings) -> Self {
        Self {
            model,
            picker,
            rng: Mutex::new(StdRng::from_entropy()),
            settings,
        }
    }

    /// Replaces the random source used for model selection.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn pick_model(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.picker.pick(&mut *rng).to_string()
    }

    /// Sends the sanitized window to the model and returns the next prompt.
    pub async fn evolve(&self, window: &[Turn]) -> Result<EvolvedPrompt, EvolveError> {
        let messages: Vec<ChatMessage> = window
            .iter()
            .map(|turn| match turn.role {
                // the preamble is configuration and is sent verbatim
                Role::System => ChatMessage::new(Role::System, turn.text.clone()),
                role => ChatMessage::new(role, sanitize_turn(turn, self.settings.max_turn_chars)),
            })
            .collect();
        let source_turn_count = window.iter().filter(|t| t.role != Role::System).count();

        let request = CompletionRequest {
            model: self.pick_model(),
            messages,
            max_tokens: self.settings.max_tokens,
        };

        let started = Instant::now();
        let completion = tokio::time::timeout(self.settings.timeout, self.model.complete(&request))
            .await
            .map_err(|_| LlmError::Timeout(self.settings.timeout))??;

        let text = tidy_completion(&completion, self.settings.max_prompt_chars);
        if text.is_empty() {
            return Err(EvolveError::Upstream(LlmError::EmptyCompletion));
        }
        info!(
            "Evolved prompt with {} in {:.2}s from {} turns ({} chars)",
            request.model,
            started.elapsed().as_secs_f64(),
            source_turn_count,
            text.chars().count()
        );

        Ok(EvolvedPrompt {
            text,
            source_turn_count,
            model: request.model,
        })
    }
}

/// Trims whitespace and one layer of wrapping quotes, then bounds the length.
fn tidy_completion(raw: &str, max_chars: usize) -> String {
    let mut text = raw.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')] {
        if text.len() > 1 && text.starts_with(open) && text.ends_with(close) {
            text = text[open.len_utf8()..text.len() - close.len_utf8()].trim();
            break;
        }
    }
    clamp_chars(text, max_chars).trim_end().to_string()
}
