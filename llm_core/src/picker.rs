use rand::seq::SliceRandom;
use rand::Rng;

use crate::LlmError;

/// Uniform choice over a fixed list of model identifiers.
#[derive(Debug, Clone)]
pub struct ModelPicker {
    candidates: Vec<String>,
}

impl ModelPicker {
    pub fn new<I, S>(candidates: I) -> Result<Self, LlmError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let candidates: Vec<String> = candidates
            .into_iter()
            .map(|s| {
                let s: String = s.into();
                s.trim().to_string()
            })
            .filter(|s| !s.is_empty())
            .collect();
        if candidates.is_empty() {
            return Err(LlmError::InvalidConfig(
                "at least one model identifier is required".to_string(),
            ));
        }
        Ok(Self { candidates })
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// The caller owns the random source so selection stays reproducible in tests.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.candidates
            .choose(rng)
            .map(String::as_str)
            .unwrap_or(self.candidates[0].as_str())
    }
}
