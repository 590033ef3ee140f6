//! Conversation core: turns a stream of transcript fragments into an
//! evolving image prompt and a rendered image.

mod accumulator;
mod engine;
mod pipeline;
mod response;
mod sanitize;
mod turns;

pub use accumulator::{Flush, Fragment, Submission, TranscriptAccumulator};
pub use engine::{EngineSettings, EvolveError, EvolvedPrompt, PromptEngine};
pub use pipeline::{FlushReport, Pipeline, PipelineError, PipelineSettings, SubmitOutcome};
pub use response::{assemble, assemble_degraded, StructuredResponse};
pub use sanitize::{clamp_chars, sanitize_turn};
pub use turns::{Turn, TurnLog};

pub use llm_core::Role;

/// Default instruction preamble sent ahead of every window.
pub const DEFAULT_PREAMBLE: &str = "You are receiving a live transcript of a conference. \
Each time a new sentence arrives, update an image prompt for an image generator so that it \
partially reflects the new sentence while keeping elements from before, letting the prompt \
drift slowly with the conversation. Keep it abstract and humorous. Respond with the prompt \
only, in a single sentence of at most about 50 words.";
