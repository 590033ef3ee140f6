use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use image_core::{ChainError, ProviderChain, ProviderFailure};
use llm_core::Role;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    assemble, assemble_degraded, clamp_chars, EvolveError, EvolvedPrompt, Flush, PromptEngine,
    StructuredResponse, Submission, TranscriptAccumulator, Turn, TurnLog,
};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub preamble: String,
    pub window_size: usize,
    pub cooldown: Duration,
    pub separator: String,
    /// Upper bound on live conversations; the least recently active one is
    /// evicted to make room.
    pub max_conversations: usize,
    /// Conversations untouched for this long are dropped by `evict_idle`.
    pub idle_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            preamble: crate::DEFAULT_PREAMBLE.to_string(),
            window_size: 2,
            cooldown: Duration::from_secs(3),
            separator: " ".to_string(),
            max_conversations: 10_000,
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Upstream(#[from] EvolveError),

    #[error("unknown conversation: {0}")]
    UnknownConversation(String),
}

/// Everything one flush produced.
#[derive(Debug, Clone)]
pub struct FlushReport {
    pub response: StructuredResponse,
    pub model: String,
    pub source_turn_count: usize,
    /// Provider that rendered the image, `None` when degraded.
    pub provider: Option<String>,
    pub provider_failures: Vec<ProviderFailure>,
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Ignored,
    Pending { buffered: usize },
    Flushed(FlushReport),
}

/// Per-conversation state. The lock is held from accumulation through
/// evolution so flushes of one conversation are processed in arrival order.
struct Conversation {
    accumulator: TranscriptAccumulator,
    log: TurnLog,
}

struct Slot {
    state: Arc<Mutex<Conversation>>,
    last_seen: Instant,
}

pub struct Pipeline {
    settings: PipelineSettings,
    engine: PromptEngine,
    chain: ProviderChain,
    conversations: DashMap<String, Slot>,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, engine: PromptEngine, chain: ProviderChain) -> Self {
        Self {
            settings,
            engine,
            chain,
            conversations: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.chain.provider_names()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Number of turns logged for a conversation, if it exists.
    pub async fn turn_count(&self, conversation_id: &str) -> Option<usize> {
        let conversation = self.existing(conversation_id)?;
        let state = conversation.lock().await;
        Some(state.log.len())
    }

    fn existing(&self, conversation_id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.conversations
            .get(conversation_id)
            .map(|slot| Arc::clone(&slot.state))
    }

    /// Looks a conversation up and marks it active at `now`.
    fn touch(&self, conversation_id: &str, now: Instant) -> Option<Arc<Mutex<Conversation>>> {
        let mut slot = self.conversations.get_mut(conversation_id)?;
        slot.last_seen = slot.last_seen.max(now);
        Some(Arc::clone(&slot.state))
    }

    fn conversation(&self, conversation_id: &str, now: Instant) -> Arc<Mutex<Conversation>> {
        if let Some(state) = self.touch(conversation_id, now) {
            return state;
        }
        self.make_room(now);
        let slot = self
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                info!("New conversation {}", conversation_id);
                Slot {
                    state: Arc::new(Mutex::new(Conversation {
                        accumulator: TranscriptAccumulator::new(
                            self.settings.cooldown,
                            self.settings.separator.clone(),
                            now,
                        ),
                        log: TurnLog::new(self.settings.preamble.clone(), self.settings.window_size),
                    })),
                    last_seen: now,
                }
            });
        Arc::clone(&slot.state)
    }

    /// Drops conversations idle for at least `idle_timeout`, returning
    /// how many were removed. A flush already holding one finishes normally.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.conversations.len();
        let idle_timeout = self.settings.idle_timeout;
        self.conversations
            .retain(|_, slot| now.saturating_duration_since(slot.last_seen) < idle_timeout);
        let removed = before.saturating_sub(self.conversations.len());
        if removed > 0 {
            info!("Evicted {} idle conversation(s)", removed);
        }
        removed
    }

    fn make_room(&self, now: Instant) {
        if self.conversations.len() < self.settings.max_conversations {
            return;
        }
        self.evict_idle(now);
        while !self.conversations.is_empty()
            && self.conversations.len() >= self.settings.max_conversations
        {
            let mut oldest: Option<(String, Instant)> = None;
            for entry in self.conversations.iter() {
                if oldest.as_ref().map_or(true, |(_, seen)| entry.last_seen < *seen) {
                    oldest = Some((entry.key().clone(), entry.last_seen));
                }
            }
            match oldest {
                Some((key, _)) => {
                    warn!("Conversation limit reached, evicting {}", key);
                    self.conversations.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Feeds one transcript fragment; runs the full pipeline when it flushes.
    pub async fn submit(
        &self,
        conversation_id: &str,
        text: &str,
        now: Instant,
    ) -> Result<SubmitOutcome, PipelineError> {
        let conversation = self.conversation(conversation_id, now);
        let mut state = conversation.lock().await;
        match state.accumulator.submit(text, now) {
            Submission::Ignored => Ok(SubmitOutcome::Ignored),
            Submission::Pending => Ok(SubmitOutcome::Pending {
                buffered: state.accumulator.pending_len(),
            }),
            Submission::Flush(flush) => {
                let prompt = self.evolve_locked(conversation_id, &mut state, flush).await?;
                drop(state);
                Ok(SubmitOutcome::Flushed(self.render(prompt).await))
            }
        }
    }

    /// Flushes whatever is buffered, ignoring the cool-down.
    pub async fn flush(
        &self,
        conversation_id: &str,
        now: Instant,
    ) -> Result<SubmitOutcome, PipelineError> {
        let conversation = self
            .touch(conversation_id, now)
            .ok_or_else(|| PipelineError::UnknownConversation(conversation_id.to_string()))?;
        let mut state = conversation.lock().await;
        match state.accumulator.drain(now) {
            None => Ok(SubmitOutcome::Ignored),
            Some(flush) => {
                let prompt = self.evolve_locked(conversation_id, &mut state, flush).await?;
                drop(state);
                Ok(SubmitOutcome::Flushed(self.render(prompt).await))
            }
        }
    }

    /// Stateless path: the caller supplies the conversation so far.
    pub async fn respond(&self, turns: Vec<Turn>) -> Result<FlushReport, PipelineError> {
        let mut log = TurnLog::new(self.settings.preamble.clone(), self.settings.window_size);
        for turn in turns {
            log.append(turn);
        }
        let prompt = self.engine.evolve(&log.window()).await?;
        Ok(self.render(prompt).await)
    }

    // The user turn is appended before evolving so a failed call still leaves
    // what was said in the log.
    async fn evolve_locked(
        &self,
        conversation_id: &str,
        state: &mut Conversation,
        flush: Flush,
    ) -> Result<EvolvedPrompt, PipelineError> {
        info!(
            "Flush in {}: {} fragment(s), {} chars",
            conversation_id,
            flush.fragment_count,
            flush.text.chars().count()
        );
        state.log.append(Turn::new(Role::User, flush.text));
        let window = state.log.window();
        let prompt = self.engine.evolve(&window).await.map_err(|err| {
            warn!("Evolution failed for {}: {}", conversation_id, err);
            err
        })?;
        let echo = clamp_chars(&prompt.text, self.engine.settings().max_turn_chars);
        state.log.append(Turn::new(Role::Assistant, echo));
        Ok(prompt)
    }

    async fn render(&self, prompt: EvolvedPrompt) -> FlushReport {
        match self.chain.generate(&prompt.text).await {
            Ok(outcome) => FlushReport {
                response: assemble(&prompt, &outcome.image),
                model: prompt.model,
                source_turn_count: prompt.source_turn_count,
                provider: Some(outcome.image.provider_id),
                provider_failures: outcome.failures,
                degraded: false,
            },
            Err(err) => {
                warn!("Responding without an image: {}", err);
                let provider_failures = match err {
                    ChainError::AllProvidersExhausted { failures, .. } => failures,
                    ChainError::NoProviders => Vec::new(),
                };
                FlushReport {
                    response: assemble_degraded(&prompt),
                    model: prompt.model,
                    source_turn_count: prompt.source_turn_count,
                    provider: None,
                    provider_failures,
                    degraded: true,
                }
            }
        }
    }
}
