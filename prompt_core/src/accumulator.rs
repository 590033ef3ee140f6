use std::time::{Duration, Instant};

/// One raw piece of transcript as it arrived.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub text: String,
    pub received_at: Instant,
}

/// A burst of fragments merged into one coherent turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flush {
    pub text: String,
    pub fragment_count: usize,
    pub flushed_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Empty or whitespace-only input; state untouched.
    Ignored,
    /// Buffered, still inside the cool-down.
    Pending,
    Flush(Flush),
}

/// Debounces fragments into turns using a cool-down measured from the last flush.
///
/// Purely reactive: nothing is emitted unless `submit` or `drain` is called.
#[derive(Debug)]
pub struct TranscriptAccumulator {
    cooldown: Duration,
    separator: String,
    pending: Vec<Fragment>,
    last_flush_at: Instant,
}

impl TranscriptAccumulator {
    /// `created_at` seeds the cool-down, so a burst starting right after
    /// creation is buffered instead of flushing its first word alone.
    pub fn new(cooldown: Duration, separator: impl Into<String>, created_at: Instant) -> Self {
        Self {
            cooldown,
            separator: separator.into(),
            pending: Vec::new(),
            last_flush_at: created_at,
        }
    }

    pub fn submit(&mut self, text: &str, now: Instant) -> Submission {
        let text = text.trim();
        if text.is_empty() {
            return Submission::Ignored;
        }
        self.pending.push(Fragment {
            text: text.to_string(),
            received_at: now,
        });
        if now.saturating_duration_since(self.last_flush_at) < self.cooldown {
            return Submission::Pending;
        }
        Submission::Flush(self.take(now))
    }

    /// Emits whatever is buffered regardless of the cool-down.
    pub fn drain(&mut self, now: Instant) -> Option<Flush> {
        if self.pending.is_empty() {
            return None;
        }
        Some(self.take(now))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn last_flush_at(&self) -> Instant {
        self.last_flush_at
    }

    fn take(&mut self, now: Instant) -> Flush {
        let fragments = std::mem::take(&mut self.pending);
        self.last_flush_at = now;
        Flush {
            text: fragments
                .iter()
                .map(|f| f.text.as_str())
                .collect::<Vec<_>>()
                .join(&self.separator),
            fragment_count: fragments.len(),
            flushed_at: now,
        }
    }
}
