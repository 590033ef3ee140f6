use chrono::{DateTime, Utc};
use llm_core::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only conversation log. Reads only ever see the preamble plus a
/// bounded suffix; the log itself is never pruned.
#[derive(Debug, Clone)]
pub struct TurnLog {
    preamble: Turn,
    turns: Vec<Turn>,
    window_size: usize,
}

impl TurnLog {
    pub fn new(preamble: impl Into<String>, window_size: usize) -> Self {
        Self {
            preamble: Turn::new(Role::System, preamble),
            turns: Vec::new(),
            window_size,
        }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Preamble followed by the most recent `min(N, len)` turns in arrival order.
    pub fn window(&self) -> Vec<Turn> {
        let start = self.turns.len().saturating_sub(self.window_size);
        std::iter::once(&self.preamble)
            .chain(self.turns[start..].iter())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}
