//! Conversation Memory
//!
//! A bounded, oldest-first log of recent turns, rendered into the prompt as
//! one `"<label>: <text>"` line per turn. Entries are evicted from the front
//! once the bound is exceeded. Memory lives only as long as the process.

use sdk::types::Role;
use std::collections::VecDeque;

use crate::config::MemoryConfig;

/// Default bound: five user/assistant pairs
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// One stored entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Bounded conversation history
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: VecDeque<ConversationTurn>,
    max_entries: usize,
    user_label: String,
    assistant_label: String,
}

impl ConversationMemory {
    /// Create an empty memory with the default bound and labels
    pub fn new() -> Self {
        Self::with_labels(DEFAULT_MAX_ENTRIES, "You", "AI")
    }

    pub fn with_labels(
        max_entries: usize,
        user_label: impl Into<String>,
        assistant_label: impl Into<String>,
    ) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_entries + 2),
            max_entries,
            user_label: user_label.into(),
            assistant_label: assistant_label.into(),
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::with_labels(
            config.max_entries,
            config.user_label.clone(),
            config.assistant_label.clone(),
        )
    }

    /// Prompt for the next generation call: every stored turn followed by
    /// the new user turn, one per line
    pub fn render_prompt(&self, new_user_text: &str) -> String {
        let mut lines = self.lines();
        lines.push(self.format_line(Role::User, new_user_text));
        lines.join("\n")
    }

    /// Append one exchange and evict the oldest entries beyond the bound
    pub fn record(&mut self, user_text: &str, assistant_text: &str) {
        self.turns
            .push_back(ConversationTurn::new(Role::User, user_text));
        self.turns
            .push_back(ConversationTurn::new(Role::Assistant, assistant_text));

        while self.turns.len() > self.max_entries {
            self.turns.pop_front();
        }

        tracing::debug!(
            "Conversation memory holds {}/{} entries",
            self.turns.len(),
            self.max_entries
        );
    }

    /// Stored turns rendered as prompt lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.turns
            .iter()
            .map(|turn| self.format_line(turn.role, &turn.text))
            .collect()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn label(&self, role: Role) -> &str {
        match role {
            Role::User => &self.user_label,
            Role::Assistant => &self.assistant_label,
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    // A reply that already opens with its own label is not labelled twice
    fn format_line(&self, role: Role, text: &str) -> String {
        let label = self.label(role);
        let already_labelled = text
            .strip_prefix(label)
            .is_some_and(|rest| rest.starts_with(':'));

        if already_labelled {
            text.to_string()
        } else {
            format!("{}: {}", label, text)
        }
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}
