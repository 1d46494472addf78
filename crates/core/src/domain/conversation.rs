use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub const MIN_HISTORY_WINDOW: usize = 5;
pub const MAX_HISTORY_WINDOW: usize = 10;
pub const DEFAULT_HISTORY_WINDOW: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Rolling window of prior turns. Oldest turns are evicted first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationHistory {
    window: usize,
    turns: VecDeque<Turn>,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::with_window(DEFAULT_HISTORY_WINDOW)
    }
}

impl ConversationHistory {
    pub fn with_window(window: usize) -> Self {
        let window = window.clamp(MIN_HISTORY_WINDOW, MAX_HISTORY_WINDOW);
        Self { window, turns: VecDeque::with_capacity(window) }
    }

    pub fn from_turns(window: usize, turns: impl IntoIterator<Item = Turn>) -> Self {
        let mut history = Self::with_window(window);
        for turn in turns {
            history.push(turn);
        }
        history
    }

    pub fn push(&mut self, turn: Turn) {
        if self.turns.len() == self.window {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn user_turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|turn| turn.role == Role::User)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub conversation_id: Option<String>,
    pub history: ConversationHistory,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), conversation_id: None, history: ConversationHistory::default() }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }
}
