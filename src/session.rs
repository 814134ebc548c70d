//! Conversation history per session.

use crate::model::Role;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Source of prior-turn context for follow-up questions.
pub trait SessionStore: Send + Sync {
    /// Mint a new, empty session and return its id.
    fn create_session(&self) -> String;

    /// Formatted history of a session, or `None` when it is unknown or empty.
    fn get_history(&self, session_id: &str) -> Option<String>;

    /// Append a question and its answer. Unknown ids are created on the fly.
    fn record_exchange(&self, session_id: &str, query: &str, answer: &str);

    /// Forget a session.
    fn clear_session(&self, session_id: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Message {
    role: Role,
    content: String,
}

impl Message {
    fn format(&self) -> String {
        match self.role {
            Role::User => format!("User: {}", self.content),
            Role::Assistant => format!("Assistant: {}", self.content),
        }
    }
}

#[derive(Default)]
struct State {
    counter: u64,
    sessions: HashMap<String, Vec<Message>>,
}

/// Session store kept in process memory.
pub struct InMemorySessionStore {
    max_history: usize,
    state: Mutex<State>,
}

impl InMemorySessionStore {
    /// Keep at most `max_history` exchanges (two messages each) per session.
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(2)
    }
}

impl SessionStore for InMemorySessionStore {
    fn create_session(&self) -> String {
        let mut state = self.lock();
        state.counter += 1;
        let id = format!("session_{}", state.counter);
        state.sessions.insert(id.clone(), Vec::new());
        debug!("Created {}", id);
        id
    }

    fn get_history(&self, session_id: &str) -> Option<String> {
        let state = self.lock();
        let messages = state.sessions.get(session_id)?;
        if messages.is_empty() {
            return None;
        }
        Some(
            messages
                .iter()
                .map(Message::format)
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    fn record_exchange(&self, session_id: &str, query: &str, answer: &str) {
        let limit = self.max_history * 2;
        let mut state = self.lock();
        let messages = state.sessions.entry(session_id.to_string()).or_default();

        messages.push(Message {
            role: Role::User,
            content: query.to_string(),
        });
        messages.push(Message {
            role: Role::Assistant,
            content: answer.to_string(),
        });

        if messages.len() > limit {
            let excess = messages.len() - limit;
            messages.drain(..excess);
        }
    }

    fn clear_session(&self, session_id: &str) {
        self.lock().sessions.remove(session_id);
    }
}
