//! Model-facing conversation types and the model client abstraction.
//!
//! A conversation is an ordered list of [`Turn`]s local to one query. The model
//! answers each invocation with a [`ModelResponse`] that either carries final
//! text or asks for one or more tool invocations.

mod openai;

pub use openai::{create_client, create_client_with_timeout, OpenAiModel};

use crate::agent::ToolDeclaration;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Author of a turn as seen by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Invocation id, unique within one response.
    pub id: String,
    /// Name of the requested tool.
    pub name: String,
    /// Arguments; expected to be a JSON object.
    pub input: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// A request is usable only with an id, a name and an object of arguments.
    pub fn is_well_formed(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty() && self.input.is_object()
    }
}

/// The outcome of executing one [`ToolInvocation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Echoes the id of the invocation this answers.
    pub invocation_id: String,
    /// Text shown to the model.
    pub content: String,
    /// Set when `content` is a failure diagnostic.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(invocation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(invocation_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            content: format!("Tool execution failed: {}", error),
            is_error: true,
        }
    }
}

/// One block of assistant output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse(ToolInvocation),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// One entry of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// Plain user text.
    User { text: String },
    /// Assistant output, possibly containing tool invocations.
    Assistant { blocks: Vec<ContentBlock> },
    /// Results for the invocations of the preceding assistant turn.
    ToolResults { results: Vec<ToolResult> },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    pub fn role(&self) -> Role {
        match self {
            Turn::User { .. } | Turn::ToolResults { .. } => Role::User,
            Turn::Assistant { .. } => Role::Assistant,
        }
    }
}

/// Why the model stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model wants tools executed before it continues.
    ToolUse,
    EndTurn,
    MaxTokens,
    StopSequence,
    Other,
}

/// The model's reply for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentBlock>,
}

impl ModelResponse {
    /// A final text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            stop_reason: StopReason::EndTurn,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// A reply asking for the given tool invocations.
    pub fn tool_use(invocations: Vec<ToolInvocation>) -> Self {
        Self {
            stop_reason: StopReason::ToolUse,
            content: invocations.into_iter().map(ContentBlock::ToolUse).collect(),
        }
    }

    pub fn requests_tools(&self) -> bool {
        self.stop_reason == StopReason::ToolUse
    }

    /// Tool invocations in the order the model listed them.
    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse(invocation) => Some(invocation),
            ContentBlock::Text { .. } => None,
        })
    }

    /// First text block, or an empty string when the reply has none.
    pub fn extract_text(&self) -> String {
        self.content
            .iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text.clone()),
                ContentBlock::ToolUse(_) => None,
            })
            .unwrap_or_default()
    }
}

/// How the model may pick tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    /// Zero or more tools, at the model's discretion.
    Auto,
}

/// Everything sent to the model for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: &'a str,
    pub turns: &'a [Turn],
    pub tools: &'a [ToolDeclaration],
}

impl<'a> ModelRequest<'a> {
    pub fn new(system: &'a str, turns: &'a [Turn], tools: &'a [ToolDeclaration]) -> Self {
        Self {
            system,
            turns,
            tools,
        }
    }

    /// Tool choice is only sent alongside declarations.
    pub fn tool_choice(&self) -> Option<ToolChoice> {
        if self.tools.is_empty() {
            None
        } else {
            Some(ToolChoice::Auto)
        }
    }
}

/// A language model that can answer with text or tool invocations.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one model invocation.
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelResponse>;
}
