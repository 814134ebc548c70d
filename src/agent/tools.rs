//! Tool contract, per-query source tracking and name-based dispatch.

use crate::error::{LecternError, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Arguments supplied by the model for one tool call.
pub type ToolInput = serde_json::Map<String, serde_json::Value>;

/// What the model sees about a tool: name, when to use it, and its input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema; optional parameters are those absent from `required`.
    pub input_schema: serde_json::Value,
}

impl ToolDeclaration {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Names listed as required in the input schema.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.input_schema["required"]
            .as_array()
            .map(|names| names.iter().filter_map(|n| n.as_str()).collect())
            .unwrap_or_default()
    }
}

/// A citation back to the course material a tool retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub display_text: String,
    /// Always serialized, as `null` when the lesson has no link.
    pub lesson_link: Option<String>,
}

impl Source {
    pub fn new(display_text: impl Into<String>, lesson_link: Option<String>) -> Self {
        Self {
            display_text: display_text.into(),
            lesson_link,
        }
    }
}

/// Sources recorded during one query.
///
/// Each recording replaces the previous one, so the log holds the sources of the
/// most recent retrieval.
#[derive(Debug, Default)]
pub struct SourceLog {
    sources: Mutex<Vec<Source>>,
}

impl SourceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sources: Vec<Source>) {
        *self.sources.lock().unwrap_or_else(PoisonError::into_inner) = sources;
    }

    pub fn snapshot(&self) -> Vec<Source> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declaration sent to the model.
    fn declaration(&self) -> ToolDeclaration;

    /// Run the tool and return model-readable text.
    ///
    /// Retrieval tools record citations into `sources`.
    async fn execute(&self, input: &ToolInput, sources: &SourceLog) -> Result<String>;
}

/// Fetch a required string argument.
pub fn required_str<'a>(input: &'a ToolInput, name: &str) -> Result<&'a str> {
    input
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| LecternError::InvalidToolInput(format!("Missing '{}' argument", name)))
}

/// Fetch an optional string argument. Empty strings count as absent.
pub fn optional_str<'a>(input: &'a ToolInput, name: &str) -> Option<&'a str> {
    input
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Fetch an optional non-negative integer argument.
///
/// Integers sent as strings ("2") are accepted; anything else is an error.
pub fn optional_u32(input: &ToolInput, name: &str) -> Result<Option<u32>> {
    match input.get(name) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                LecternError::InvalidToolInput(format!("'{}' must be a non-negative integer", name))
            }),
    }
}

/// Tools by name, in registration order, with the sources of the current query.
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
    sources: SourceLog,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: IndexMap::new(),
            sources: SourceLog::new(),
        }
    }

    /// Register a tool under its declared name. A later registration of the same
    /// name replaces the earlier one but keeps its position.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.declaration().name;
        debug!("Registering tool {}", name);
        self.tools.insert(name, tool);
    }

    /// A registry with the same tools and an empty source log.
    pub fn fork(&self) -> Self {
        Self {
            tools: self.tools.clone(),
            sources: SourceLog::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Declarations of all tools, in registration order.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(|t| t.declaration()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve a tool by name and run it.
    pub async fn execute(&self, name: &str, input: &ToolInput) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| LecternError::ToolNotFound(name.to_string()))?;
        tool.execute(input, &self.sources).await
    }

    /// Sources recorded since the last reset.
    pub fn last_sources(&self) -> Vec<Source> {
        self.sources.snapshot()
    }

    pub fn reset_sources(&self) {
        self.sources.clear();
    }
}
