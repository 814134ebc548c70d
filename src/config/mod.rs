//! Configuration module for Lectern.
//!
//! Handles loading and managing application settings and the assistant prompt.

mod prompts;
mod settings;

pub use prompts::{AssistantPrompts, Prompts};
pub use settings::{
    EmbeddingSettings, GeneralSettings, ModelSettings, PromptSettings, RagSettings,
    ServerSettings, Settings, VectorStoreSettings,
};
