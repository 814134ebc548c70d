//! Tool-using answer loop over the course catalog.
//!
//! The [`Orchestrator`] lets the model call the registered [`Tool`]s for a bounded
//! number of rounds before it must answer in plain text.

mod outline;
mod runner;
mod search;
mod tools;

pub use outline::CourseOutlineTool;
pub use runner::Orchestrator;
pub use search::CourseSearchTool;
pub use tools::{
    optional_str, optional_u32, required_str, Source, SourceLog, Tool, ToolDeclaration,
    ToolInput, ToolRegistry,
};

/// Tool rounds allowed before the model is asked for a text-only answer.
pub const MAX_TOOL_ROUNDS: usize = 2;
