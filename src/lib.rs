//! Lectern - question answering over course materials
//!
//! Course scripts are parsed into lessons, chunked and embedded into a vector store.
//! Questions go to a chat model that can call two tools: a semantic search over
//! lesson content and a course outline lookup. Answers come back with the lessons
//! they cite.
//!
//! # Architecture
//!
//! - `config` - Configuration and prompt templates
//! - `model` - Provider-neutral chat model interface and the OpenAI backend
//! - `agent` - Tool registry, the course tools and the tool-calling loop
//! - `chunking` - Course document parsing and sentence chunking
//! - `embedding` - Embedding generation
//! - `vector_store` - Course and chunk storage with semantic search
//! - `session` - Per-session conversation history
//! - `rag` - The query and ingestion facade
//!
//! # Example
//!
//! ```rust,no_run
//! use lectern::config::Settings;
//! use lectern::rag::RagSystem;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let rag = RagSystem::new(&settings)?;
//!
//!     rag.add_course_folder(&settings.docs_dir(), false).await?;
//!     let response = rag.query("What is covered in lesson 2?", None).await?;
//!     println!("{}", response.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod model;
pub mod rag;
pub mod session;
pub mod vector_store;

#[cfg(test)]
mod testing;

pub use error::{LecternError, Result};
