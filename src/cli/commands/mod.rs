//! CLI command implementations.

mod ask;
mod chat;
mod config;
mod courses;
mod index;
mod serve;

pub use ask::run_ask;
pub use chat::run_chat;
pub use config::run_config;
pub use courses::run_courses;
pub use index::run_index;
pub use serve::{router, run_serve, AppState};

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;

/// Run pre-flight checks, reporting failures the way every command does.
fn preflight(operation: Operation) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(operation) {
        Output::error(&e.to_string());
        return Err(e.into());
    }
    Ok(())
}
