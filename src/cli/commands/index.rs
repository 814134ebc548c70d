//! Index command implementation.

use super::preflight;
use crate::cli::preflight::Operation;
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::RagSystem;
use anyhow::{bail, Result};

/// Run the index command on a single document or a folder.
pub async fn run_index(path: &str, clear: bool, settings: Settings) -> Result<()> {
    preflight(Operation::Index)?;

    let path = Settings::expand_path(path);
    if !path.exists() {
        Output::error(&format!("Path not found: {}", path.display()));
        bail!("path not found: {}", path.display());
    }

    let rag = RagSystem::new(&settings)?;

    if path.is_dir() {
        let spinner = Output::spinner(&format!("Indexing {}...", path.display()));
        let (courses, chunks) = rag.add_course_folder(&path, clear).await?;
        spinner.finish_and_clear();

        if courses == 0 {
            Output::info("No new courses found.");
        } else {
            Output::success(&format!("Indexed {} courses ({} chunks)", courses, chunks));
        }
    } else {
        if clear {
            rag.index().clear().await?;
        }
        let spinner = Output::spinner(&format!("Indexing {}...", path.display()));
        let result = rag.add_course_document(&path).await;
        spinner.finish_and_clear();

        let (course, chunks) = result?;
        Output::success(&format!("Indexed '{}' ({} chunks)", course.title, chunks));
        Output::kv("Lessons", &course.lessons.len().to_string());
        if let Some(instructor) = &course.instructor {
            Output::kv("Instructor", instructor);
        }
    }

    Ok(())
}
