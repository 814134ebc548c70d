//! Courses command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::rag::RagSystem;
use anyhow::Result;

/// List indexed courses.
pub async fn run_courses(settings: Settings) -> Result<()> {
    let rag = RagSystem::new(&settings)?;

    match rag.indexed_courses().await {
        Ok(courses) if courses.is_empty() => {
            Output::info("No courses indexed yet. Use 'lectern index <path>' to add some.");
        }
        Ok(courses) => {
            Output::header(&format!("Indexed Courses ({})", courses.len()));
            println!();
            for course in &courses {
                Output::course_info(course);
            }

            let total_chunks: usize = courses.iter().map(|c| c.chunk_count).sum();
            println!();
            Output::kv("Total courses", &courses.len().to_string());
            Output::kv("Total chunks", &total_chunks.to_string());
        }
        Err(e) => {
            Output::error(&format!("Failed to list courses: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
