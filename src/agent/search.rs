//! Content search over course chunks.

use super::tools::{
    optional_str, optional_u32, required_str, Source, SourceLog, Tool, ToolDeclaration, ToolInput,
};
use crate::error::Result;
use crate::vector_store::{CourseCatalog, SearchResults};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// `search_course_content`: semantic search with optional course and lesson filters.
pub struct CourseSearchTool {
    catalog: Arc<dyn CourseCatalog>,
}

impl CourseSearchTool {
    pub fn new(catalog: Arc<dyn CourseCatalog>) -> Self {
        Self { catalog }
    }

    /// Group hits by lesson and collect one source per hit.
    async fn format_results(&self, results: &SearchResults) -> (String, Vec<Source>) {
        let mut groups: IndexMap<String, Vec<&str>> = IndexMap::new();
        let mut sources = Vec::with_capacity(results.len());

        for (document, meta) in results.documents.iter().zip(&results.metadata) {
            let label = match meta.lesson_number {
                Some(n) => format!("{} - Lesson {}", meta.course_title, n),
                None => meta.course_title.clone(),
            };

            let link = match meta.lesson_number {
                Some(n) => self
                    .catalog
                    .lesson_link(&meta.course_title, n)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Lesson link lookup failed: {}", e);
                        None
                    }),
                None => None,
            };

            sources.push(Source::new(label.clone(), link));
            groups.entry(label).or_default().push(document);
        }

        let text = groups
            .iter()
            .map(|(label, documents)| format!("[{}]\n{}", label, documents.join("\n\n")))
            .collect::<Vec<_>>()
            .join("\n\n");

        (text, sources)
    }
}

fn no_results_message(course_name: Option<&str>, lesson_number: Option<u32>) -> String {
    let mut message = String::from("No relevant content found");
    if let Some(name) = course_name {
        message.push_str(&format!(" in course '{}'", name));
    }
    if let Some(n) = lesson_number {
        message.push_str(&format!(" in lesson {}", n));
    }
    message.push('.');
    message
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "search_course_content",
            "Search course materials with smart course name matching and lesson filtering",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for in the course content"
                    },
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                    },
                    "lesson_number": {
                        "type": "integer",
                        "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn execute(&self, input: &ToolInput, sources: &SourceLog) -> Result<String> {
        let query = required_str(input, "query")?;
        let course_name = optional_str(input, "course_name");
        let lesson_number = optional_u32(input, "lesson_number")?;

        let results = self.catalog.search(query, course_name, lesson_number).await;

        if let Some(error) = &results.error {
            debug!("Search backend reported: {}", error);
            return Ok(error.clone());
        }
        if results.is_empty() {
            return Ok(no_results_message(course_name, lesson_number));
        }

        let (text, found) = self.format_results(&results).await;
        sources.record(found);
        Ok(text)
    }
}
