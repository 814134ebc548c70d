//! Course outline lookup.

use super::tools::{required_str, SourceLog, Tool, ToolDeclaration, ToolInput};
use crate::error::Result;
use crate::vector_store::{CourseCatalog, CourseOutline};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// `get_course_outline`: title, link and lesson list of one course.
pub struct CourseOutlineTool {
    catalog: Arc<dyn CourseCatalog>,
}

impl CourseOutlineTool {
    pub fn new(catalog: Arc<dyn CourseCatalog>) -> Self {
        Self { catalog }
    }
}

fn format_outline(outline: &CourseOutline) -> String {
    let mut text = format!(
        "Course: {}\nCourse Link: {}\n\nLessons ({} total):",
        outline.title,
        outline.course_link.as_deref().unwrap_or("N/A"),
        outline.lessons.len()
    );
    for lesson in &outline.lessons {
        text.push_str(&format!("\n  Lesson {}: {}", lesson.lesson_number, lesson.title));
    }
    text
}

#[async_trait]
impl Tool for CourseOutlineTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "get_course_outline",
            "Get the complete outline of a course including title, link, and all lessons",
            json!({
                "type": "object",
                "properties": {
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                    }
                },
                "required": ["course_name"]
            }),
        )
    }

    async fn execute(&self, input: &ToolInput, _sources: &SourceLog) -> Result<String> {
        let course_name = required_str(input, "course_name")?;

        Ok(match self.catalog.course_outline(course_name).await? {
            Some(outline) => format_outline(&outline),
            None => format!("No course found matching '{}'", course_name),
        })
    }
}
