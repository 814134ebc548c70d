//! Course document parsing.
//!
//! Expected layout:
//!
//! ```text
//! Course Title: <title>
//! Course Link: <url>
//! Course Instructor: <name>
//!
//! Lesson 0: <lesson title>
//! Lesson Link: <url>
//! <lesson text...>
//! ```

use crate::error::{LecternError, Result};
use crate::vector_store::{Course, Lesson};
use regex::Regex;
use std::sync::LazyLock;

static LESSON_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^lesson\s+(\d+)\s*:\s*(.*)$").expect("valid regex"));

/// Body text belonging to one lesson, or to the course as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSection {
    pub lesson_number: Option<u32>,
    pub text: String,
}

/// A parsed course document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseDocument {
    pub course: Course,
    pub sections: Vec<DocumentSection>,
}

fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let (name, value) = line.split_once(':')?;
    if name.trim().eq_ignore_ascii_case(key) {
        Some(value.trim())
    } else {
        None
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

struct PendingLesson {
    lesson: Lesson,
    body: Vec<String>,
    expecting_link: bool,
}

/// Parse a course document. `fallback_title` is used when the header has no title,
/// typically the file stem.
pub fn parse_course_document(text: &str, fallback_title: &str) -> Result<CourseDocument> {
    if text.trim().is_empty() {
        return Err(LecternError::Ingest("document is empty".to_string()));
    }

    let mut title = None;
    let mut course_link = None;
    let mut instructor = None;
    let mut preamble: Vec<String> = Vec::new();
    let mut lessons: Vec<PendingLesson> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();

        if let Some(caps) = LESSON_MARKER.captures(line) {
            let number = caps[1]
                .parse::<u32>()
                .map_err(|e| LecternError::Ingest(format!("bad lesson number in {:?}: {}", line, e)))?;
            lessons.push(PendingLesson {
                lesson: Lesson {
                    lesson_number: number,
                    title: caps[2].trim().to_string(),
                    lesson_link: None,
                },
                body: Vec::new(),
                expecting_link: true,
            });
            continue;
        }

        match lessons.last_mut() {
            Some(pending) => {
                if pending.expecting_link && !line.is_empty() {
                    pending.expecting_link = false;
                    if let Some(link) = header_value(line, "Lesson Link") {
                        pending.lesson.lesson_link = non_empty(link);
                        continue;
                    }
                }
                pending.body.push(line.to_string());
            }
            None => {
                if let Some(value) = header_value(line, "Course Title") {
                    title = non_empty(value);
                } else if let Some(value) = header_value(line, "Course Link") {
                    course_link = non_empty(value);
                } else if let Some(value) = header_value(line, "Course Instructor") {
                    instructor = non_empty(value);
                } else {
                    preamble.push(line.to_string());
                }
            }
        }
    }

    let title = title
        .or_else(|| non_empty(fallback_title.trim()))
        .ok_or_else(|| LecternError::Ingest("course has no title".to_string()))?;

    let mut sections = Vec::new();
    let intro = preamble.join("\n").trim().to_string();
    if !intro.is_empty() {
        sections.push(DocumentSection {
            lesson_number: None,
            text: intro,
        });
    }

    let mut course_lessons = Vec::with_capacity(lessons.len());
    for pending in lessons {
        let body = pending.body.join("\n").trim().to_string();
        if !body.is_empty() {
            sections.push(DocumentSection {
                lesson_number: Some(pending.lesson.lesson_number),
                text: body,
            });
        }
        course_lessons.push(pending.lesson);
    }

    Ok(CourseDocument {
        course: Course {
            title,
            course_link,
            instructor,
            lessons: course_lessons,
        },
        sections,
    })
}
