//! Course document parsing and chunking.
//!
//! Documents are parsed into a [`crate::vector_store::Course`] plus per-lesson body
//! text, which [`SentenceChunker`] splits into searchable chunks.

mod document;
mod sentence;

pub use document::{parse_course_document, CourseDocument, DocumentSection};
pub use sentence::{split_sentences, SentenceChunker};

use crate::config::RagSettings;

impl From<&RagSettings> for SentenceChunker {
    fn from(settings: &RagSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }
}

/// File extensions picked up when ingesting a folder.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Whether `path` looks like a course document.
pub fn is_course_document(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DOCUMENT_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}
