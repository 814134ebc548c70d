//! Sentence-based chunking with overlap.

use super::CourseDocument;
use crate::vector_store::CourseChunk;

/// Packs whole sentences into chunks of bounded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentenceChunker {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters of trailing sentences repeated at the start of the next chunk.
    pub chunk_overlap: usize,
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `.`, `!` or `?` followed by whitespace. Whitespace is collapsed.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = normalized.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek() == Some(&' ') {
            chars.next();
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }

    sentences
}

impl SentenceChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Chunk free text.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let sentences = split_sentences(text);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < sentences.len() {
            let mut end = start;
            let mut size = 0;
            while end < sentences.len() {
                let added = char_len(&sentences[end]) + usize::from(end > start);
                if end > start && size + added > self.chunk_size {
                    break;
                }
                size += added;
                end += 1;
            }

            chunks.push(sentences[start..end].join(" "));
            if end >= sentences.len() {
                break;
            }

            // step back over whole sentences for the overlap, always moving forward
            let mut next = end;
            let mut overlap = 0;
            while next > start + 1 {
                let len = char_len(&sentences[next - 1]) + 1;
                if overlap + len > self.chunk_overlap {
                    break;
                }
                overlap += len;
                next -= 1;
            }
            start = next;
        }

        chunks
    }

    /// Chunk every section of a document, numbering chunks across the course.
    pub fn chunk_document(&self, document: &CourseDocument) -> Vec<CourseChunk> {
        let mut chunks = Vec::new();

        for section in &document.sections {
            for (i, text) in self.chunk_text(&section.text).into_iter().enumerate() {
                let content = match section.lesson_number {
                    Some(n) if i == 0 => format!("Lesson {} content: {}", n, text),
                    _ => text,
                };
                chunks.push(CourseChunk {
                    content,
                    course_title: document.course.title.clone(),
                    lesson_number: section.lesson_number,
                    chunk_index: chunks.len(),
                });
            }
        }

        chunks
    }
}
