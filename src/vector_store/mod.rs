//! Vector store abstraction for course materials.
//!
//! Provides a trait-based interface for different vector database backends, and
//! [`CourseIndex`], the query-text catalog the retrieval tools talk to.

mod catalog;
mod memory;
mod sqlite;

pub use catalog::{CourseCatalog, CourseIndex};
pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A lesson inside a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub lesson_number: u32,
    pub title: String,
    pub lesson_link: Option<String>,
}

/// A course; its title doubles as its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    pub course_link: Option<String>,
    pub instructor: Option<String>,
    pub lessons: Vec<Lesson>,
}

impl Course {
    pub fn lesson(&self, lesson_number: u32) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.lesson_number == lesson_number)
    }
}

/// A piece of course text that gets embedded and searched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseChunk {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<u32>,
    pub chunk_index: usize,
}

/// A chunk together with its embedding, as stored.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub id: Uuid,
    pub chunk: CourseChunk,
    pub embedding: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn new(chunk: CourseChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chunk,
            embedding,
        }
    }
}

/// A chunk matched by a search. Lower distance is closer.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: CourseChunk,
    pub distance: f32,
}

/// Restricts a chunk search to one course and/or one lesson.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkFilter {
    pub course_title: Option<String>,
    pub lesson_number: Option<u32>,
}

impl ChunkFilter {
    pub fn matches(&self, chunk: &CourseChunk) -> bool {
        self.course_title
            .as_ref()
            .is_none_or(|title| &chunk.course_title == title)
            && self
                .lesson_number
                .is_none_or(|n| chunk.lesson_number == Some(n))
    }
}

/// Summary information about an indexed course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedCourse {
    pub title: String,
    pub instructor: Option<String>,
    pub lesson_count: usize,
    pub chunk_count: usize,
    pub indexed_at: DateTime<Utc>,
}

/// Where a search hit came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub course_title: String,
    pub lesson_number: Option<u32>,
    pub chunk_index: usize,
}

/// Parallel lists describing one search, or the error that prevented it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub documents: Vec<String>,
    pub metadata: Vec<ChunkMetadata>,
    pub distances: Vec<f32>,
    pub error: Option<String>,
}

impl SearchResults {
    /// No hits, optionally because of `error`.
    pub fn empty(error: Option<String>) -> Self {
        Self {
            error,
            ..Self::default()
        }
    }

    pub fn from_scored(hits: Vec<ScoredChunk>) -> Self {
        let mut results = Self::default();
        for hit in hits {
            results.documents.push(hit.chunk.content);
            results.metadata.push(ChunkMetadata {
                course_title: hit.chunk.course_title,
                lesson_number: hit.chunk.lesson_number,
                chunk_index: hit.chunk.chunk_index,
            });
            results.distances.push(hit.distance);
        }
        results
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }
}

/// A lesson as listed in a course outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineLesson {
    pub lesson_number: u32,
    pub title: String,
}

/// Title, link and ordered lessons of one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseOutline {
    pub title: String,
    pub course_link: Option<String>,
    pub lessons: Vec<OutlineLesson>,
}

impl From<&Course> for CourseOutline {
    fn from(course: &Course) -> Self {
        let mut lessons: Vec<OutlineLesson> = course
            .lessons
            .iter()
            .map(|l| OutlineLesson {
                lesson_number: l.lesson_number,
                title: l.title.clone(),
            })
            .collect();
        lessons.sort_by_key(|l| l.lesson_number);

        Self {
            title: course.title.clone(),
            course_link: course.course_link.clone(),
            lessons,
        }
    }
}

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store course metadata with the embedding of its title. Chunks previously
    /// stored for the same title are dropped.
    async fn upsert_course(&self, course: &Course, title_embedding: &[f32]) -> Result<()>;

    /// Bulk upsert embedded chunks.
    async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<usize>;

    /// Store a course together with its embedded chunks, replacing any earlier
    /// version of it. Either everything is written or nothing is.
    async fn replace_course(
        &self,
        course: &Course,
        title_embedding: &[f32],
        chunks: &[EmbeddedChunk],
    ) -> Result<usize>;

    /// Closest chunks to the query embedding that pass the filter.
    async fn search_chunks(
        &self,
        query_embedding: &[f32],
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Title of the course whose title embedding is closest to the query.
    async fn nearest_course(&self, query_embedding: &[f32]) -> Result<Option<String>>;

    /// Get a course by exact title.
    async fn get_course(&self, title: &str) -> Result<Option<Course>>;

    /// All courses, ordered by title.
    async fn list_courses(&self) -> Result<Vec<Course>>;

    /// Per-course summaries, most recently indexed first.
    async fn list_indexed(&self) -> Result<Vec<IndexedCourse>>;

    /// Remove every course and chunk.
    async fn clear(&self) -> Result<()>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Cosine distance, so that smaller means closer.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
