//! In-memory vector store implementation.
//!
//! Useful for testing and small course sets.

use super::{
    cosine_distance, ChunkFilter, Course, EmbeddedChunk, IndexedCourse, ScoredChunk, VectorStore,
};
use crate::error::{LecternError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

struct StoredCourse {
    course: Course,
    embedding: Vec<f32>,
    indexed_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    courses: HashMap<String, StoredCourse>,
    chunks: HashMap<uuid::Uuid, EmbeddedChunk>,
}

/// In-memory vector store.
#[derive(Default)]
pub struct MemoryVectorStore {
    state: RwLock<State>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| LecternError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| LecternError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert_course(&self, course: &Course, title_embedding: &[f32]) -> Result<()> {
        let mut state = self.write()?;
        state.chunks.retain(|_, c| c.chunk.course_title != course.title);
        state.courses.insert(
            course.title.clone(),
            StoredCourse {
                course: course.clone(),
                embedding: title_embedding.to_vec(),
                indexed_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn replace_course(
        &self,
        course: &Course,
        title_embedding: &[f32],
        chunks: &[EmbeddedChunk],
    ) -> Result<usize> {
        let mut state = self.write()?;
        state.chunks.retain(|_, c| c.chunk.course_title != course.title);
        state.courses.insert(
            course.title.clone(),
            StoredCourse {
                course: course.clone(),
                embedding: title_embedding.to_vec(),
                indexed_at: Utc::now(),
            },
        );
        for chunk in chunks {
            state.chunks.insert(chunk.id, chunk.clone());
        }
        Ok(chunks.len())
    }

    async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<usize> {
        let mut state = self.write()?;
        for chunk in chunks {
            state.chunks.insert(chunk.id, chunk.clone());
        }
        Ok(chunks.len())
    }

    async fn search_chunks(
        &self,
        query_embedding: &[f32],
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let state = self.read()?;

        let mut results: Vec<ScoredChunk> = state
            .chunks
            .values()
            .filter(|c| filter.matches(&c.chunk))
            .map(|c| ScoredChunk {
                chunk: c.chunk.clone(),
                distance: cosine_distance(query_embedding, &c.embedding),
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn nearest_course(&self, query_embedding: &[f32]) -> Result<Option<String>> {
        let state = self.read()?;

        Ok(state
            .courses
            .values()
            .map(|c| (cosine_distance(query_embedding, &c.embedding), &c.course.title))
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, title)| title.clone()))
    }

    async fn get_course(&self, title: &str) -> Result<Option<Course>> {
        let state = self.read()?;
        Ok(state.courses.get(title).map(|c| c.course.clone()))
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let state = self.read()?;
        let mut courses: Vec<Course> = state.courses.values().map(|c| c.course.clone()).collect();
        courses.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(courses)
    }

    async fn list_indexed(&self) -> Result<Vec<IndexedCourse>> {
        let state = self.read()?;

        let mut indexed: Vec<IndexedCourse> = state
            .courses
            .values()
            .map(|stored| IndexedCourse {
                title: stored.course.title.clone(),
                instructor: stored.course.instructor.clone(),
                lesson_count: stored.course.lessons.len(),
                chunk_count: state
                    .chunks
                    .values()
                    .filter(|c| c.chunk.course_title == stored.course.title)
                    .count(),
                indexed_at: stored.indexed_at,
            })
            .collect();

        indexed.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
        Ok(indexed)
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.write()?;
        state.courses.clear();
        state.chunks.clear();
        Ok(())
    }
}
