//! Text-level course catalog on top of an embedder and a vector store.

use super::{
    ChunkFilter, Course, CourseChunk, CourseOutline, IndexedCourse, SearchResults,
    VectorStore,
};
use crate::embedding::Embedder;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What the retrieval tools need from the course store.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Search chunk text, optionally narrowed to a (fuzzy) course name and a lesson.
    ///
    /// Failures are reported through [`SearchResults::error`], never as `Err`.
    async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> SearchResults;

    /// Link of a lesson, looked up by exact course title.
    async fn lesson_link(&self, course_title: &str, lesson_number: u32) -> Result<Option<String>>;

    /// Outline of the course best matching `course_name`.
    async fn course_outline(&self, course_name: &str) -> Result<Option<CourseOutline>>;
}

/// Course catalog backed by embeddings.
pub struct CourseIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    max_results: usize,
}

impl CourseIndex {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, max_results: usize) -> Self {
        Self {
            store,
            embedder,
            max_results,
        }
    }

    /// Store a course and its chunks. Returns the number of chunks written.
    #[instrument(skip(self, course, chunks), fields(course = %course.title, chunks = chunks.len()))]
    pub async fn add_course(&self, course: &Course, chunks: &[CourseChunk]) -> Result<usize> {
        let title_embedding = self.embedder.embed(&course.title).await?;
        let embedded = self.embedder.embed_chunks(chunks).await?;

        let count = self
            .store
            .replace_course(course, &title_embedding, &embedded)
            .await?;
        info!("Indexed course with {} chunks", count);
        Ok(count)
    }

    /// Map a user-supplied course name to a stored title.
    ///
    /// Exact (case-insensitive) and substring matches win; otherwise the course
    /// whose title embedding is nearest to the name.
    #[instrument(skip(self))]
    pub async fn resolve_course_name(&self, name: &str) -> Result<Option<String>> {
        let wanted = name.trim().to_lowercase();
        let titles: Vec<String> = self
            .store
            .list_courses()
            .await?
            .into_iter()
            .map(|c| c.title)
            .collect();

        if titles.is_empty() {
            return Ok(None);
        }

        if let Some(title) = titles.iter().find(|t| t.to_lowercase() == wanted) {
            return Ok(Some(title.clone()));
        }
        if let Some(title) = titles.iter().find(|t| t.to_lowercase().contains(&wanted)) {
            return Ok(Some(title.clone()));
        }

        let embedding = self.embedder.embed(name).await?;
        let nearest = self.store.nearest_course(&embedding).await?;
        debug!("Resolved course name by similarity: {:?}", nearest);
        Ok(nearest)
    }

    /// Titles of all stored courses.
    pub async fn course_titles(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_courses()
            .await?
            .into_iter()
            .map(|c| c.title)
            .collect())
    }

    pub async fn list_indexed(&self) -> Result<Vec<IndexedCourse>> {
        self.store.list_indexed().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    async fn try_search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> Result<SearchResults> {
        let course_title = match course_name {
            Some(name) => match self.resolve_course_name(name).await? {
                Some(title) => Some(title),
                None => {
                    return Ok(SearchResults::empty(Some(format!(
                        "No course found matching '{}'",
                        name
                    ))))
                }
            },
            None => None,
        };

        let filter = ChunkFilter {
            course_title,
            lesson_number,
        };
        let embedding = self.embedder.embed(query).await?;
        let hits = self
            .store
            .search_chunks(&embedding, &filter, self.max_results)
            .await?;

        Ok(SearchResults::from_scored(hits))
    }
}

#[async_trait]
impl CourseCatalog for CourseIndex {
    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> SearchResults {
        match self.try_search(query, course_name, lesson_number).await {
            Ok(results) => {
                debug!("Search returned {} hits", results.len());
                results
            }
            Err(e) => {
                warn!("Search failed: {}", e);
                SearchResults::empty(Some(format!("Search error: {}", e)))
            }
        }
    }

    async fn lesson_link(&self, course_title: &str, lesson_number: u32) -> Result<Option<String>> {
        Ok(self
            .store
            .get_course(course_title)
            .await?
            .and_then(|c| c.lesson(lesson_number).and_then(|l| l.lesson_link.clone())))
    }

    #[instrument(skip(self))]
    async fn course_outline(&self, course_name: &str) -> Result<Option<CourseOutline>> {
        let Some(title) = self.resolve_course_name(course_name).await? else {
            return Ok(None);
        };
        Ok(self
            .store
            .get_course(&title)
            .await?
            .map(|c| CourseOutline::from(&c)))
    }
}
