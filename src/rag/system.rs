//! Query and ingestion facade.

use crate::agent::{CourseOutlineTool, CourseSearchTool, Orchestrator, Source, ToolRegistry};
use crate::chunking::{is_course_document, parse_course_document, SentenceChunker};
use crate::config::{Prompts, Settings};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{LecternError, Result};
use crate::model::{ModelClient, OpenAiModel};
use crate::session::{InMemorySessionStore, SessionStore};
use crate::vector_store::{
    Course, CourseIndex, IndexedCourse, MemoryVectorStore, SqliteVectorStore, VectorStore,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// An answer with the course material it cites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// Catalog statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseAnalytics {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}

/// Everything needed to answer questions about indexed courses.
pub struct RagSystem {
    index: Arc<CourseIndex>,
    orchestrator: Orchestrator,
    tools: ToolRegistry,
    sessions: Arc<dyn SessionStore>,
    chunker: SentenceChunker,
}

impl RagSystem {
    /// Build a system backed by OpenAI and the configured vector store.
    pub fn new(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let store: Arc<dyn VectorStore> = match settings.vector_store.provider.as_str() {
            "sqlite" => Arc::new(SqliteVectorStore::new(&settings.sqlite_path())?),
            "memory" => Arc::new(MemoryVectorStore::new()),
            other => {
                return Err(LecternError::Config(format!(
                    "Unknown vector store provider: {}",
                    other
                )))
            }
        };

        Ok(Self::with_components(
            settings,
            prompts.system_prompt(),
            Arc::new(OpenAiModel::from_settings(&settings.model)?),
            store,
            Arc::new(OpenAIEmbedder::from_settings(&settings.embedding)?),
            Arc::new(InMemorySessionStore::new(settings.rag.max_history)),
        ))
    }

    /// Build a system from explicit components.
    pub fn with_components(
        settings: &Settings,
        system_prompt: String,
        model: Arc<dyn ModelClient>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let index = Arc::new(CourseIndex::new(store, embedder, settings.rag.max_results));

        let mut tools = ToolRegistry::new();
        tools.register(CourseSearchTool::new(index.clone()));
        tools.register(CourseOutlineTool::new(index.clone()));

        let orchestrator =
            Orchestrator::new(model, system_prompt).with_max_rounds(settings.rag.max_tool_rounds);

        Self {
            index,
            orchestrator,
            tools,
            sessions,
            chunker: SentenceChunker::from(&settings.rag),
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn index(&self) -> &CourseIndex {
        &self.index
    }

    /// Answer a question, using and extending the session history when an id is given.
    #[instrument(skip(self, query))]
    pub async fn query(&self, query: &str, session_id: Option<&str>) -> Result<RagAnswer> {
        let history = session_id.and_then(|id| self.sessions.get_history(id));

        let registry = self.tools.fork();
        let answer = self
            .orchestrator
            .run(
                query,
                history.as_deref(),
                &registry.declarations(),
                Some(&registry),
            )
            .await?;

        let sources = registry.last_sources();
        registry.reset_sources();

        if let Some(id) = session_id {
            self.sessions.record_exchange(id, query, &answer);
        }

        info!("Answered with {} sources", sources.len());
        Ok(RagAnswer { answer, sources })
    }

    /// Parse, chunk and index a single course document.
    #[instrument(skip(self))]
    pub async fn add_course_document(&self, path: &Path) -> Result<(Course, usize)> {
        let text = tokio::fs::read_to_string(path).await?;
        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let document = parse_course_document(&text, &fallback)?;
        let chunks = self.chunker.chunk_document(&document);
        let count = self.index.add_course(&document.course, &chunks).await?;

        Ok((document.course, count))
    }

    /// Index every course document in `dir`, skipping titles already present.
    ///
    /// Returns `(courses_added, chunks_added)`. Unreadable or unparsable files are
    /// logged and skipped.
    #[instrument(skip(self))]
    pub async fn add_course_folder(&self, dir: &Path, clear_existing: bool) -> Result<(usize, usize)> {
        if clear_existing {
            info!("Clearing existing courses");
            self.index.clear().await?;
        }

        if !dir.is_dir() {
            warn!("Course folder {:?} does not exist", dir);
            return Ok((0, 0));
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_course_document(p))
            .collect();
        paths.sort();

        let mut existing: HashSet<String> = self.index.course_titles().await?.into_iter().collect();
        let mut courses = 0;
        let mut chunks = 0;

        for path in paths {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };
            let fallback = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let document = match parse_course_document(&text, &fallback) {
                Ok(document) => document,
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };

            if existing.contains(&document.course.title) {
                info!("Course already indexed: {}", document.course.title);
                continue;
            }

            let course_chunks = self.chunker.chunk_document(&document);
            match self.index.add_course(&document.course, &course_chunks).await {
                Ok(count) => {
                    courses += 1;
                    chunks += count;
                    existing.insert(document.course.title);
                }
                Err(e) => warn!("Failed to index {:?}: {}", path, e),
            }
        }

        info!("Added {} courses with {} chunks", courses, chunks);
        Ok((courses, chunks))
    }

    pub async fn course_analytics(&self) -> Result<CourseAnalytics> {
        let course_titles = self.index.course_titles().await?;
        Ok(CourseAnalytics {
            total_courses: course_titles.len(),
            course_titles,
        })
    }

    pub async fn indexed_courses(&self) -> Result<Vec<IndexedCourse>> {
        self.index.list_indexed().await
    }
}
