//! Fakes shared by unit tests.

use crate::embedding::Embedder;
use crate::error::{LecternError, Result};
use crate::model::{ModelClient, ModelRequest, ModelResponse, Turn};
use crate::vector_store::{CourseCatalog, CourseOutline, Course, Lesson, SearchResults};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// One recorded model invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub turns: Vec<Turn>,
    pub tools: Vec<String>,
}

/// Model that replays scripted responses and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<ModelResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue an error as the next reply.
    pub fn then_fail(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(LecternError::Model(message.to_string())));
        self
    }

    /// Queue another reply.
    pub fn then(self, response: ModelResponse) -> Self {
        self.script.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: request.system.to_string(),
            turns: request.turns.to_vec(),
            tools: request.tools.iter().map(|d| d.name.clone()).collect(),
        });

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LecternError::Model("script exhausted".to_string())))
    }
}

/// Arguments of one catalog search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub query: String,
    pub course_name: Option<String>,
    pub lesson_number: Option<u32>,
}

/// Catalog returning canned results.
#[derive(Default)]
pub struct FakeCatalog {
    pub results: SearchResults,
    pub links: HashMap<(String, u32), String>,
    pub outline: Option<CourseOutline>,
    pub searches: Mutex<Vec<SearchCall>>,
}

impl FakeCatalog {
    pub fn with_results(results: SearchResults) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    pub fn link(mut self, course: &str, lesson: u32, url: &str) -> Self {
        self.links.insert((course.to_string(), lesson), url.to_string());
        self
    }

    pub fn searches(&self) -> Vec<SearchCall> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl CourseCatalog for FakeCatalog {
    async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> SearchResults {
        self.searches.lock().unwrap().push(SearchCall {
            query: query.to_string(),
            course_name: course_name.map(str::to_string),
            lesson_number,
        });
        self.results.clone()
    }

    async fn lesson_link(&self, course_title: &str, lesson_number: u32) -> Result<Option<String>> {
        Ok(self
            .links
            .get(&(course_title.to_string(), lesson_number))
            .cloned())
    }

    async fn course_outline(&self, _course_name: &str) -> Result<Option<CourseOutline>> {
        Ok(self.outline.clone())
    }
}

/// Deterministic bag-of-words embedder.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 64 }
    }
}

impl HashingEmbedder {
    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dimensions] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A two-lesson course used across tests.
pub fn sample_course() -> Course {
    Course {
        title: "Building Towards Computer Use".to_string(),
        course_link: Some("https://learn.example.com/computer-use".to_string()),
        instructor: Some("Colt Steele".to_string()),
        lessons: vec![
            Lesson {
                lesson_number: 0,
                title: "Introduction".to_string(),
                lesson_link: Some("https://learn.example.com/computer-use/lesson0".to_string()),
            },
            Lesson {
                lesson_number: 1,
                title: "Prompt Caching".to_string(),
                lesson_link: None,
            },
        ],
    }
}

/// Course document text in the ingestion format.
pub const SAMPLE_DOCUMENT: &str = "Course Title: Building Towards Computer Use
Course Link: https://learn.example.com/computer-use
Course Instructor: Colt Steele

Lesson 0: Introduction
Lesson Link: https://learn.example.com/computer-use/lesson0
Welcome to the course. The model can use a computer by looking at screenshots. It then decides where to click.

Lesson 1: Prompt Caching
Prompt caching stores a prefix of the prompt. Cached prefixes cost fewer tokens on later requests.
";
