//! SQLite-based vector store implementation.
//!
//! Uses SQLite with cosine distance computed in Rust. Course metadata and lesson
//! lists live in `courses`, embedded text in `chunks`.

use super::{
    cosine_distance, ChunkFilter, Course, CourseChunk, EmbeddedChunk, IndexedCourse, Lesson,
    ScoredChunk, VectorStore,
};
use crate::error::{LecternError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS courses (
        title TEXT PRIMARY KEY,
        course_link TEXT,
        instructor TEXT,
        lessons_json TEXT NOT NULL,
        embedding BLOB NOT NULL,
        indexed_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        course_title TEXT NOT NULL,
        lesson_number INTEGER,
        chunk_index INTEGER NOT NULL,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_course ON chunks(course_title, lesson_number);
"#;

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite vector store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LecternError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn parse_timestamp(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn course_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Course, String)> {
        let lessons_json: String = row.get(3)?;
        Ok((
            Course {
                title: row.get(0)?,
                course_link: row.get(1)?,
                instructor: row.get(2)?,
                lessons: Vec::new(),
            },
            lessons_json,
        ))
    }

    fn with_lessons((mut course, lessons_json): (Course, String)) -> Result<Course> {
        course.lessons = serde_json::from_str::<Vec<Lesson>>(&lessons_json)?;
        Ok(course)
    }

    fn write_course(conn: &Connection, course: &Course, title_embedding: &[f32]) -> Result<()> {
        conn.execute("DELETE FROM chunks WHERE course_title = ?1", params![course.title])?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO courses
            (title, course_link, instructor, lessons_json, embedding, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                course.title,
                course.course_link,
                course.instructor,
                serde_json::to_string(&course.lessons)?,
                Self::embedding_to_bytes(title_embedding),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn write_chunks(conn: &Connection, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut stmt = conn.prepare(
            r#"
            INSERT OR REPLACE INTO chunks
            (id, course_title, lesson_number, chunk_index, content, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;
        for embedded in chunks {
            stmt.execute(params![
                embedded.id.to_string(),
                embedded.chunk.course_title,
                embedded.chunk.lesson_number,
                embedded.chunk.chunk_index as i64,
                embedded.chunk.content,
                Self::embedding_to_bytes(&embedded.embedding),
            ])?;
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, course, title_embedding), fields(course = %course.title))]
    async fn upsert_course(&self, course: &Course, title_embedding: &[f32]) -> Result<()> {
        let conn = self.lock()?;
        Self::write_course(&conn, course, title_embedding)?;
        debug!("Upserted course metadata");
        Ok(())
    }

    #[instrument(skip(self, chunks))]
    async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        Self::write_chunks(&tx, chunks)?;
        tx.commit()?;
        info!("Batch upserted {} chunks", chunks.len());
        Ok(chunks.len())
    }

    #[instrument(skip(self, course, title_embedding, chunks), fields(course = %course.title))]
    async fn replace_course(
        &self,
        course: &Course,
        title_embedding: &[f32],
        chunks: &[EmbeddedChunk],
    ) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        Self::write_course(&tx, course, title_embedding)?;
        Self::write_chunks(&tx, chunks)?;
        tx.commit()?;
        info!("Replaced course with {} chunks", chunks.len());
        Ok(chunks.len())
    }

    #[instrument(skip(self, query_embedding))]
    async fn search_chunks(
        &self,
        query_embedding: &[f32],
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT course_title, lesson_number, chunk_index, content, embedding
            FROM chunks
            WHERE (?1 IS NULL OR course_title = ?1)
              AND (?2 IS NULL OR lesson_number = ?2)
            "#,
        )?;

        let rows = stmt.query_map(params![filter.course_title, filter.lesson_number], |row| {
            let chunk_index: i64 = row.get(2)?;
            let embedding_bytes: Vec<u8> = row.get(4)?;
            Ok((
                CourseChunk {
                    course_title: row.get(0)?,
                    lesson_number: row.get(1)?,
                    chunk_index: chunk_index as usize,
                    content: row.get(3)?,
                },
                Self::bytes_to_embedding(&embedding_bytes),
            ))
        })?;

        let mut results: Vec<ScoredChunk> = rows
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(chunk, embedding)| ScoredChunk {
                distance: cosine_distance(query_embedding, &embedding),
                chunk,
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        debug!("Found {} matching chunks", results.len());
        Ok(results)
    }

    #[instrument(skip(self, query_embedding))]
    async fn nearest_course(&self, query_embedding: &[f32]) -> Result<Option<String>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare("SELECT title, embedding FROM courses")?;
        let rows = stmt.query_map([], |row| {
            let title: String = row.get(0)?;
            let embedding_bytes: Vec<u8> = row.get(1)?;
            Ok((title, Self::bytes_to_embedding(&embedding_bytes)))
        })?;

        Ok(rows
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(title, embedding)| (cosine_distance(query_embedding, &embedding), title))
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, title)| title))
    }

    #[instrument(skip(self))]
    async fn get_course(&self, title: &str) -> Result<Option<Course>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT title, course_link, instructor, lessons_json FROM courses WHERE title = ?1",
                params![title],
                Self::course_from_row,
            )
            .optional()?;

        row.map(Self::with_lessons).transpose()
    }

    #[instrument(skip(self))]
    async fn list_courses(&self) -> Result<Vec<Course>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT title, course_link, instructor, lessons_json FROM courses ORDER BY title",
        )?;
        let rows = stmt.query_map([], Self::course_from_row)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(Self::with_lessons)
            .collect()
    }

    #[instrument(skip(self))]
    async fn list_indexed(&self) -> Result<Vec<IndexedCourse>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT c.title, c.instructor, c.lessons_json, c.indexed_at,
                   (SELECT COUNT(*) FROM chunks WHERE chunks.course_title = c.title) AS chunk_count
            FROM courses c
            ORDER BY c.indexed_at DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let lessons_json: String = row.get(2)?;
            let indexed_at: String = row.get(3)?;
            let chunk_count: i64 = row.get(4)?;
            Ok((
                IndexedCourse {
                    title: row.get(0)?,
                    instructor: row.get(1)?,
                    lesson_count: 0,
                    chunk_count: chunk_count as usize,
                    indexed_at: Self::parse_timestamp(&indexed_at),
                },
                lessons_json,
            ))
        })?;

        rows.collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(mut indexed, lessons_json)| -> Result<IndexedCourse> {
                indexed.lesson_count = serde_json::from_str::<Vec<Lesson>>(&lessons_json)?.len();
                Ok(indexed)
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM chunks; DELETE FROM courses;")?;
        info!("Cleared all courses and chunks");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_course() -> Course {
        Course {
            title: "Building Towards Computer Use".to_string(),
            course_link: Some("https://example.com/course".to_string()),
            instructor: Some("Colt".to_string()),
            lessons: vec![
                Lesson { lesson_number: 0, title: "Introduction".into(), lesson_link: Some("https://example.com/0".into()) },
                Lesson { lesson_number: 1, title: "Overview".into(), lesson_link: None },
            ],
        }
    }

    #[tokio::test]
    async fn test_sqlite_vector_store() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let course = sample_course();
        store.upsert_course(&course, &[1.0, 0.0, 0.0]).await.unwrap();

        let chunks = vec![
            EmbeddedChunk::new(
                CourseChunk {
                    content: "Lesson 0 content: welcome".into(),
                    course_title: course.title.clone(),
                    lesson_number: Some(0),
                    chunk_index: 0,
                },
                vec![1.0, 0.0, 0.0],
            ),
            EmbeddedChunk::new(
                CourseChunk {
                    content: "Lesson 1 content: overview".into(),
                    course_title: course.title.clone(),
                    lesson_number: Some(1),
                    chunk_index: 1,
                },
                vec![0.0, 1.0, 0.0],
            ),
        ];
        assert_eq!(store.upsert_chunks(&chunks).await.unwrap(), 2);

        assert_eq!(store.get_course(&course.title).await.unwrap(), Some(course.clone()));
        assert_eq!(store.get_course("Missing").await.unwrap(), None);

        let results = store
            .search_chunks(&[1.0, 0.0, 0.0], &ChunkFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].distance.abs() < 0.001);

        let lesson_one = store
            .search_chunks(
                &[1.0, 0.0, 0.0],
                &ChunkFilter { course_title: None, lesson_number: Some(1) },
                10,
            )
            .await
            .unwrap();
        assert_eq!(lesson_one.len(), 1);
        assert_eq!(lesson_one[0].chunk.lesson_number, Some(1));

        let indexed = store.list_indexed().await.unwrap();
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].chunk_count, 2);
        assert_eq!(indexed[0].lesson_count, 2);

        assert_eq!(
            store.nearest_course(&[0.8, 0.2, 0.0]).await.unwrap().as_deref(),
            Some(course.title.as_str())
        );

        store.clear().await.unwrap();
        assert!(store.list_courses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courses.db");

        {
            let store = SqliteVectorStore::new(&path).unwrap();
            store.upsert_course(&sample_course(), &[0.0, 1.0]).await.unwrap();
        }

        let store = SqliteVectorStore::new(&path).unwrap();
        let courses = store.list_courses().await.unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].lessons.len(), 2);
    }

    #[tokio::test]
    async fn test_replace_course_swaps_chunks() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let course = sample_course();
        let chunk = |index: usize, content: &str| {
            EmbeddedChunk::new(
                CourseChunk {
                    content: content.into(),
                    course_title: course.title.clone(),
                    lesson_number: Some(0),
                    chunk_index: index,
                },
                vec![1.0, 0.0],
            )
        };

        let first = vec![chunk(0, "old a"), chunk(1, "old b")];
        assert_eq!(store.replace_course(&course, &[1.0, 0.0], &first).await.unwrap(), 2);
        let second = vec![chunk(0, "new a")];
        assert_eq!(store.replace_course(&course, &[1.0, 0.0], &second).await.unwrap(), 1);

        let results = store
            .search_chunks(&[1.0, 0.0], &ChunkFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.content, "new a");
        assert_eq!(store.list_indexed().await.unwrap()[0].chunk_count, 1);
    }

    #[tokio::test]
    async fn test_unreadable_rows_are_errors() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let course = sample_course();
        store.upsert_course(&course, &[1.0, 0.0]).await.unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO chunks (id, course_title, lesson_number, chunk_index, content, embedding)
                 VALUES ('bad', ?1, 0, 'not a number', 'text', x'0000803f')",
                params![course.title],
            )
            .unwrap();
        store
            .lock()
            .unwrap()
            .execute("UPDATE courses SET embedding = 'text' WHERE title = ?1", params![course.title])
            .unwrap();

        assert!(store
            .search_chunks(&[1.0, 0.0], &ChunkFilter::default(), 10)
            .await
            .is_err());
        assert!(store.nearest_course(&[1.0, 0.0]).await.is_err());
    }
}
