//! Embedding generation for course chunks, titles and queries.

mod openai;

pub use openai::OpenAIEmbedder;

use crate::error::{LecternError, Result};
use crate::vector_store::{CourseChunk, EmbeddedChunk};
use async_trait::async_trait;

/// Turns text into vectors comparable by cosine similarity.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    /// Embed the content of each chunk and pair it with its vector.
    async fn embed_chunks(&self, chunks: &[CourseChunk]) -> Result<Vec<EmbeddedChunk>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(LecternError::Embedding(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        Ok(chunks
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| EmbeddedChunk::new(chunk, embedding))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HashingEmbedder;

    #[tokio::test]
    async fn test_embed_chunks_pairs_in_order() {
        let chunks: Vec<CourseChunk> = ["prompt caching", "computer use"]
            .iter()
            .enumerate()
            .map(|(i, text)| CourseChunk {
                content: text.to_string(),
                course_title: "Course".to_string(),
                lesson_number: Some(1),
                chunk_index: i,
            })
            .collect();

        let embedder = HashingEmbedder::default();
        let embedded = embedder.embed_chunks(&chunks).await.unwrap();

        assert_eq!(embedded.len(), 2);
        assert_eq!(embedded[1].chunk, chunks[1]);
        assert_eq!(embedded[1].embedding, embedder.embed("computer use").await.unwrap());
    }
}
