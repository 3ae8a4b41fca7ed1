//! Deterministic embedder for tests and offline runs.

use async_trait::async_trait;

use ragchat_core::{Embedder, RagError, Result};

use crate::onnx::l2_normalize;

/// A mock embedder that doesn't require model files.
///
/// Identical texts always map to identical unit vectors.
pub struct MockEmbedder {
    dimension: usize,
    max_tokens: usize,
}

impl MockEmbedder {
    /// Create a mock embedder matching all-MiniLM-L6-v2's shape.
    pub fn new() -> Self {
        Self {
            dimension: 384,
            max_tokens: 256,
        }
    }

    /// Create a mock embedder with custom settings.
    pub fn with_config(dimension: usize, max_tokens: usize) -> Self {
        Self {
            dimension,
            max_tokens,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let hash = fnv1a(text);
        let embedding = (0..self.dimension)
            .map(|i| {
                let mixed = hash
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9E37_79B9_7F4A_7C15)
                    .rotate_left((i % 63) as u32);
                (mixed % 1000) as f32 / 1000.0 - 0.5
            })
            .collect();
        l2_normalize(embedding)
    }
}

/// FNV-1a over the text bytes.
fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
        (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new();

        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.max_tokens(), 256);
        assert_eq!(embedder.model_name(), "mock");

        let texts = ["Hello world", "Rust is great"];
        let embeddings = embedder.embed_documents(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 384);
        assert_eq!(embeddings[1].len(), 384);

        // Check L2 normalization
        let norm: f32 = embeddings[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_deterministic_embeddings() {
        let embedder = MockEmbedder::new();

        let e1 = embedder.embed_query("consistent input").await.unwrap();
        let e2 = embedder.embed_documents(&["consistent input"]).await.unwrap();

        assert_eq!(e1, e2[0]);
    }

    #[tokio::test]
    async fn test_different_texts_different_embeddings() {
        let embedder = MockEmbedder::new();

        let e1 = embedder.embed_query("hello").await.unwrap();
        let e2 = embedder.embed_query("world").await.unwrap();

        assert_ne!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_embedder_custom_config() {
        let embedder = MockEmbedder::with_config(8, 512);

        assert_eq!(embedder.dimension(), 8);
        assert_eq!(embedder.max_tokens(), 512);

        let embedding = embedder.embed_query("test").await.unwrap();
        assert_eq!(embedding.len(), 8);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let embedder = MockEmbedder::new();
        let embeddings = embedder.embed_documents(&[]).await.unwrap();
        assert!(embeddings.is_empty());
    }
}
