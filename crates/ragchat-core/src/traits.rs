//! Core traits defining the interfaces between components.

use async_trait::async_trait;
use ulid::Ulid;

use crate::error::Result;
use crate::types::{Chunk, ContentType, Document, IndexStats};

/// Storage layer trait.
#[async_trait]
pub trait Store: Send + Sync {
    /// Remove every document, chunk, embedding and metadata row.
    async fn reset(&self) -> Result<()>;

    // Document operations
    async fn insert_document(&self, doc: &Document) -> Result<()>;
    async fn get_document(&self, id: Ulid) -> Result<Option<Document>>;

    // Chunk operations
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;
    async fn get_chunk(&self, id: Ulid) -> Result<Option<Chunk>>;

    // Embedding operations
    async fn insert_embeddings(&self, chunk_ids: &[Ulid], embeddings: &[Vec<f32>]) -> Result<()>;

    // Search operations

    /// Nearest chunks by squared L2 distance, closest first.
    async fn vector_search(&self, embedding: &[f32], k: u32) -> Result<Vec<(Ulid, f32)>>;

    /// Full-text matches, best first. Scores are higher-is-better.
    async fn keyword_search(&self, query: &str, k: u32) -> Result<Vec<(Ulid, f32)>>;

    // Index metadata
    async fn get_meta(&self, key: &str) -> Result<Option<String>>;
    async fn set_meta(&self, key: &str, value: &str) -> Result<()>;

    // Stats
    async fn get_stats(&self) -> Result<IndexStats>;
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Get the maximum context length in tokens.
    fn max_tokens(&self) -> usize;

    /// Identifier recorded alongside a built index.
    fn model_name(&self) -> &str;
}

/// Hosted or local text generation model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for a single-turn prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Get the model name.
    fn model_name(&self) -> &str;
}

/// Chunking configuration.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Chunking strategy trait.
pub trait Chunker: Send + Sync {
    /// Chunk text content into pieces.
    fn chunk(
        &self,
        content: &str,
        content_type: ContentType,
        config: &ChunkConfig,
    ) -> Result<Vec<ChunkData>>;
}

/// Raw chunk data before ID assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    /// Chunk text content.
    pub content: String,

    /// Length in characters.
    pub char_count: usize,

    /// Character offset in the source text.
    pub start_char: usize,
}
