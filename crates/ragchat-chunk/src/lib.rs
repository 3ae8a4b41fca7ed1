//! ragchat-chunk - Text splitting
//!
//! Splits loaded documents into overlapping pieces sized for embedding.
//!
//! [`RecursiveChunker`] tries paragraph breaks first, then line breaks,
//! then spaces, and finally falls back to individual characters.
//!
//! # Example
//!
//! ```rust
//! use ragchat_chunk::{Chunker, RecursiveChunker};
//! use ragchat_core::{ChunkConfig, ContentType};
//!
//! let chunker = RecursiveChunker::new();
//! let config = ChunkConfig::default();
//! let chunks = chunker.chunk("Hello world", ContentType::PlainText, &config).unwrap();
//! assert_eq!(chunks.len(), 1);
//! ```

mod recursive;

pub use recursive::{RecursiveChunker, DEFAULT_SEPARATORS};

// Re-export types for convenience
pub use ragchat_core::{ChunkConfig, ChunkData, Chunker, ContentType};
