//! ragchat-embed - Sentence embedding models
//!
//! Turns chunk and query text into fixed-size vectors for similarity search.
//!
//! - [`OnnxEmbedder`] runs a sentence-transformers model (all-MiniLM-L6-v2 by
//!   default) exported to ONNX, with mean pooling and L2 normalization.
//! - [`MockEmbedder`] produces deterministic vectors without any model files.

mod mock;
mod onnx;

pub use mock::MockEmbedder;
pub use onnx::OnnxEmbedder;

// Re-export the Embedder trait for convenience
pub use ragchat_core::Embedder;
