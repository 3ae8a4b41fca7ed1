//! ragchat-query - Retrieval and ranking
//!
//! Turns a user question into the most relevant stored chunks. By default
//! this is a pure nearest-neighbour lookup over chunk embeddings; hybrid mode
//! adds FTS5 keyword matches and combines both lists with Reciprocal Rank
//! Fusion (RRF).
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_query::{QueryConfig, QueryEngine};
//! use std::sync::Arc;
//!
//! let engine = QueryEngine::new(Arc::new(store), Arc::new(embedder));
//! let results = engine.search("what is chunk overlap?", &QueryConfig::default()).await?;
//! ```

mod engine;
mod fusion;

pub use engine::{QueryConfig, QueryEngine};
pub use fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};

// Re-export for convenience
pub use ragchat_core::{SearchResult, SearchResults};
