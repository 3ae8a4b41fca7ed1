//! ragchat-store - Persistent vector index
//!
//! Stores loaded documents, their chunks and chunk embeddings in a single
//! SQLite file. Vector search is an exact scan by squared L2 distance;
//! keyword search uses an FTS5 index kept in sync by triggers.

mod schema;
mod sqlite;

pub use sqlite::{SqliteStore, META_DIMENSION, META_EMBEDDING_MODEL};

// Re-export schema for testing/migrations
pub use schema::{SCHEMA, SCHEMA_VERSION};
