//! SQLite-based storage implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};
use ulid::Ulid;

use ragchat_core::{Chunk, ContentType, Document, IndexStats, RagError, Result, Store};

use crate::schema::{SCHEMA, SCHEMA_VERSION};

/// Metadata key for the embedding model an index was built with.
pub const META_EMBEDDING_MODEL: &str = "embedding_model";

/// Metadata key for the embedding dimension an index was built with.
pub const META_DIMENSION: &str = "dimension";

const META_SCHEMA_VERSION: &str = "schema_version";

/// SQLite-based store implementation.
///
/// All statements run on a single connection guarded by a blocking Mutex.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RagError::database(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| RagError::database(format!("Failed to initialize schema: {}", e)))?;
        Self::write_schema_version(&conn)?;

        info!("Vector store opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Configure SQLite connection for optimal performance.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RagError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    fn write_schema_version(conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO index_meta (key, value) VALUES (?1, ?2)",
            params![META_SCHEMA_VERSION, SCHEMA_VERSION.to_string()],
        )
        .map_err(|e| RagError::database(e.to_string()))?;
        Ok(())
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().map_err(|e| RagError::database(e.to_string()))?;
        f(&conn)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn reset(&self) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::database(e.to_string()))?;

            tx.execute_batch(
                r#"
                DELETE FROM embeddings;
                DELETE FROM chunks;
                DELETE FROM documents;
                DELETE FROM index_meta;
                "#,
            )
            .map_err(|e| RagError::database(format!("Failed to reset store: {}", e)))?;
            Self::write_schema_version(&tx)?;

            tx.commit().map_err(|e| RagError::database(e.to_string()))?;

            info!("Vector store reset");
            Ok(())
        })
    }

    // Document operations

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let content_hash = doc.content_hash.map(|h| h.to_vec());
        let metadata = serde_json::to_string(&doc.metadata)?;

        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO documents (id, source_uri, content_hash, content,
                                       content_type, metadata, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    doc.id.to_string(),
                    doc.source_uri,
                    content_hash,
                    doc.content,
                    doc.content_type.name(),
                    metadata,
                    doc.created_at as i64,
                ],
            )
            .map_err(|e| RagError::database(format!("Failed to insert document: {}", e)))?;

            debug!("Inserted document: {} ({})", doc.id, doc.source_uri);
            Ok(())
        })
    }

    async fn get_document(&self, id: Ulid) -> Result<Option<Document>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, source_uri, content_hash, content,
                           content_type, metadata, created_at
                    FROM documents WHERE id = ?1
                    "#,
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            stmt.query_row(params![id.to_string()], Self::row_to_document)
                .optional()
                .map_err(|e| RagError::database(e.to_string()))
        })
    }

    // Chunk operations

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO chunks (id, doc_id, chunk_index, content,
                                            char_count, start_char, content_hash)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        "#,
                    )
                    .map_err(|e| RagError::database(e.to_string()))?;

                for chunk in chunks {
                    let content_hash = chunk.content_hash.map(|h| h.to_vec());
                    stmt.execute(params![
                        chunk.id.to_string(),
                        chunk.doc_id.to_string(),
                        chunk.chunk_index,
                        chunk.content,
                        chunk.char_count,
                        chunk.start_char,
                        content_hash,
                    ])
                    .map_err(|e| RagError::database(format!("Failed to insert chunk: {}", e)))?;
                }
            }

            tx.commit().map_err(|e| RagError::database(e.to_string()))?;

            debug!("Inserted {} chunks", chunks.len());
            Ok(())
        })
    }

    async fn get_chunk(&self, id: Ulid) -> Result<Option<Chunk>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, doc_id, chunk_index, content, char_count,
                           start_char, content_hash
                    FROM chunks WHERE id = ?1
                    "#,
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            stmt.query_row(params![id.to_string()], Self::row_to_chunk)
                .optional()
                .map_err(|e| RagError::database(e.to_string()))
        })
    }

    // Embedding operations

    async fn insert_embeddings(&self, chunk_ids: &[Ulid], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunk_ids.len() != embeddings.len() {
            return Err(RagError::invalid_argument(
                "chunk_ids and embeddings must have same length",
            ));
        }

        if let Some(first) = embeddings.first() {
            if embeddings.iter().any(|e| e.len() != first.len()) {
                return Err(RagError::invalid_argument(
                    "all embeddings in a batch must have the same dimension",
                ));
            }
        }

        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare("INSERT INTO embeddings (chunk_id, dimension, vector) VALUES (?1, ?2, ?3)")
                    .map_err(|e| RagError::database(e.to_string()))?;

                for (chunk_id, embedding) in chunk_ids.iter().zip(embeddings.iter()) {
                    stmt.execute(params![
                        chunk_id.to_string(),
                        embedding.len() as i64,
                        vec_to_bytes(embedding),
                    ])
                    .map_err(|e| RagError::database(format!("Failed to insert embedding: {}", e)))?;
                }
            }

            tx.commit().map_err(|e| RagError::database(e.to_string()))?;

            debug!("Inserted {} embeddings", chunk_ids.len());
            Ok(())
        })
    }

    // Search operations

    async fn vector_search(&self, embedding: &[f32], k: u32) -> Result<Vec<(Ulid, f32)>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT chunk_id, dimension, vector FROM embeddings ORDER BY rowid")
                .map_err(|e| RagError::database(e.to_string()))?;

            let mut rows = stmt.query([]).map_err(|e| RagError::database(e.to_string()))?;
            let mut scored: Vec<(Ulid, f32)> = Vec::new();

            while let Some(row) = rows.next().map_err(|e| RagError::database(e.to_string()))? {
                let id_str: String = row.get(0).map_err(|e| RagError::database(e.to_string()))?;
                let dimension: i64 = row.get(1).map_err(|e| RagError::database(e.to_string()))?;
                let bytes: Vec<u8> = row.get(2).map_err(|e| RagError::database(e.to_string()))?;

                if dimension as usize != embedding.len() {
                    return Err(RagError::invalid_argument(format!(
                        "query dimension {} does not match index dimension {}",
                        embedding.len(),
                        dimension
                    )));
                }

                let stored = bytes_to_vec(&bytes);
                scored.push((
                    Ulid::from_string(&id_str).unwrap_or_else(|_| Ulid::nil()),
                    squared_l2(embedding, &stored),
                ));
            }

            Ok(scored)
        })?;

        // Stable sort keeps insertion order for equal distances
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k as usize);

        Ok(scored)
    }

    async fn keyword_search(&self, query: &str, k: u32) -> Result<Vec<(Ulid, f32)>> {
        let escaped_query = escape_fts5_query(query);
        if escaped_query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT c.id, bm25(chunks_fts) as score
                    FROM chunks_fts f
                    JOIN chunks c ON c.rowid = f.rowid
                    WHERE chunks_fts MATCH ?1
                    ORDER BY score
                    LIMIT ?2
                    "#,
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            let results = stmt
                .query_map(params![escaped_query, k], |row| {
                    let id_str: String = row.get(0)?;
                    let score: f64 = row.get(1)?;
                    // bm25 is lower-is-better
                    Ok((
                        Ulid::from_string(&id_str).unwrap_or_else(|_| Ulid::nil()),
                        (-score) as f32,
                    ))
                })
                .map_err(|e| RagError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::database(e.to_string()))?;

            Ok(results)
        })
    }

    // Index metadata

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RagError::database(e.to_string()))
        })
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| RagError::database(e.to_string()))?;
            Ok(())
        })
    }

    // Stats

    async fn get_stats(&self) -> Result<IndexStats> {
        let embedding_model = self.get_meta(META_EMBEDDING_MODEL).await?;
        let dimension = self
            .get_meta(META_DIMENSION)
            .await?
            .and_then(|d| d.parse::<usize>().ok());

        self.with_conn(move |conn| {
            let count = |sql: &str| -> Result<u64> {
                conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                    .map(|n| n.max(0) as u64)
                    .map_err(|e| RagError::database(e.to_string()))
            };

            let documents = count("SELECT COUNT(*) FROM documents")?;
            let chunks = count("SELECT COUNT(*) FROM chunks")?;
            let embeddings = count("SELECT COUNT(*) FROM embeddings")?;

            // Get page count and page size to estimate storage
            let page_count: i64 = conn
                .query_row("PRAGMA page_count", [], |row| row.get(0))
                .unwrap_or(0);
            let page_size: i64 = conn
                .query_row("PRAGMA page_size", [], |row| row.get(0))
                .unwrap_or(4096);

            Ok(IndexStats {
                documents,
                chunks,
                embeddings,
                storage_bytes: (page_count * page_size).max(0) as u64,
                embedding_model,
                dimension,
            })
        })
    }
}

// Helper methods
impl SqliteStore {
    /// Convert a row to a Document.
    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
        let id_str: String = row.get(0)?;
        let content_hash: Option<Vec<u8>> = row.get(2)?;
        let content_type: String = row.get(4)?;
        let metadata: String = row.get(5)?;

        Ok(Document {
            id: Ulid::from_string(&id_str).unwrap_or_else(|_| Ulid::nil()),
            source_uri: row.get(1)?,
            content: row.get(3)?,
            content_type: ContentType::from_name(&content_type),
            content_hash: content_hash.and_then(|v| v.try_into().ok()),
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            created_at: row.get::<_, i64>(6)? as u64,
        })
    }

    /// Convert a row to a Chunk.
    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
        let id_str: String = row.get(0)?;
        let doc_id_str: String = row.get(1)?;
        let content_hash: Option<Vec<u8>> = row.get(6)?;

        Ok(Chunk {
            id: Ulid::from_string(&id_str).unwrap_or_else(|_| Ulid::nil()),
            doc_id: Ulid::from_string(&doc_id_str).unwrap_or_else(|_| Ulid::nil()),
            chunk_index: row.get(2)?,
            content: row.get(3)?,
            char_count: row.get(4)?,
            start_char: row.get(5)?,
            content_hash: content_hash.and_then(|v| v.try_into().ok()),
        })
    }
}

/// Convert f32 vector to bytes (little-endian).
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert little-endian bytes back to an f32 vector.
fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Quote every term so FTS5 operators in user text are matched literally.
fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_doc(texts: &[&str]) -> (SqliteStore, Vec<Chunk>) {
        let store = SqliteStore::open_memory().unwrap();
        let doc = Document::new("documents/notes.txt", &texts.join("\n"), ContentType::PlainText);
        store.insert_document(&doc).await.unwrap();

        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(doc.id, i as u32, t, 0))
            .collect();
        store.insert_chunks(&chunks).await.unwrap();
        (store, chunks)
    }

    #[tokio::test]
    async fn test_open_memory() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.get_stats().await.unwrap().documents, 0);
        assert_eq!(
            store.get_meta(META_SCHEMA_VERSION).await.unwrap(),
            Some(SCHEMA_VERSION.to_string())
        );
    }

    #[tokio::test]
    async fn test_document_round_trip() {
        let store = SqliteStore::open_memory().unwrap();

        let doc = Document::new("documents/a.pdf", "page one", ContentType::Pdf)
            .with_metadata("page", serde_json::json!(0));
        store.insert_document(&doc).await.unwrap();

        let retrieved = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(retrieved.source_uri, "documents/a.pdf");
        assert_eq!(retrieved.content_type, ContentType::Pdf);
        assert_eq!(retrieved.page(), Some(0));
        assert_eq!(retrieved.content_hash, doc.content_hash);

        assert!(store.get_document(Ulid::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chunks() {
        let (store, chunks) = store_with_doc(&["alpha", "beta", "gamma"]).await;

        let second = store.get_chunk(chunks[1].id).await.unwrap().unwrap();
        assert_eq!(second.content, "beta");
        assert_eq!(second.doc_id, chunks[0].doc_id);

        let one = store.get_chunk(chunks[2].id).await.unwrap().unwrap();
        assert_eq!(one.chunk_index, 2);
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_distance() {
        let (store, chunks) = store_with_doc(&["a", "b", "c"]).await;
        let ids: Vec<Ulid> = chunks.iter().map(|c| c.id).collect();
        store
            .insert_embeddings(&ids, &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]])
            .await
            .unwrap();

        let results = store.vector_search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, ids[0]);
        assert_eq!(results[0].1, 0.0);
        assert_eq!(results[1].0, ids[2]);
        assert!((results[1].1 - 0.02).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_vector_search_ties_keep_insertion_order() {
        let (store, chunks) = store_with_doc(&["first", "second", "third"]).await;
        let ids: Vec<Ulid> = chunks.iter().map(|c| c.id).collect();
        store
            .insert_embeddings(&ids, &[vec![0.0, 1.0], vec![0.0, 1.0], vec![0.0, 1.0]])
            .await
            .unwrap();

        let results = store.vector_search(&[0.0, 1.0], 10).await.unwrap();
        let order: Vec<Ulid> = results.iter().map(|r| r.0).collect();
        assert_eq!(order, ids);
    }

    #[tokio::test]
    async fn test_vector_search_dimension_mismatch() {
        let (store, chunks) = store_with_doc(&["a"]).await;
        store
            .insert_embeddings(&[chunks[0].id], &[vec![1.0, 0.0, 0.0]])
            .await
            .unwrap();

        let err = store.vector_search(&[1.0, 0.0], 1).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_insert_embeddings_length_mismatch() {
        let (store, chunks) = store_with_doc(&["a", "b"]).await;
        let err = store
            .insert_embeddings(&[chunks[0].id, chunks[1].id], &[vec![1.0]])
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_keyword_search() {
        let (store, chunks) = store_with_doc(&[
            "Rust ownership and borrowing rules",
            "Gardening tips for spring",
        ])
        .await;

        let results = store.keyword_search("ownership (borrowing)", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, chunks[0].id);

        assert!(store.keyword_search("   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_meta_and_stats() {
        let (store, chunks) = store_with_doc(&["a", "b"]).await;
        store
            .insert_embeddings(&[chunks[0].id, chunks[1].id], &[vec![1.0], vec![2.0]])
            .await
            .unwrap();
        store.set_meta(META_EMBEDDING_MODEL, "mock").await.unwrap();
        store.set_meta(META_DIMENSION, "1").await.unwrap();
        store.set_meta(META_DIMENSION, "1").await.unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.embeddings, 2);
        assert_eq!(stats.embedding_model.as_deref(), Some("mock"));
        assert_eq!(stats.dimension, Some(1));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let (store, chunks) = store_with_doc(&["keep nothing"]).await;
        store.insert_embeddings(&[chunks[0].id], &[vec![0.5]]).await.unwrap();
        store.set_meta(META_EMBEDDING_MODEL, "mock").await.unwrap();

        store.reset().await.unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.chunks, 0);
        assert_eq!(stats.embeddings, 0);
        assert!(stats.embedding_model.is_none());
        assert!(store.keyword_search("nothing", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_store").join("index.sqlite");

        let doc = Document::new("documents/x.md", "# Title", ContentType::Markdown);
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_document(&doc).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let loaded = reopened.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.content_type, ContentType::Markdown);
        assert_eq!(reopened.get_stats().await.unwrap().documents, 1);
    }

    #[test]
    fn test_escape_fts5_query() {
        assert_eq!(escape_fts5_query("hello world"), "\"hello\" OR \"world\"");
        assert_eq!(escape_fts5_query("say \"hi\""), "\"say\" OR \"\"\"hi\"\"\"");
        assert_eq!(escape_fts5_query(""), "");
    }

    #[test]
    fn test_bytes_round_trip() {
        let v = vec![1.5f32, -0.25, 0.0];
        assert_eq!(bytes_to_vec(&vec_to_bytes(&v)), v);
    }
}
