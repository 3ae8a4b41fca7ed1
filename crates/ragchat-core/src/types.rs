//! Core domain types for the ragchat system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ulid::Ulid;

/// Content type of a source file, determines how it is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Pdf,
    Markdown,
    PlainText,
    Unknown,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "md" => Self::Markdown,
            "txt" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect content type from file path.
    pub fn from_path(path: &str) -> Self {
        std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Parse the lowercase name stored in the database.
    pub fn from_name(name: &str) -> Self {
        match name {
            "pdf" => Self::Pdf,
            "markdown" => Self::Markdown,
            "plaintext" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Lowercase name used for storage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
            Self::PlainText => "plaintext",
            Self::Unknown => "unknown",
        }
    }

    /// Whether files of this type can be loaded.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// File extensions accepted by the loader and the upload endpoint.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".pdf", ".txt", ".md"];

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pdf => "PDF",
            Self::Markdown => "Markdown",
            Self::PlainText => "Plain Text",
            Self::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// A loaded document (or a single PDF page).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier (ULID).
    pub id: Ulid,

    /// Source path the document was loaded from.
    pub source_uri: String,

    /// Extracted text.
    pub content: String,

    /// Content type of the source file.
    pub content_type: ContentType,

    /// Blake3 hash of the extracted text.
    #[serde(with = "serde_bytes_opt")]
    pub content_hash: Option<[u8; 32]>,

    /// Loader metadata (`source`, `page`, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Creation timestamp (Unix millis).
    pub created_at: u64,
}

impl Document {
    /// Create a new document.
    pub fn new(source_uri: &str, content: &str, content_type: ContentType) -> Self {
        let content_hash = blake3::hash(content.as_bytes());
        let mut metadata = HashMap::new();
        metadata.insert(
            "source".to_string(),
            serde_json::Value::String(source_uri.to_string()),
        );

        Self {
            id: Ulid::new(),
            source_uri: source_uri.to_string(),
            content: content.to_string(),
            content_type,
            content_hash: Some(*content_hash.as_bytes()),
            metadata,
            created_at: now_millis(),
        }
    }

    /// Attach a metadata value.
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Page number for PDF pages, if known.
    pub fn page(&self) -> Option<u64> {
        self.metadata.get("page").and_then(|v| v.as_u64())
    }
}

/// A chunk of a document for embedding and search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier (ULID).
    pub id: Ulid,

    /// Parent document ID.
    pub doc_id: Ulid,

    /// Index within the document (0-based).
    pub chunk_index: u32,

    /// Chunk text content.
    pub content: String,

    /// Length in characters.
    pub char_count: u32,

    /// Character offset of the chunk in the document text.
    pub start_char: u32,

    /// Blake3 hash of chunk content.
    #[serde(with = "serde_bytes_opt")]
    pub content_hash: Option<[u8; 32]>,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(doc_id: Ulid, chunk_index: u32, content: &str, start_char: u32) -> Self {
        let content_hash = blake3::hash(content.as_bytes());

        Self {
            id: Ulid::new(),
            doc_id,
            chunk_index,
            content: content.to_string(),
            char_count: content.chars().count() as u32,
            start_char,
            content_hash: Some(*content_hash.as_bytes()),
        }
    }
}

/// A search result with score and chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result rank (1-indexed).
    pub rank: u32,

    /// Relevance score (higher is better).
    pub score: f32,

    /// Squared L2 distance to the query, when the hit came from vector search.
    pub distance: Option<f32>,

    /// The matched chunk.
    pub chunk: Chunk,

    /// Source document path.
    pub source_uri: String,
}

/// Search results container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// The original query.
    pub query: String,

    /// Total results returned.
    pub total_results: usize,

    /// Search latency in milliseconds.
    pub latency_ms: u64,

    /// Individual results.
    pub results: Vec<SearchResult>,
}

/// Statistics about the persisted index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of documents (PDF pages count individually).
    pub documents: u64,

    /// Number of chunks.
    pub chunks: u64,

    /// Number of embeddings.
    pub embeddings: u64,

    /// Database size in bytes.
    pub storage_bytes: u64,

    /// Embedding model recorded when the index was built.
    pub embedding_model: Option<String>,

    /// Embedding dimension recorded when the index was built.
    pub dimension: Option<usize>,
}

/// One question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// When the answer was produced.
    pub timestamp: DateTime<Utc>,

    /// The user query.
    pub query: String,

    /// The model's answer.
    pub response: String,

    /// Whether retrieved context was requested.
    pub include_context: bool,
}

impl ChatEntry {
    /// Create an entry stamped with the current time.
    pub fn new(query: &str, response: &str, include_context: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            query: query.to_string(),
            response: response.to_string(),
            include_context,
        }
    }
}

/// Helper module for optional byte array serialization.
mod serde_bytes_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => {
                let hex = hex::encode(bytes);
                hex.serialize(serializer)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(hex) => {
                let bytes = hex::decode(&hex).map_err(serde::de::Error::custom)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("invalid hash length"))?;
                Ok(Some(arr))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(ContentType::from_extension("pdf"), ContentType::Pdf);
        assert_eq!(ContentType::from_extension("PDF"), ContentType::Pdf);
        assert_eq!(ContentType::from_extension("md"), ContentType::Markdown);
        assert_eq!(ContentType::from_extension("txt"), ContentType::PlainText);
        assert_eq!(ContentType::from_extension("rs"), ContentType::Unknown);
    }

    #[test]
    fn test_content_type_from_path() {
        assert_eq!(ContentType::from_path("docs/guide.md"), ContentType::Markdown);
        assert_eq!(ContentType::from_path("notes.TXT"), ContentType::PlainText);
        assert_eq!(ContentType::from_path("no_extension"), ContentType::Unknown);
        assert!(!ContentType::from_path("image.png").is_supported());
        assert!(!ContentType::from_path("notes.markdown").is_supported());
    }

    #[test]
    fn test_supported_types_match_upload_extensions() {
        for ext in ["pdf", "PDF", "txt", "md", "markdown", "csv", "rs"] {
            let supported = ContentType::from_path(&format!("file.{}", ext)).is_supported();
            let listed = SUPPORTED_EXTENSIONS.contains(&format!(".{}", ext.to_lowercase()).as_str());
            assert_eq!(supported, listed, "extension {}", ext);
        }
    }

    #[test]
    fn test_content_type_name_round_trip() {
        for ct in [ContentType::Pdf, ContentType::Markdown, ContentType::PlainText] {
            assert_eq!(ContentType::from_name(ct.name()), ct);
        }
    }

    #[test]
    fn test_document_metadata() {
        let doc = Document::new("documents/a.pdf", "page text", ContentType::Pdf)
            .with_metadata("page", serde_json::json!(3));
        assert_eq!(doc.page(), Some(3));
        assert_eq!(doc.metadata["source"], "documents/a.pdf");
        assert_eq!(
            doc.content_hash,
            Some(*blake3::hash("page text".as_bytes()).as_bytes())
        );
    }

    #[test]
    fn test_chunk_counts_characters() {
        let chunk = Chunk::new(Ulid::new(), 0, "héllo", 0);
        assert_eq!(chunk.char_count, 5);
    }

    #[test]
    fn test_chat_entry_serializes_rfc3339() {
        let entry = ChatEntry::new("q", "a", true);
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(json["include_context"], true);
    }
}
