//! Configuration types for the ragchat system.
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables (a `.env` file in the working directory is loaded
//! first). Every field has a default, so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::traits::ChunkConfig;

/// Main configuration for the ragchat system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Gemini configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Retrieval configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Filesystem locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// REST server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gemini API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key (usually supplied through `GOOGLE_API_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier recorded in the index.
    #[serde(default = "default_embedding_model")]
    pub model_name: String,

    /// Directory containing `model.onnx` and `tokenizer.json`.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Embedding dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum tokens per input; longer inputs are truncated.
    #[serde(default = "default_embedding_max_tokens")]
    pub max_tokens: usize,

    /// Batch size for embedding.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Feed `token_type_ids` to the model (BERT-family models need it).
    #[serde(default = "default_true")]
    pub token_type_ids: bool,

    /// Prefix prepended to queries (asymmetric models only).
    #[serde(default)]
    pub query_prefix: String,

    /// Prefix prepended to documents (asymmetric models only).
    #[serde(default)]
    pub document_prefix: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_embedding_model(),
            model_path: default_model_path(),
            dimension: default_dimension(),
            max_tokens: default_embedding_max_tokens(),
            batch_size: default_batch_size(),
            num_threads: default_num_threads(),
            token_type_ids: true,
            query_prefix: String::new(),
            document_prefix: String::new(),
        }
    }
}

impl EmbeddingConfig {
    /// Path of the ONNX model file.
    pub fn onnx_file(&self) -> PathBuf {
        self.model_path.join("model.onnx")
    }

    /// Path of the tokenizer definition.
    pub fn tokenizer_file(&self) -> PathBuf {
        self.model_path.join("tokenizer.json")
    }
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    /// Convert into the chunker's runtime configuration.
    pub fn to_chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of chunks stuffed into the prompt.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Fuse vector and keyword search.
    #[serde(default)]
    pub hybrid: bool,

    /// RRF constant k.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            hybrid: false,
            rrf_k: default_rrf_k(),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory scanned for documents.
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    /// Directory holding the persisted index.
    #[serde(default = "default_vector_store_path")]
    pub vector_store_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            vector_store_path: default_vector_store_path(),
        }
    }
}

impl StorageConfig {
    /// SQLite file inside the vector store directory.
    pub fn index_file(&self) -> PathBuf {
        self.vector_store_path.join("index.sqlite")
    }
}

/// REST server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted upload per file, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Maximum chat history entries kept in memory.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Allow cross-origin requests from any origin.
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            history_limit: default_history_limit(),
            cors: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Log file prefix.
    #[serde(default = "default_log_file")]
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            file_name: default_log_file(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "gemini-pro".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models").join("all-MiniLM-L6-v2")
}

fn default_dimension() -> usize {
    384
}

fn default_embedding_max_tokens() -> usize {
    256
}

fn default_batch_size() -> usize {
    32
}

fn default_num_threads() -> usize {
    4
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_top_k() -> usize {
    4
}

fn default_rrf_k() -> u32 {
    60
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("documents")
}

fn default_vector_store_path() -> PathBuf {
    PathBuf::from("vector_store")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_history_limit() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_file() -> String {
    "ragchat.log".to_string()
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RagError::config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ragchat").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("ragchat.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Load `.env`, the config file and environment overrides.
    pub fn from_env(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {:?}", env_file);
        }

        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::load_default()?,
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GOOGLE_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.llm.model = model;
        }
        if let Some(v) = get("MAX_TOKENS") {
            self.llm.max_output_tokens = parse_var("MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("TEMPERATURE") {
            self.llm.temperature = parse_var("TEMPERATURE", &v)?;
        }
        if let Some(v) = get("CHUNK_SIZE") {
            self.chunking.chunk_size = parse_var("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_var("CHUNK_OVERLAP", &v)?;
        }
        if let Some(path) = get("VECTOR_STORE_PATH") {
            self.storage.vector_store_path = PathBuf::from(path);
        }
        if let Some(path) = get("DOCUMENTS_PATH") {
            self.storage.documents_dir = PathBuf::from(path);
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.embedding.model_name = model;
        }
        if let Some(path) = get("EMBEDDING_MODEL_PATH") {
            self.embedding.model_path = PathBuf::from(path);
        }
        if let Some(v) = get("RETRIEVAL_K") {
            self.search.top_k = parse_var("RETRIEVAL_K", &v)?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Check that the configuration can drive a chatbot.
    pub fn validate(&self) -> Result<()> {
        if self
            .llm
            .api_key
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
        {
            return Err(RagError::MissingApiKey);
        }
        if self.chunking.chunk_size == 0 {
            return Err(RagError::config("chunk_size must be greater than zero"));
        }
        if self.chunking.chunk_overlap > self.chunking.chunk_size {
            return Err(RagError::config(format!(
                "chunk_overlap ({}) must not exceed chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.search.top_k == 0 {
            return Err(RagError::config("top_k must be greater than zero"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(RagError::config(format!(
                "temperature {} outside 0.0..=2.0",
                self.llm.temperature
            )));
        }

        tracing::info!("Configuration validated successfully");
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RagError::config(format!("Invalid value for {}: {:?} ({})", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!(config.llm.model, "gemini-pro");
        assert_eq!(config.llm.max_output_tokens, 2048);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.search.top_k, 4);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(
            config.storage.index_file(),
            PathBuf::from("vector_store").join("index.sqlite")
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RagConfig::default();
        config
            .apply_overrides(lookup(&[
                ("GOOGLE_API_KEY", "secret"),
                ("GEMINI_MODEL", "gemini-1.5-flash"),
                ("TEMPERATURE", "0.2"),
                ("CHUNK_SIZE", "500"),
                ("CHUNK_OVERLAP", "50"),
                ("VECTOR_STORE_PATH", "/tmp/vs"),
            ]))
            .unwrap();

        assert_eq!(config.llm.api_key.as_deref(), Some("secret"));
        assert_eq!(config.llm.model, "gemini-1.5-flash");
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.storage.vector_store_path, PathBuf::from("/tmp/vs"));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let mut config = RagConfig::default();
        let err = config
            .apply_overrides(lookup(&[("CHUNK_SIZE", "lots")]))
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("CHUNK_SIZE"));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let mut config = RagConfig::default();
        config
            .apply_overrides(lookup(&[("GOOGLE_API_KEY", "  "), ("GEMINI_MODEL", "")]))
            .unwrap();
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.llm.model, "gemini-pro");
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = RagConfig::default();
        assert!(matches!(config.validate(), Err(RagError::MissingApiKey)));
    }

    #[test]
    fn test_validate_overlap() {
        let mut config = RagConfig::default();
        config.llm.api_key = Some("key".to_string());
        config.chunking.chunk_overlap = 2000;
        assert!(config.validate().is_err());

        config.chunking.chunk_overlap = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragchat.toml");
        std::fs::write(
            &path,
            "[chunking]\nchunk_size = 800\n\n[search]\nhybrid = true\n",
        )
        .unwrap();

        let config = RagConfig::load(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert!(config.search.hybrid);
        assert_eq!(config.llm.model, "gemini-pro");
    }
}
