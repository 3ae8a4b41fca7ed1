//! Retrieval-augmented chatbot.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use ragchat_chunk::{Chunker, RecursiveChunker};
use ragchat_core::{
    ChatEntry, Chunk, Document, Embedder, IndexStats, LanguageModel, RagConfig, RagError, Result,
    SearchResult, Store,
};
use ragchat_embed::OnnxEmbedder;
use ragchat_llm::GeminiClient;
use ragchat_query::{QueryConfig, QueryEngine};
use ragchat_store::{SqliteStore, META_DIMENSION, META_EMBEDDING_MODEL};

use crate::loader;
use crate::prompt::{build_prompt, format_context};

/// A generated answer and the chunks it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<SearchResult>,
}

/// Readiness snapshot reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChatbotStatus {
    pub vector_store_ready: bool,
    pub documents_loaded: u64,
}

/// Chatbot state: models, the active vector store and chat history.
pub struct Chatbot {
    config: RagConfig,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    chunker: RecursiveChunker,

    /// Installed vector store, if one has been built or loaded.
    store: RwLock<Option<Arc<SqliteStore>>>,

    history: Mutex<VecDeque<ChatEntry>>,

    /// Serializes index rebuilds.
    rebuild: tokio::sync::Mutex<()>,
}

impl Chatbot {
    /// Create a chatbot from explicit model implementations.
    pub fn new(config: RagConfig, embedder: Arc<dyn Embedder>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            config,
            embedder,
            llm,
            chunker: RecursiveChunker::new(),
            store: RwLock::new(None),
            history: Mutex::new(VecDeque::new()),
            rebuild: tokio::sync::Mutex::new(()),
        }
    }

    /// Validate the configuration and construct the ONNX embedder and the
    /// Gemini client it describes.
    pub fn from_config(config: RagConfig) -> Result<Self> {
        config.validate()?;

        let embedder = OnnxEmbedder::from_config(&config.embedding)?;
        info!("Embeddings initialized with model: {}", config.embedding.model_name);

        let llm = GeminiClient::from_config(&config.llm)?;
        info!("Google Gemini initialized with model: {}", config.llm.model);

        Ok(Self::new(config, Arc::new(embedder), Arc::new(llm)))
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Configured documents directory.
    pub fn documents_dir(&self) -> &Path {
        &self.config.storage.documents_dir
    }

    /// Load documents from the configured directory and build or load the
    /// index. Returns the number of documents loaded.
    pub async fn initialize(&self) -> Result<usize> {
        let documents = self.load_documents(self.documents_dir()).await?;

        if documents.is_empty() {
            warn!(
                "No documents found in {}; continuing without retrieval",
                self.documents_dir().display()
            );
            return Ok(0);
        }

        self.create_vector_store(&documents, false).await?;
        Ok(documents.len())
    }

    /// Load every supported file under `dir` on the blocking pool.
    pub async fn load_documents(&self, dir: &Path) -> Result<Vec<Document>> {
        let dir: PathBuf = dir.to_path_buf();
        tokio::task::spawn_blocking(move || loader::load_documents(&dir))
            .await
            .map_err(|e| RagError::internal(format!("Document loading task failed: {}", e)))
    }

    /// Install a vector store for `documents`.
    ///
    /// An existing index on disk is reused unless `force_recreate` is set or
    /// it was built with a different embedding model.
    pub async fn create_vector_store(
        &self,
        documents: &[Document],
        force_recreate: bool,
    ) -> Result<IndexStats> {
        let index_file = self.config.storage.index_file();

        if index_file.exists() && !force_recreate {
            info!("Loading existing vector store...");
            match self.open_existing(&index_file).await {
                Ok((store, stats)) => {
                    info!(
                        "Vector store loaded successfully ({} documents, {} chunks)",
                        stats.documents, stats.chunks
                    );
                    self.install_store(Some(store));
                    return Ok(stats);
                }
                Err(e) => {
                    warn!("Failed to load existing vector store: {}", e);
                    info!("Creating new vector store...");
                }
            }
        }

        if documents.is_empty() {
            return Err(RagError::NoDocuments);
        }

        let _guard = self.rebuild.lock().await;

        // The installed index keeps serving until the new one is complete
        let staging = index_file.with_extension("sqlite.tmp");
        remove_index_files(&staging)?;

        let stats = match self.build_index(&staging, documents).await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Failed to build vector store: {}", e);
                if let Err(cleanup) = remove_index_files(&staging) {
                    warn!("Failed to remove {}: {}", staging.display(), cleanup);
                }
                return Err(e);
            }
        };

        let previous = self.store.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(previous) = previous {
            close_store(previous).await;
        }
        let swapped = remove_sidecars(&index_file)
            .and_then(|()| std::fs::rename(&staging, &index_file).map_err(RagError::from));
        if let Err(e) = swapped {
            error!("Failed to replace {}: {}", index_file.display(), e);
            if let Ok(store) = SqliteStore::open(&index_file) {
                self.install_store(Some(Arc::new(store)));
            }
            return Err(e);
        }

        self.install_store(Some(Arc::new(SqliteStore::open(&index_file)?)));

        info!("Vector store saved to: {}", index_file.display());
        Ok(stats)
    }

    /// Build a complete index at `path`. The connection is closed on return.
    async fn build_index(&self, path: &Path, documents: &[Document]) -> Result<IndexStats> {
        let store = SqliteStore::open(path)?;
        store.reset().await?;
        self.index_documents(&store, documents).await
    }

    async fn open_existing(&self, index_file: &Path) -> Result<(Arc<SqliteStore>, IndexStats)> {
        let store = Arc::new(SqliteStore::open(index_file)?);
        let stats = store.get_stats().await?;

        if stats.embeddings == 0 {
            return Err(RagError::database("index is empty"));
        }
        if stats.embedding_model.as_deref() != Some(self.embedder.model_name())
            || stats.dimension != Some(self.embedder.dimension())
        {
            return Err(RagError::database(format!(
                "index was built with {:?} ({:?} dims), active embedder is {} ({} dims)",
                stats.embedding_model,
                stats.dimension,
                self.embedder.model_name(),
                self.embedder.dimension()
            )));
        }

        Ok((store, stats))
    }

    async fn index_documents(&self, store: &SqliteStore, documents: &[Document]) -> Result<IndexStats> {
        info!("Splitting documents into chunks...");
        let chunk_config = self.config.chunking.to_chunk_config();

        let mut chunks = Vec::new();
        for doc in documents {
            store.insert_document(doc).await?;

            let pieces = self.chunker.chunk(&doc.content, doc.content_type, &chunk_config)?;
            let doc_chunks: Vec<Chunk> = pieces
                .iter()
                .enumerate()
                .map(|(idx, data)| Chunk::new(doc.id, idx as u32, &data.content, data.start_char as u32))
                .collect();

            store.insert_chunks(&doc_chunks).await?;
            chunks.extend(doc_chunks);
        }

        info!(
            "Created {} chunks from {} documents",
            chunks.len(),
            documents.len()
        );
        info!("Creating vector embeddings...");

        let batch_size = self.config.embedding.batch_size.max(1);
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let ids: Vec<_> = batch.iter().map(|c| c.id).collect();

            let embeddings = self.embedder.embed_documents(&texts).await?;
            store.insert_embeddings(&ids, &embeddings).await?;
        }

        store
            .set_meta(META_EMBEDDING_MODEL, self.embedder.model_name())
            .await?;
        store
            .set_meta(META_DIMENSION, &self.embedder.dimension().to_string())
            .await?;

        store.get_stats().await
    }

    fn current_store(&self) -> Option<Arc<SqliteStore>> {
        self.store
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn install_store(&self, store: Option<Arc<SqliteStore>>) {
        *self.store.write().unwrap_or_else(|e| e.into_inner()) = store;
    }

    /// Whether a vector store is installed.
    pub fn is_ready(&self) -> bool {
        self.current_store().is_some()
    }

    /// Find the `k` chunks closest to `query`.
    pub async fn retrieve_documents(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let store = self
            .current_store()
            .ok_or(RagError::VectorStoreNotInitialized)?;

        info!("Retrieving documents for query: {}...", preview(query, 100));

        let config = QueryConfig {
            top_k: k.min(u32::MAX as usize) as u32,
            ..QueryConfig::from(&self.config.search)
        };
        let results = QueryEngine::new(store, self.embedder.clone())
            .search(query, &config)
            .await?;

        info!("Retrieved {} relevant documents", results.total_results);
        Ok(results.results)
    }

    /// Answer `query`, grounding it in retrieved chunks when requested and
    /// an index is available.
    pub async fn answer(&self, query: &str, include_context: bool) -> Result<Answer> {
        if query.trim().is_empty() {
            return Err(RagError::invalid_argument("query must not be empty"));
        }

        info!("Generating response for query: {}...", preview(query, 100));

        if include_context && self.is_ready() {
            let sources = self
                .retrieve_documents(query, self.config.search.top_k)
                .await?;
            let prompt = build_prompt(&format_context(&sources), query);
            let response = self.llm.generate(&prompt).await?;

            info!("Used {} source documents for response", sources.len());
            Ok(Answer { response, sources })
        } else {
            let response = self.llm.generate(query).await?;
            Ok(Answer {
                response,
                sources: Vec::new(),
            })
        }
    }

    /// Answer `query` and record the exchange. Failures become an apology
    /// message and are not recorded.
    pub async fn generate_response(&self, query: &str, include_context: bool) -> String {
        match self.answer(query, include_context).await {
            Ok(answer) => {
                self.push_history(ChatEntry::new(query, &answer.response, include_context));
                info!("Response generated successfully");
                answer.response
            }
            Err(e) => {
                error!("Failed to generate response: {}", e);
                format!(
                    "I apologize, but I encountered an error while processing your request: {}",
                    e
                )
            }
        }
    }

    fn push_history(&self, entry: ChatEntry) {
        let limit = self.config.server.history_limit.max(1);
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(entry);
        while history.len() > limit {
            history.pop_front();
        }
    }

    /// Chat history, oldest first.
    pub fn chat_history(&self) -> Vec<ChatEntry> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear_chat_history(&self) {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clear();
        info!("Chat history cleared");
    }

    /// Reload documents from `dir` (or the configured directory) and force a
    /// rebuild. Returns the number of documents loaded; with none found the
    /// current index is kept.
    pub async fn reload(&self, dir: Option<&Path>) -> Result<usize> {
        let dir = dir.unwrap_or_else(|| self.documents_dir());
        let documents = self.load_documents(dir).await?;

        if documents.is_empty() {
            warn!("No documents found in {}; keeping current index", dir.display());
            return Ok(0);
        }

        self.create_vector_store(&documents, true).await?;
        info!("Documents reloaded: {}", documents.len());
        Ok(documents.len())
    }

    /// Vector store readiness and indexed document count.
    pub async fn status(&self) -> Result<ChatbotStatus> {
        match self.current_store() {
            Some(store) => Ok(ChatbotStatus {
                vector_store_ready: true,
                documents_loaded: store.get_stats().await?.documents,
            }),
            None => Ok(ChatbotStatus {
                vector_store_ready: false,
                documents_loaded: 0,
            }),
        }
    }
}

/// Wait for in-flight readers to release `store`, then close it.
async fn close_store(mut store: Arc<SqliteStore>) {
    loop {
        match Arc::try_unwrap(store) {
            Ok(owned) => {
                drop(owned);
                return;
            }
            Err(shared) => {
                store = shared;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// `path` with `suffix` appended to the file name.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Remove SQLite WAL and shared-memory files left next to `path`.
fn remove_sidecars(path: &Path) -> Result<()> {
    for suffix in ["-wal", "-shm"] {
        match std::fs::remove_file(with_suffix(path, suffix)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
    }
    Ok(())
}

/// Remove the database at `path` and its sidecars, if present.
fn remove_index_files(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }
    remove_sidecars(path)
}

/// First `max` characters of `text`.
fn preview(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
