//! Query engine for similarity and hybrid retrieval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use ragchat_core::{
    Embedder, RagError, Result, SearchConfig, SearchResult, SearchResults, Store,
};

use crate::fusion::reciprocal_rank_fusion;

/// Configuration for search queries.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Maximum number of results to return.
    pub top_k: u32,

    /// Also run keyword search and fuse with RRF.
    pub hybrid: bool,

    /// RRF smoothing constant.
    pub rrf_k: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            hybrid: false,
            rrf_k: crate::fusion::DEFAULT_RRF_K,
        }
    }
}

impl From<&SearchConfig> for QueryConfig {
    fn from(config: &SearchConfig) -> Self {
        Self {
            top_k: config.top_k.min(u32::MAX as usize) as u32,
            hybrid: config.hybrid,
            rrf_k: config.rrf_k as f32,
        }
    }
}

/// Retrieval engine over a store and an embedding model.
pub struct QueryEngine<S> {
    store: Arc<S>,
    embedder: Arc<dyn Embedder>,
}

impl<S> QueryEngine<S>
where
    S: Store,
{
    /// Create a new query engine.
    pub fn new(store: Arc<S>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Find the chunks most relevant to `query`.
    pub async fn search(&self, query: &str, config: &QueryConfig) -> Result<SearchResults> {
        if config.top_k == 0 {
            return Err(RagError::invalid_argument("top_k must be greater than zero"));
        }

        let start = Instant::now();
        debug!("Searching for: {:?}", query);

        let query_embedding = self.embedder.embed_query(query).await?;

        let ranked: Vec<(Ulid, f32, Option<f32>)> = if config.hybrid {
            let fetch_k = hybrid_fetch_k(config.top_k);

            let (vector_results, keyword_results) = tokio::join!(
                self.store.vector_search(&query_embedding, fetch_k),
                self.store.keyword_search(query, fetch_k)
            );
            let vector_results = vector_results?;
            let keyword_results = keyword_results?;

            debug!(
                "Vector search returned {} results, keyword search returned {} results",
                vector_results.len(),
                keyword_results.len()
            );

            let distances: HashMap<Ulid, f32> = vector_results.iter().copied().collect();
            reciprocal_rank_fusion(
                vec![vector_results, keyword_results],
                config.rrf_k,
                config.top_k as usize,
            )
            .into_iter()
            .map(|(id, score)| (id, score, distances.get(&id).copied()))
            .collect()
        } else {
            self.store
                .vector_search(&query_embedding, config.top_k)
                .await?
                .into_iter()
                .map(|(id, distance)| (id, 1.0 / (1.0 + distance), Some(distance)))
                .collect()
        };

        let mut results = Vec::with_capacity(ranked.len());
        for (chunk_id, score, distance) in ranked {
            let Some(chunk) = self.store.get_chunk(chunk_id).await? else {
                continue;
            };
            let Some(doc) = self.store.get_document(chunk.doc_id).await? else {
                continue;
            };

            results.push(SearchResult {
                rank: results.len() as u32 + 1,
                score,
                distance,
                chunk,
                source_uri: doc.source_uri,
            });
        }

        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            "Search completed in {}ms, returned {} results",
            latency_ms,
            results.len()
        );

        Ok(SearchResults {
            query: query.to_string(),
            total_results: results.len(),
            latency_ms,
            results,
        })
    }
}

/// Candidates fetched from each source before fusion.
fn hybrid_fetch_k(top_k: u32) -> u32 {
    top_k.saturating_mul(2).max(20)
}
