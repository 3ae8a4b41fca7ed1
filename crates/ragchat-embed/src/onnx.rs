//! ONNX-based sentence embedding model.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use ragchat_core::{Embedder, EmbeddingConfig, RagError, Result};

/// Embedder backed by an ONNX export of a sentence-transformers model.
///
/// The model directory must contain `model.onnx` and `tokenizer.json`.
/// Inference runs on tokio's blocking pool.
pub struct OnnxEmbedder {
    model: Arc<OnnxModel>,

    /// Name recorded in the index metadata.
    model_name: String,

    dimension: usize,
    query_prefix: String,
    document_prefix: String,
}

/// Session and tokenizer shared with blocking inference tasks.
struct OnnxModel {
    /// ONNX inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    tokenizer: Tokenizer,

    max_tokens: usize,
    batch_size: usize,

    /// BERT-style models expect a `token_type_ids` input.
    token_type_ids: bool,
}

impl OnnxEmbedder {
    /// Load the model described by the embedding configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let model_file = config.onnx_file();
        let tokenizer_file = config.tokenizer_file();

        if !model_file.exists() {
            return Err(RagError::embedding(format!(
                "Model file not found: {}. Export {} to ONNX into {}",
                model_file.display(),
                config.model_name,
                config.model_path.display()
            )));
        }

        let session = Self::build_session(&model_file, config.num_threads)?;

        info!("Loading tokenizer from {:?}", tokenizer_file);
        let tokenizer = Tokenizer::from_file(&tokenizer_file)
            .map_err(|e| RagError::embedding(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            "Embedder initialized: model={}, dim={}, max_tokens={}",
            config.model_name, config.dimension, config.max_tokens
        );

        Ok(Self {
            model: Arc::new(OnnxModel {
                session: Mutex::new(session),
                tokenizer,
                max_tokens: config.max_tokens.max(1),
                batch_size: config.batch_size.max(1),
                token_type_ids: config.token_type_ids,
            }),
            model_name: config.model_name.clone(),
            dimension: config.dimension,
            query_prefix: config.query_prefix.clone(),
            document_prefix: config.document_prefix.clone(),
        })
    }

    /// Embed `texts` with `prefix` prepended, off the async worker threads.
    async fn embed_prefixed(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        let texts = prefixed(texts, prefix);
        let model = Arc::clone(&self.model);
        run_blocking(move || model.embed_all(&texts)).await
    }

    fn build_session(model_file: &Path, threads: usize) -> Result<Session> {
        info!("Loading ONNX model from {:?}", model_file);

        Session::builder()
            .map_err(|e| RagError::embedding(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::embedding(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(threads.max(1))
            .map_err(|e| RagError::embedding(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(model_file)
            .map_err(|e| RagError::embedding(format!("Failed to load model: {}", e)))
    }

}

impl OnnxModel {
    /// Embed texts in batches of `batch_size`.
    fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(batch)?);
        }
        Ok(embeddings)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| RagError::embedding(format!("Tokenization failed: {}", e)))?;

        // Pad to the longest sequence, truncating at the model limit
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens)
            .max(1);

        let batch_size = encodings.len();
        debug!("Embedding batch: size={}, max_len={}", batch_size, max_len);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            let len = ids.len().min(max_len);

            for j in 0..len {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
                type_ids[i * max_len + j] = types.get(j).copied().unwrap_or(0) as i64;
            }
        }

        let shape = vec![batch_size, max_len];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids))
            .map_err(|e| RagError::embedding(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask_tensor = Tensor::from_array((shape.clone(), attention_mask.clone()))
            .map_err(|e| RagError::embedding(format!("Failed to create mask tensor: {}", e)))?;

        let mut inputs = ort::inputs![
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor
        ];
        if self.token_type_ids {
            let type_ids_tensor = Tensor::from_array((shape, type_ids)).map_err(|e| {
                RagError::embedding(format!("Failed to create token type tensor: {}", e))
            })?;
            inputs.push(("token_type_ids".into(), type_ids_tensor.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| RagError::embedding(format!("Inference failed: {}", e)))?;

        // First output is the token embeddings (or already pooled sentence embeddings)
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::embedding(format!("Failed to extract tensor: {}", e)))?;

        let dims = view.shape().to_vec();
        debug!("Output shape: {:?}", dims);

        match dims.len() {
            3 => Ok(mean_pool(&view, &attention_mask, max_len)),
            2 => Ok((0..batch_size)
                .map(|i| l2_normalize((0..dims[1]).map(|j| view[[i, j]]).collect()))
                .collect()),
            _ => Err(RagError::embedding(format!(
                "Unexpected output shape: {:?}",
                dims
            ))),
        }
    }
}

/// Prepend `prefix` to every text.
fn prefixed(texts: &[&str], prefix: &str) -> Vec<String> {
    texts.iter().map(|t| format!("{}{}", prefix, t)).collect()
}

/// Run CPU-bound work on the blocking pool.
async fn run_blocking<F, T>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RagError::embedding(format!("Embedding task failed: {}", e)))?
}

/// Mean pooling over the sequence dimension, weighted by the attention mask.
///
/// `tensor` has shape [batch, seq, hidden]; `mask` is row-major [batch, max_len].
fn mean_pool(tensor: &ArrayViewD<'_, f32>, mask: &[i64], max_len: usize) -> Vec<Vec<f32>> {
    let shape = tensor.shape();
    let (batch_size, seq_len, hidden_dim) = (shape[0], shape[1], shape[2]);

    (0..batch_size)
        .map(|i| {
            let mut sum = vec![0.0f32; hidden_dim];
            let mut valid = 0usize;

            for j in 0..seq_len.min(max_len) {
                if mask[i * max_len + j] == 0 {
                    continue;
                }
                valid += 1;
                for (k, s) in sum.iter_mut().enumerate() {
                    *s += tensor[[i, j, k]];
                }
            }

            if valid == 0 {
                return sum;
            }
            l2_normalize(sum.into_iter().map(|s| s / valid as f32).collect())
        })
        .collect()
}

/// L2 normalize a vector.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_prefixed(texts, &self.document_prefix).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_prefixed(&[text], &self.query_prefix)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.model.max_tokens
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean_pool_ignores_padding() {
        // Two sequences of length 2; the second has one padding token
        let data = Array3::from_shape_vec(
            (2, 2, 2),
            vec![1.0, 0.0, 3.0, 0.0, 0.0, 2.0, 100.0, 100.0],
        )
        .unwrap()
        .into_dyn();
        let view = data.view();
        let mask = vec![1, 1, 1, 0];

        let pooled = mean_pool(&view, &mask, 2);

        assert_eq!(pooled.len(), 2);
        assert!((pooled[0][0] - 1.0).abs() < 1e-6);
        assert!(pooled[0][1].abs() < 1e-6);
        assert!(pooled[1][0].abs() < 1e-6);
        assert!((pooled[1][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_prefixed() {
        assert_eq!(
            prefixed(&["a", "b"], "query: "),
            vec!["query: a".to_string(), "query: b".to_string()]
        );
        assert!(prefixed(&[], "x").is_empty());
    }

    #[tokio::test]
    async fn test_inference_runs_off_the_runtime_thread() {
        let caller = std::thread::current().id();
        let worker = run_blocking(|| Ok(std::thread::current().id())).await.unwrap();
        assert_ne!(caller, worker);

        let err = run_blocking::<_, ()>(|| Err(RagError::embedding("bad input")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad input"));
    }

    #[test]
    fn test_missing_model_is_embedding_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            model_path: dir.path().to_path_buf(),
            ..EmbeddingConfig::default()
        };

        let err = OnnxEmbedder::from_config(&config).err().unwrap();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
        assert!(err.to_string().contains("model.onnx"));
    }
}
