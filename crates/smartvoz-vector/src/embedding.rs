//! Embedding service trait and implementations.
//!
//! - `OpenAiEmbedding` calls an OpenAI-compatible `/embeddings` endpoint.
//!   This is the primary provider.
//! - `OnnxEmbeddingService` loads a sentence-transformer ONNX model (e.g.
//!   bge-small-en-v1.5) via ort and tokenizes with the HuggingFace tokenizers
//!   crate. This is the local fallback.
//! - `MockEmbedding` produces deterministic lexical hash vectors for tests
//!   and offline demos.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info, warn};

use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::text;

/// Service for generating text embeddings.
///
/// Used both when building the index and when embedding queries, so the two
/// sides must use the same provider and model.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Embed several texts. The default embeds them one at a time.
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed(text).await?);
            }
            Ok(vectors)
        }
    }

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;

    /// Provider name recorded in the index manifest.
    fn provider(&self) -> &str;

    fn model_name(&self) -> &str;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// Because `EmbeddingService::embed` returns `impl Future` it is not
/// object-safe. This trait uses boxed futures instead, so the provider can be
/// chosen at runtime and stored as `Arc<dyn DynEmbeddingService>`.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;

    fn embed_batch_boxed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;

    fn dimensions(&self) -> usize;

    fn provider(&self) -> &str;

    fn model_name(&self) -> &str;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
        Box::pin(self.embed(text))
    }

    fn embed_batch_boxed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(self.embed_batch(texts))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }

    fn provider(&self) -> &str {
        EmbeddingService::provider(self)
    }

    fn model_name(&self) -> &str {
        EmbeddingService::model_name(self)
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vector.iter_mut() {
            *val /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAiEmbedding - OpenAI-compatible HTTP API
// ---------------------------------------------------------------------------

const MAX_RETRIES: u32 = 3;
const REQUEST_BATCH_SIZE: usize = 64;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding client for the OpenAI `/embeddings` API.
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
}

impl std::fmt::Debug for OpenAiEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedding")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl OpenAiEmbedding {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SmartvozError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        let model = model.into();
        let dimensions = Self::known_dimensions(&model);
        Ok(Self {
            client,
            api_key: api_key.into(),
            model,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dimensions,
        })
    }

    /// Output size of the published OpenAI embedding models.
    pub fn known_dimensions(model: &str) -> usize {
        match model {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err((retryable, e)) => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        error = %e,
                        "Embedding request failed"
                    );
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SmartvozError::Provider("Embedding request failed after retries".to_string())
        }))
    }

    /// One request. The flag on error tells whether retrying can help.
    async fn make_request(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, (bool, SmartvozError)> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                input: texts,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| (true, SmartvozError::Provider(format!("Request failed: {}", e))))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err((
                retryable,
                SmartvozError::Provider(format!("API error {}: {}", status, body)),
            ));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            (
                false,
                SmartvozError::Provider(format!("Failed to parse response: {}", e)),
            )
        })?;
        if parsed.data.len() != texts.len() {
            return Err((
                false,
                SmartvozError::Provider(format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    parsed.data.len()
                )),
            ));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl EmbeddingService for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| SmartvozError::Provider("Empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(REQUEST_BATCH_SIZE) {
            all.extend(self.request_with_retry(chunk).await?);
            debug!(done = all.len(), total = texts.len(), "Embedded batch");
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService - local ONNX Runtime inference
// ---------------------------------------------------------------------------

/// ONNX Runtime-backed embedding service using a sentence-transformer model.
///
/// Expects a model directory containing:
/// - `model.onnx`: the sentence-transformer ONNX export
/// - `tokenizer.json`: the HuggingFace fast-tokenizer file
///
/// Mean pooling (masked) and L2 normalisation produce one vector per input.
pub struct OnnxEmbeddingService {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
    model_name: String,
}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("model", &self.model_name)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl OnnxEmbeddingService {
    /// Load a sentence-transformer model from the given directory.
    pub fn from_directory(model_dir: &Path, model_name: impl Into<String>) -> Result<Self> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
            model_name,
        )
    }

    /// Load from explicit model and tokenizer file paths.
    pub fn from_files(
        model_path: &Path,
        tokenizer_path: &Path,
        model_name: impl Into<String>,
    ) -> Result<Self> {
        if !model_path.exists() {
            return Err(SmartvozError::NotFound(format!(
                "ONNX model not found at {}",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(SmartvozError::NotFound(format!(
                "Tokenizer not found at {}",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| SmartvozError::Provider(format!("ONNX session builder: {}", e)))?
            .with_intra_threads(1)
            .map_err(|e| SmartvozError::Provider(format!("ONNX set threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| SmartvozError::Provider(format!("ONNX load model: {}", e)))?;

        // Sentence-transformer output is [batch, seq_len, hidden_dim].
        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .map(|d| if d > 0 { d as usize } else { 384 })
            .unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| SmartvozError::Provider(format!("Failed to load tokenizer: {}", e)))?;
        limit_sequence_length(&mut tokenizer)?;

        let model_name = model_name.into();
        info!(
            model = %model_name,
            path = %model_path.display(),
            dimensions,
            "Loaded ONNX embedding model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions,
            model_name,
        })
    }

    /// Tokenize, run inference, and mean-pool the output.
    fn embed_sync(session: &Mutex<Session>, tokenizer: &Tokenizer, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(SmartvozError::Provider("Cannot embed empty text".to_string()));
        }

        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| SmartvozError::Provider(format!("Tokenization failed: {}", e)))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();

        let seq_len = input_ids.len();
        let shape_err = |what: &str, e: ndarray::ShapeError| {
            SmartvozError::Provider(format!("{} array: {}", what, e))
        };
        let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| shape_err("input_ids", e))?;
        let mask_array = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
            .map_err(|e| shape_err("attention_mask", e))?;
        let type_array = ndarray::Array2::from_shape_vec((1, seq_len), token_type_ids)
            .map_err(|e| shape_err("token_type_ids", e))?;

        let ids_ref = TensorRef::from_array_view(&ids_array)
            .map_err(|e| SmartvozError::Provider(format!("TensorRef input_ids: {}", e)))?;
        let mask_ref = TensorRef::from_array_view(&mask_array)
            .map_err(|e| SmartvozError::Provider(format!("TensorRef attention_mask: {}", e)))?;
        let type_ref = TensorRef::from_array_view(&type_array)
            .map_err(|e| SmartvozError::Provider(format!("TensorRef token_type_ids: {}", e)))?;

        let mut session = session
            .lock()
            .map_err(|e| SmartvozError::Provider(format!("Session lock poisoned: {}", e)))?;
        let outputs = session
            .run(ort::inputs![ids_ref, mask_ref, type_ref])
            .map_err(|e| SmartvozError::Provider(format!("ONNX inference failed: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SmartvozError::Provider(format!("Extract embeddings: {}", e)))?;

        let shape_dims: Vec<i64> = shape.iter().copied().collect();
        let hidden_dim = match shape_dims.as_slice() {
            [.., _, last] => *last as usize,
            _ => {
                return Err(SmartvozError::Provider(format!(
                    "Unexpected output shape: {:?}",
                    shape_dims
                )))
            }
        };

        let mut pooled = vec![0.0f32; hidden_dim];
        let mut count = 0.0f32;
        for (tok_idx, &mask_val) in attention_mask.iter().enumerate() {
            if mask_val > 0 {
                let offset = tok_idx * hidden_dim;
                for (dim, slot) in pooled.iter_mut().enumerate() {
                    *slot += data[offset + dim];
                }
                count += 1.0;
            }
        }
        if count > 0.0 {
            for val in &mut pooled {
                *val /= count;
            }
        }

        l2_normalize(&mut pooled);
        Ok(pooled)
    }
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // Inference is CPU-bound; run on a blocking thread.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text_owned = text.to_string();

        tokio::task::spawn_blocking(move || Self::embed_sync(&session, &tokenizer, &text_owned))
            .await
            .map_err(|e| SmartvozError::Provider(format!("Embedding task panicked: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider(&self) -> &str {
        "onnx"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Sequence limit of BERT-style sentence encoders. Longer inputs overflow the
/// position embeddings and fail at inference time.
const MAX_SEQUENCE_TOKENS: usize = 512;

/// Truncate every encoding to [`MAX_SEQUENCE_TOKENS`], keeping the start of
/// the text.
fn limit_sequence_length(tokenizer: &mut Tokenizer) -> Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_SEQUENCE_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| SmartvozError::Provider(format!("Failed to configure truncation: {}", e)))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic lexical hash vectors
// ---------------------------------------------------------------------------

const MOCK_DIMENSIONS: usize = 384;

/// Deterministic embedding service for tests and offline demos.
///
/// Each folded word token is hashed (FNV-1a) into one of 384 signed buckets,
/// so texts sharing words get high cosine similarity and identical texts get
/// identical vectors across runs.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding;

impl MockEmbedding {
    pub fn new() -> Self {
        Self
    }

    fn fnv1a(bytes: &[u8]) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in bytes {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }

    fn hash_to_vector(input: &str) -> Vec<f32> {
        let mut result = vec![0.0f32; MOCK_DIMENSIONS];
        for token in text::tokens(input) {
            let h = Self::fnv1a(token.as_bytes());
            let bucket = (h % MOCK_DIMENSIONS as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            result[bucket] += sign;
        }
        l2_normalize(&mut result);
        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SmartvozError::Provider("Cannot embed empty text".to_string()));
        }
        Ok(Self::hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        MOCK_DIMENSIONS
    }

    fn provider(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "lexical-hash-384"
    }
}
