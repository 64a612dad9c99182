/// Embedding Client — the single point of entry for the remote embedding
/// service. All vectors in the matching pipeline come through here or from
/// the sentence store.
///
/// The service contract: `POST /embed {text}` and `POST /embed/batch {texts}`
/// both return unit-normalized 768-dim vectors.
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub const EMBEDDING_DIMENSION: usize = 768;
/// Chunk size for long texts (service stability).
const MAX_CHARS: usize = 4_000;
/// Upper bound on chunks per text to keep batch requests sane.
const MAX_CHUNKS: usize = 8;
const REQUEST_TIMEOUT_SECS: u64 = 180;
/// Bound on concurrent in-flight requests; excess callers wait.
const MAX_IN_FLIGHT: usize = 8;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding service returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("embedding dimension mismatch: got {got}, expected {expected}")]
    Dimension { got: usize, expected: usize },
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct EmbedBatchRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedBatchResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Clone)]
pub struct EmbeddingClient {
    http: Client,
    base_url: String,
    limiter: Arc<Semaphore>,
}

impl EmbeddingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        }
    }

    /// Embeds a single text. Empty input returns the zero vector without a
    /// service call; texts over the chunk limit are split on paragraph
    /// boundaries, embedded independently, mean-pooled and re-normalized.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Ok(zero_vector());
        }
        if text.chars().count() > MAX_CHARS {
            let chunks = split_into_chunks(text);
            let embedded = self.embed_batch(&chunks).await?;
            return Ok(mean_pool(&embedded));
        }
        self.embed_single(text).await
    }

    /// Embeds a list of texts, preserving alignment. The batch endpoint is
    /// tried first; on failure each text is embedded individually and failed
    /// items are substituted with zero vectors so the output stays aligned.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let clipped: Vec<String> = texts.iter().map(|t| clip_chars(t, MAX_CHARS)).collect();

        match self.embed_batch_endpoint(&clipped).await {
            Ok(embeddings) if embeddings.len() == clipped.len() => return Ok(embeddings),
            Ok(embeddings) => warn!(
                "batch endpoint returned {} embeddings for {} texts, falling back to singles",
                embeddings.len(),
                clipped.len()
            ),
            Err(e) => debug!("batch endpoint unavailable, falling back to singles: {e}"),
        }

        let mut out = Vec::with_capacity(clipped.len());
        for text in &clipped {
            match Box::pin(self.embed(text)).await {
                Ok(vec) => out.push(vec),
                Err(e) => {
                    warn!("embedding failed for one batch item, substituting zero vector: {e}");
                    out.push(zero_vector());
                }
            }
        }
        Ok(out)
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .expect("embedding limiter closed");

        let response = self
            .http
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbedResponse = response.json().await?;
        if body.embedding.len() != EMBEDDING_DIMENSION {
            return Err(EmbeddingError::Dimension {
                got: body.embedding.len(),
                expected: EMBEDDING_DIMENSION,
            });
        }
        Ok(body.embedding)
    }

    async fn embed_batch_endpoint(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .expect("embedding limiter closed");

        let response = self
            .http
            .post(format!("{}/embed/batch", self.base_url))
            .json(&EmbedBatchRequest { texts })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbedBatchResponse = response.json().await?;
        Ok(body.embeddings)
    }
}

pub fn zero_vector() -> Vec<f32> {
    vec![0.0; EMBEDDING_DIMENSION]
}

/// Cosine similarity as an inner product, clamped to [0, 1].
/// Precondition: both sides are unit-normalized (see `normalized`).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (dot as f64).clamp(0.0, 1.0)
}

/// Re-normalizes a stored vector whose norm drifted from 1 (older storage
/// formats did not guarantee normalization). Zero vectors pass through.
pub fn normalized(mut vec: Vec<f32>) -> Vec<f32> {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 && (norm - 1.0).abs() > 1e-3 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

fn clip_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Splits a long text into at most `MAX_CHUNKS` chunks of at most
/// `MAX_CHARS` characters, preferring paragraph boundaries. Over-long
/// paragraphs are sliced.
fn split_into_chunks(text: &str) -> Vec<String> {
    let normalized_text = text.replace('\r', "\n");
    let paragraphs: Vec<&str> = normalized_text
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .collect();

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    let flush = |current: &mut String, current_len: &mut usize, chunks: &mut Vec<String>| {
        if !current.is_empty() {
            chunks.push(std::mem::take(current));
        }
        *current_len = 0;
    };

    for paragraph in paragraphs {
        let para_len = paragraph.chars().count();
        if para_len > MAX_CHARS {
            flush(&mut current, &mut current_len, &mut chunks);
            let pieces: Vec<char> = paragraph.chars().collect();
            for piece in pieces.chunks(MAX_CHARS) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        let separator_len = if current.is_empty() { 0 } else { 2 };
        if current_len + para_len + separator_len > MAX_CHARS {
            flush(&mut current, &mut current_len, &mut chunks);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(paragraph);
        current_len += para_len;
    }
    flush(&mut current, &mut current_len, &mut chunks);

    chunks.truncate(MAX_CHUNKS);
    if chunks.is_empty() {
        chunks.push(clip_chars(text, MAX_CHARS));
    }
    chunks
}

/// Mean-pools chunk embeddings and re-normalizes the result.
fn mean_pool(embeddings: &[Vec<f32>]) -> Vec<f32> {
    if embeddings.is_empty() {
        return zero_vector();
    }
    let mut pooled = vec![0.0f32; EMBEDDING_DIMENSION];
    for embedding in embeddings {
        for (acc, v) in pooled.iter_mut().zip(embedding) {
            *acc += v;
        }
    }
    let n = embeddings.len() as f32;
    for v in &mut pooled {
        *v /= n;
    }
    let norm = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut pooled {
            *v /= norm;
        }
    }
    pooled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim_a: usize, dim_b: usize, angle: f32) -> (Vec<f32>, Vec<f32>) {
        let mut a = vec![0.0f32; EMBEDDING_DIMENSION];
        let mut b = vec![0.0f32; EMBEDDING_DIMENSION];
        a[dim_a] = 1.0;
        b[dim_a] = angle.cos();
        b[dim_b] = angle.sin();
        (a, b)
    }

    #[test]
    fn test_cosine_identical_unit_vectors_is_one() {
        let (a, _) = unit(0, 1, 0.0);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_is_zero() {
        let (a, b) = unit(0, 1, std::f32::consts::FRAC_PI_2);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_clamps_negative_to_zero() {
        let mut a = vec![0.0f32; EMBEDDING_DIMENSION];
        let mut b = vec![0.0f32; EMBEDDING_DIMENSION];
        a[0] = 1.0;
        b[0] = -1.0;
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_stays_in_unit_interval() {
        let (a, b) = unit(3, 7, 0.4);
        let sim = cosine_similarity(&a, &b);
        assert!((0.0..=1.0).contains(&sim));
    }

    #[test]
    fn test_normalized_fixes_drifted_vector() {
        let mut v = vec![0.0f32; EMBEDDING_DIMENSION];
        v[0] = 2.0;
        let n = normalized(v);
        let norm = n.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_leaves_unit_vector_untouched() {
        let mut v = vec![0.0f32; EMBEDDING_DIMENSION];
        v[5] = 1.0;
        assert_eq!(normalized(v.clone()), v);
    }

    #[test]
    fn test_normalized_passes_zero_vector_through() {
        assert_eq!(normalized(zero_vector()), zero_vector());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = split_into_chunks("hello world");
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_long_text_splits_on_paragraphs() {
        let para = "가".repeat(3_000);
        let text = format!("{para}\n\n{para}\n\n{para}");
        let chunks = split_into_chunks(&text);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_CHARS);
        }
    }

    #[test]
    fn test_chunk_count_is_capped() {
        let para = "x".repeat(3_900);
        let text = vec![para; 20].join("\n\n");
        let chunks = split_into_chunks(&text);
        assert!(chunks.len() <= MAX_CHUNKS);
    }

    #[test]
    fn test_oversized_paragraph_is_sliced() {
        let text = "y".repeat(MAX_CHARS * 2 + 10);
        let chunks = split_into_chunks(&text);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_CHARS);
        }
    }

    #[test]
    fn test_mean_pool_renormalizes() {
        let mut a = vec![0.0f32; EMBEDDING_DIMENSION];
        let mut b = vec![0.0f32; EMBEDDING_DIMENSION];
        a[0] = 1.0;
        b[1] = 1.0;
        let pooled = mean_pool(&[a, b]);
        let norm = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((pooled[0] - pooled[1]).abs() < 1e-6);
    }

    #[test]
    fn test_mean_pool_of_nothing_is_zero_vector() {
        assert_eq!(mean_pool(&[]), zero_vector());
    }

    #[test]
    fn test_clip_chars_respects_char_boundaries() {
        let text = "한글".repeat(10);
        let clipped = clip_chars(&text, 7);
        assert_eq!(clipped.chars().count(), 7);
    }
}
