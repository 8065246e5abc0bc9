//! Embedding service trait and a deterministic hashing implementation.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::errors::{EmbeddingError, Result};
use crate::normalize::l2_normalize;

/// Trait for embedding text into vectors.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text (default: calls `embed` with one item).
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Inference("empty result".into()))
    }

    /// Whether the service is ready for inference.
    fn is_ready(&self) -> bool;

    /// Output embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Feature-hashing embedder for tests and offline runs.
///
/// Every lowercase alphanumeric token is hashed with SHA-256 into a bucket
/// and a sign; the token counts are accumulated and L2-normalized. Texts that
/// share vocabulary therefore score a positive cosine similarity, and the same
/// text always yields the same vector.
pub struct MockEmbeddingService {
    dims: usize,
    ready: AtomicBool,
}

impl MockEmbeddingService {
    /// Create a new mock service with the given dimensions.
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            ready: AtomicBool::new(true),
        }
    }

    /// Set whether this mock is ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let hash = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                hash[0], hash[1], hash[2], hash[3], hash[4], hash[5], hash[6], hash[7],
            ]) as usize
                % self.dims;
            let sign = if hash[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingService for MockEmbeddingService {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if !self.is_ready() {
            return Err(EmbeddingError::NotReady);
        }
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
