//! Vector search contract and an in-process index.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{EmbeddingError, Result};
use crate::normalize::cosine_similarity;

/// A document returned by a similarity search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// Document identifier.
    pub id: String,
    /// Similarity to the query vector (higher is closer).
    pub score: f32,
    /// Stored payload (title, text, tags, ...).
    pub payload: Value,
}

/// Nearest-neighbor lookup over a document collection.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `top_k` documents ordered by descending score.
    async fn similarity_search(&self, vector: &[f32], top_k: usize)
        -> Result<Vec<ScoredDocument>>;
}

struct IndexedDocument {
    id: String,
    vector: Vec<f32>,
    payload: Value,
}

/// Brute-force cosine index held in memory.
pub struct InMemoryVectorIndex {
    dims: usize,
    docs: RwLock<Vec<IndexedDocument>>,
}

impl InMemoryVectorIndex {
    /// Create an empty index for vectors of `dims` components.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            docs: RwLock::new(Vec::new()),
        }
    }

    /// Insert or replace a document.
    pub fn upsert(&self, id: impl Into<String>, vector: Vec<f32>, payload: Value) -> Result<()> {
        if vector.len() != self.dims {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        let id = id.into();
        let mut docs = self.docs.write();
        docs.retain(|d| d.id != id);
        docs.push(IndexedDocument {
            id,
            vector,
            payload,
        });
        Ok(())
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

#[async_trait]
impl VectorSearch for InMemoryVectorIndex {
    async fn similarity_search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        if vector.len() != self.dims {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        let docs = self.docs.read();
        let mut scored: Vec<ScoredDocument> = docs
            .iter()
            .map(|d| ScoredDocument {
                id: d.id.clone(),
                score: cosine_similarity(vector, &d.vector),
                payload: d.payload.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index() -> InMemoryVectorIndex {
        let idx = InMemoryVectorIndex::new(2);
        idx.upsert("east", vec![1.0, 0.0], json!({"title": "east"})).unwrap();
        idx.upsert("north", vec![0.0, 1.0], json!({"title": "north"})).unwrap();
        idx.upsert("northeast", vec![0.7, 0.7], json!({"title": "ne"})).unwrap();
        idx
    }

    #[tokio::test]
    async fn results_are_ordered_by_score() {
        let hits = index().similarity_search(&[1.0, 0.1], 3).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["east", "northeast", "north"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn top_k_limits_results() {
        let hits = index().similarity_search(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "north");
        assert_eq!(hits[0].payload["title"], "north");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id() {
        let idx = index();
        idx.upsert("east", vec![0.0, -1.0], json!({})).unwrap();
        assert_eq!(idx.len(), 3);
        let hits = idx.similarity_search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].id, "northeast");
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let idx = index();
        assert!(matches!(
            idx.upsert("bad", vec![1.0], json!({})),
            Err(EmbeddingError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(idx.similarity_search(&[1.0, 0.0, 0.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn empty_index_returns_nothing() {
        let idx = InMemoryVectorIndex::new(4);
        assert!(idx.is_empty());
        assert!(idx.similarity_search(&[0.0; 4], 5).await.unwrap().is_empty());
    }
}
