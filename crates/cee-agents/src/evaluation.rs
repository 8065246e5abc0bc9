//! Evaluation agent: scores a piece of output against evidence by embedding
//! similarity.

use std::sync::Arc;

use async_trait::async_trait;
use cee_embeddings::normalize::cosine_similarity;
use cee_embeddings::{EmbeddingService, VectorSearch};
use cee_runtime::{AgentError, AgentHandler, JobContext};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::collaborator_error;
use crate::params::{required_str, string_list};

/// Similarity at or above which output counts as supported.
pub const SUPPORTED_THRESHOLD: f32 = 0.6;
/// Similarity at or above which output counts as partially supported.
pub const PARTIAL_THRESHOLD: f32 = 0.3;

/// How well the evidence backs the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Best match ≥ [`SUPPORTED_THRESHOLD`].
    Supported,
    /// Best match ≥ [`PARTIAL_THRESHOLD`].
    PartiallySupported,
    /// Evidence exists but does not match.
    Unsupported,
    /// Nothing to compare against.
    NoEvidence,
}

impl Verdict {
    fn from_score(best: Option<f32>) -> Self {
        match best {
            None => Self::NoEvidence,
            Some(s) if s >= SUPPORTED_THRESHOLD => Self::Supported,
            Some(s) if s >= PARTIAL_THRESHOLD => Self::PartiallySupported,
            Some(_) => Self::Unsupported,
        }
    }
}

struct Evidence {
    source: String,
    text: String,
}

/// Compares `text` with caller-supplied `evidence`, or with documents
/// retrieved from the collection when none is supplied.
pub struct EvaluationAgent {
    embedder: Arc<dyn EmbeddingService>,
    search: Option<Arc<dyn VectorSearch>>,
    top_k: usize,
}

impl EvaluationAgent {
    /// Agent that only uses caller-supplied evidence.
    pub fn new(embedder: Arc<dyn EmbeddingService>) -> Self {
        Self {
            embedder,
            search: None,
            top_k: 0,
        }
    }

    /// Fall back to the top `top_k` documents when no evidence is supplied.
    #[must_use]
    pub fn with_search(mut self, search: Arc<dyn VectorSearch>, top_k: usize) -> Self {
        self.search = Some(search);
        self.top_k = top_k.max(1);
        self
    }

    async fn retrieve(&self, output_vector: &[f32]) -> Result<Vec<Evidence>, AgentError> {
        let Some(search) = &self.search else {
            return Ok(Vec::new());
        };
        let docs = search
            .similarity_search(output_vector, self.top_k)
            .await
            .map_err(collaborator_error)?;
        Ok(docs
            .into_iter()
            .filter_map(|d| {
                let text = d.payload.get("text").and_then(Value::as_str)?.to_string();
                Some(Evidence { source: d.id, text })
            })
            .collect())
    }
}

#[async_trait]
impl AgentHandler for EvaluationAgent {
    #[instrument(skip_all, fields(job_id = %ctx.job_id))]
    async fn execute(&self, payload: Value, ctx: JobContext) -> Result<Value, AgentError> {
        let output = required_str(&payload, "text")?;
        let supplied = string_list(&payload, "evidence")?;

        let output_vector = self
            .embedder
            .embed_single(output)
            .await
            .map_err(collaborator_error)?;

        let evidence = if supplied.is_empty() {
            self.retrieve(&output_vector).await?
        } else {
            supplied
                .into_iter()
                .enumerate()
                .map(|(i, text)| Evidence {
                    source: format!("provided[{i}]"),
                    text,
                })
                .collect()
        };
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let texts: Vec<String> = evidence.iter().map(|e| e.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&texts).await.map_err(collaborator_error)?
        };

        let scored: Vec<(String, f32)> = evidence
            .into_iter()
            .zip(vectors.iter())
            .map(|(e, v)| (e.source, cosine_similarity(&output_vector, v)))
            .collect();
        let best = scored.iter().map(|(_, s)| *s).reduce(f32::max);
        let mean = if scored.is_empty() {
            None
        } else {
            Some(scored.iter().map(|(_, s)| *s).sum::<f32>() / scored.len() as f32)
        };
        let verdict = Verdict::from_score(best);
        debug!(evidence = scored.len(), ?verdict, "output evaluated");

        Ok(json!({
            "verdict": verdict,
            "score": best,
            "mean": mean,
            "evidence": scored
                .iter()
                .map(|(source, similarity)| json!({"source": source, "similarity": similarity}))
                .collect::<Vec<_>>(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{DIMS, context, seeded_index};
    use cee_embeddings::MockEmbeddingService;

    #[test]
    fn verdict_thresholds() {
        assert_eq!(Verdict::from_score(None), Verdict::NoEvidence);
        assert_eq!(Verdict::from_score(Some(0.9)), Verdict::Supported);
        assert_eq!(Verdict::from_score(Some(0.6)), Verdict::Supported);
        assert_eq!(Verdict::from_score(Some(0.45)), Verdict::PartiallySupported);
        assert_eq!(Verdict::from_score(Some(0.1)), Verdict::Unsupported);
    }

    #[tokio::test]
    async fn identical_evidence_is_supported() {
        let agent = EvaluationAgent::new(Arc::new(MockEmbeddingService::new(DIMS)));
        let out = agent
            .execute(
                json!({
                    "text": "Revenue grew twelve percent in the third quarter",
                    "evidence": [
                        "Revenue grew twelve percent in the third quarter",
                        "Clinic scheduling software adoption",
                    ],
                }),
                context(),
            )
            .await
            .unwrap();
        assert_eq!(out["verdict"], "supported");
        assert!((out["score"].as_f64().unwrap() - 1.0).abs() < 1e-4);
        assert_eq!(out["evidence"].as_array().unwrap().len(), 2);
        assert_eq!(out["evidence"][1]["source"], "provided[1]");
    }

    #[tokio::test]
    async fn no_evidence_without_search() {
        let agent = EvaluationAgent::new(Arc::new(MockEmbeddingService::new(DIMS)));
        let out = agent
            .execute(json!({"text": "anything"}), context())
            .await
            .unwrap();
        assert_eq!(out["verdict"], "no_evidence");
        assert!(out["score"].is_null());
    }

    #[tokio::test]
    async fn falls_back_to_collection() {
        let (embedder, index) = seeded_index().await;
        let agent = EvaluationAgent::new(embedder).with_search(index, 1);
        let out = agent
            .execute(
                json!({"text": "GDPR consent requirements and data retention periods"}),
                context(),
            )
            .await
            .unwrap();
        assert_eq!(out["evidence"][0]["source"], "retention-policy");
        assert_ne!(out["verdict"], "no_evidence");
    }
}
