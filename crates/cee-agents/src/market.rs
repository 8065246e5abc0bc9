//! Market analyst: retrieves supporting documents and extracts market signals.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use cee_embeddings::{EmbeddingService, ScoredDocument, VectorSearch};
use cee_runtime::{AgentError, AgentHandler, JobContext};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::collaborator_error;
use crate::params::required_str;

const SNIPPET_BYTES: usize = 280;

const SEGMENTS: &[(&str, &[&str])] = &[
    ("smb", &["smb", "smbs", "small", "smes", "sme"]),
    ("enterprise", &["enterprise", "enterprises", "corporate", "b2b"]),
    ("consumer", &["consumer", "consumers", "b2c", "retail"]),
    ("public_sector", &["government", "public", "municipal"]),
];

const SECTORS: &[(&str, &[&str])] = &[
    ("fintech", &["fintech", "payments", "banking", "lending", "payment"]),
    ("healthtech", &["health", "healthcare", "medical", "clinic"]),
    ("saas", &["saas", "software", "platform", "subscription"]),
    ("ecommerce", &["ecommerce", "marketplace", "shop", "store"]),
    ("ai", &["ai", "ml", "llm", "machine"]),
];

const REQUESTS: &[(&str, &[&str])] = &[
    ("market_size", &["tam", "sam", "som", "size", "sizing"]),
    ("revenue_model", &["revenue", "pricing", "monetization", "monetize"]),
    ("costs", &["cost", "costs", "budget", "capex", "opex"]),
    ("competition", &["competitor", "competitors", "competition", "rivals"]),
    ("go_to_market", &["gtm", "launch", "channel", "channels", "distribution"]),
];

/// Embeds the query, searches the document collection, and reports evidence
/// plus keyword-derived signals.
pub struct MarketAnalyst {
    embedder: Arc<dyn EmbeddingService>,
    search: Arc<dyn VectorSearch>,
    top_k: usize,
}

impl MarketAnalyst {
    /// Create an analyst retrieving up to `top_k` documents.
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        search: Arc<dyn VectorSearch>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            search,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl AgentHandler for MarketAnalyst {
    #[instrument(skip_all, fields(job_id = %ctx.job_id))]
    async fn execute(&self, payload: Value, ctx: JobContext) -> Result<Value, AgentError> {
        let text = required_str(&payload, "text")?;

        let vector = self
            .embedder
            .embed_single(text)
            .await
            .map_err(collaborator_error)?;
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let documents = self
            .search
            .similarity_search(&vector, self.top_k)
            .await
            .map_err(collaborator_error)?;
        debug!(hits = documents.len(), "market evidence retrieved");

        let tokens = tokenize(text);
        let signals = json!({
            "segments": matches(&tokens, SEGMENTS),
            "sectors": matches(&tokens, SECTORS),
            "requested": matches(&tokens, REQUESTS),
        });
        let confidence = confidence(&documents);

        Ok(json!({
            "query": text,
            "evidence": documents.iter().map(evidence_entry).collect::<Vec<_>>(),
            "signals": signals,
            "confidence": confidence,
            "summary": summary(&documents, confidence),
        }))
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn matches(tokens: &BTreeSet<String>, table: &[(&'static str, &[&str])]) -> Vec<&'static str> {
    table
        .iter()
        .filter(|(_, words)| words.iter().any(|w| tokens.contains(*w)))
        .map(|(label, _)| *label)
        .collect()
}

fn confidence(documents: &[ScoredDocument]) -> f64 {
    if documents.is_empty() {
        return 0.0;
    }
    let total: f64 = documents.iter().map(|d| f64::from(d.score.clamp(0.0, 1.0))).sum();
    ((total / documents.len() as f64) * 1000.0).round() / 1000.0
}

fn evidence_entry(doc: &ScoredDocument) -> Value {
    let field = |name: &str| doc.payload.get(name).and_then(Value::as_str);
    let snippet = field("text")
        .or_else(|| field("content"))
        .map(|t| cee_core::text::summarize(t, SNIPPET_BYTES));
    json!({
        "id": doc.id,
        "score": doc.score,
        "title": field("title"),
        "snippet": snippet,
    })
}

fn summary(documents: &[ScoredDocument], confidence: f64) -> String {
    match documents.first() {
        None => "No supporting documents found; signals are keyword-derived only.".to_string(),
        Some(top) => format!(
            "{} supporting document(s), best match `{}` (mean relevance {confidence:.2}).",
            documents.len(),
            top.id
        ),
    }
}
