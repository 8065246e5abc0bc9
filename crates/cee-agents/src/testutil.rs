use std::sync::Arc;

use cee_core::{JobId, Mode};
use cee_embeddings::{EmbeddingService, InMemoryVectorIndex, MockEmbeddingService};
use cee_runtime::JobContext;
use serde_json::json;
use tokio_util::sync::CancellationToken;

pub(crate) const DIMS: usize = 256;

pub(crate) fn context() -> JobContext {
    context_with(CancellationToken::new())
}

pub(crate) fn context_with(token: CancellationToken) -> JobContext {
    JobContext::new(JobId::generate(), Mode::StrategicMarket, "tester", 1, token)
}

pub(crate) const DOCS: &[(&str, &str, &str)] = &[
    (
        "smb-payments",
        "SMB payments landscape",
        "Fintech startups targeting SMBs: launch costs, TAM estimates and revenue from payments fees",
    ),
    (
        "clinic-scheduling",
        "Clinic scheduling",
        "Hospital and clinic scheduling software adoption among healthcare providers",
    ),
    (
        "retention-policy",
        "Retention policy",
        "Data retention periods and GDPR consent requirements for personal data",
    ),
];

pub(crate) async fn seeded_index() -> (Arc<MockEmbeddingService>, Arc<InMemoryVectorIndex>) {
    let embedder = Arc::new(MockEmbeddingService::new(DIMS));
    let index = Arc::new(InMemoryVectorIndex::new(DIMS));
    for (id, title, text) in DOCS {
        let vector = embedder.embed_single(text).await.unwrap();
        index
            .upsert(*id, vector, json!({"title": title, "text": text}))
            .unwrap();
    }
    (embedder, index)
}
