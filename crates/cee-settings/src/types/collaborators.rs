//! External collaborator endpoints.

use serde::{Deserialize, Serialize};

/// Output size of the default sentence embedding model.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Vector search and embedding settings. Consumed by agents, never by the core.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollaboratorSettings {
    /// Base URL of the Qdrant vector-search service.
    pub qdrant_url: String,
    /// Collection searched by agents.
    pub qdrant_collection: String,
    /// Optional Qdrant API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_api_key: Option<String>,
    /// Embedding vector size.
    pub embedding_dimensions: usize,
    /// Documents retrieved per similarity search.
    pub search_top_k: usize,
    /// HTTP timeout for collaborator calls, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for CollaboratorSettings {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6333".to_string(),
            qdrant_collection: "enterprise_docs".to_string(),
            qdrant_api_key: None,
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            search_top_k: 5,
            request_timeout_ms: 10_000,
        }
    }
}
