//! Qdrant REST client implementing [`VectorSearch`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::{EmbeddingError, Result};
use crate::search::{ScoredDocument, VectorSearch};

/// Longest error body kept from a failed response.
const MAX_ERROR_BODY: usize = 512;

/// Connection parameters for a Qdrant collection.
#[derive(Clone, Debug)]
pub struct QdrantConfig {
    /// Base URL, e.g. `http://localhost:6333`.
    pub url: String,
    /// Collection to search.
    pub collection: String,
    /// Optional API key sent as the `api-key` header.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".into(),
            collection: "enterprise_docs".into(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for `POST /collections/{name}/points/search`.
pub struct QdrantClient {
    config: QdrantConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}

impl QdrantClient {
    /// Build a client with its own connection pool.
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| EmbeddingError::Config("qdrant api key is not a valid header".into()))?;
            let _ = headers.insert("api-key", value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_client(config: QdrantConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn search_url(&self) -> String {
        format!(
            "{}/collections/{}/points/search",
            self.config.url.trim_end_matches('/'),
            self.config.collection
        )
    }
}

fn id_to_string(id: Value) -> String {
    match id {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl VectorSearch for QdrantClient {
    #[instrument(skip(self, vector), fields(collection = %self.config.collection))]
    async fn similarity_search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let body = serde_json::json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        });

        let response = self.client.post(self.search_url()).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                text.truncate(end);
            }
            return Err(EmbeddingError::Backend { status, body: text });
        }

        let data: SearchResponse = response.json().await?;
        debug!(hits = data.result.len(), "qdrant search complete");
        Ok(data
            .result
            .into_iter()
            .map(|hit| ScoredDocument {
                id: id_to_string(hit.id),
                score: hit.score,
                payload: hit.payload.unwrap_or(Value::Null),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: String) -> QdrantConfig {
        QdrantConfig {
            url,
            collection: "docs".into(),
            api_key: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/docs/points/search"))
            .and(body_partial_json(serde_json::json!({"limit": 2, "with_payload": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [
                    {"id": 7, "score": 0.91, "payload": {"title": "SMB payments"}},
                    {"id": "a1b2", "score": 0.55}
                ],
                "status": "ok",
                "time": 0.001
            })))
            .mount(&server)
            .await;

        let client = QdrantClient::new(config(server.uri())).unwrap();
        let hits = client.similarity_search(&[0.1, 0.2], 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "7");
        assert!((hits[0].score - 0.91).abs() < 1e-6);
        assert_eq!(hits[0].payload["title"], "SMB payments");
        assert_eq!(hits[1].id, "a1b2");
        assert_eq!(hits[1].payload, Value::Null);
    }

    #[tokio::test]
    async fn api_key_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("api-key", "k-123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(server.uri());
        cfg.api_key = Some("k-123".into());
        let client = QdrantClient::new(cfg).unwrap();
        assert!(client.similarity_search(&[1.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_error_maps_to_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = QdrantClient::new(config(server.uri())).unwrap();
        let err = client.similarity_search(&[1.0], 1).await.unwrap_err();
        assert!(err.is_transient());
        assert_matches!(err, EmbeddingError::Backend { status: 503, body } if body == "overloaded");
    }

    #[test]
    fn search_url_trims_trailing_slash() {
        let client = QdrantClient::with_client(
            config("http://q:6333/".into()),
            reqwest::Client::new(),
        );
        assert_eq!(client.search_url(), "http://q:6333/collections/docs/points/search");
    }
}
