//! Embedding and vector-search error types.
//!
//! Agents treat every variant as a collaborator failure; none of them is
//! fatal to the process.

use thiserror::Error;

/// Errors from embedding and search operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Inference failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Vector length differs from the configured dimensions.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimensions.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },

    /// Transport failure talking to a remote collaborator.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote collaborator answered with a non-success status.
    #[error("search backend returned {status}: {body}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Service not ready.
    #[error("Embedding service not ready")]
    NotReady,
}

impl EmbeddingError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Backend { status, .. } => *status == 429 || *status >= 500,
            Self::NotReady => true,
            Self::Inference(_) | Self::DimensionMismatch { .. } | Self::Config(_) => false,
        }
    }
}

/// Result alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_variants() {
        let cases = vec![
            (
                EmbeddingError::Inference("timeout".into()),
                "Inference failed: timeout",
            ),
            (
                EmbeddingError::DimensionMismatch {
                    expected: 384,
                    actual: 3,
                },
                "dimension mismatch: expected 384, got 3",
            ),
            (
                EmbeddingError::Backend {
                    status: 503,
                    body: "down".into(),
                },
                "search backend returned 503: down",
            ),
            (EmbeddingError::NotReady, "Embedding service not ready"),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn transient_classification() {
        assert!(EmbeddingError::NotReady.is_transient());
        assert!(
            EmbeddingError::Backend {
                status: 502,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !EmbeddingError::Backend {
                status: 404,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!EmbeddingError::Config("bad url".into()).is_transient());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EmbeddingError>();
    }
}
