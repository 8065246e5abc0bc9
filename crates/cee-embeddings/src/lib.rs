//! # cee-embeddings
//!
//! Collaborators the reference agents use to ground their answers:
//!
//! - [`EmbeddingService`]: text to fixed-dimension vectors
//!   ([`MockEmbeddingService`] hashes text deterministically)
//! - [`VectorSearch`]: nearest-neighbor lookup over a document collection,
//!   either [`InMemoryVectorIndex`] or a remote [`QdrantClient`]
//!
//! The orchestration core never depends on this crate.

#![deny(unsafe_code)]

pub mod errors;
pub mod normalize;
pub mod qdrant;
pub mod search;
pub mod service;

pub use errors::{EmbeddingError, Result};
pub use qdrant::{QdrantClient, QdrantConfig};
pub use search::{InMemoryVectorIndex, ScoredDocument, VectorSearch};
pub use service::{EmbeddingService, MockEmbeddingService};
