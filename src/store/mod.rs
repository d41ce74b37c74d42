//! Vector store abstraction.
//!
//! The [`VectorStore`] trait covers the operations the pipelines need: make
//! sure a collection exists, append chunks with their vectors, and run a
//! nearest-neighbour search. Two backends:
//!
//! - [`PgVectorStore`]: Postgres with the `pgvector` extension.
//! - [`InMemoryStore`]: brute-force cosine search, for tests.
//!
//! Each collection records an [`EmbeddingFingerprint`] (provider, embedding
//! model, dimensions). Writing or querying with a different provider is
//! rejected.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RagError;
use crate::models::{Chunk, ScoredChunk};

pub use memory::InMemoryStore;
pub use pg::PgVectorStore;

/// Which embedding space a collection's vectors live in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingFingerprint {
    pub provider: String,
    pub embedding_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

impl EmbeddingFingerprint {
    /// Same provider and model; dimensions only compared when both sides
    /// know them.
    pub fn is_compatible(&self, other: &EmbeddingFingerprint) -> bool {
        self.provider == other.provider
            && self.embedding_model == other.embedding_model
            && match (self.dimensions, other.dimensions) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }

    pub fn describe(&self) -> String {
        match self.dimensions {
            Some(d) => format!("{}/{} ({} dims)", self.provider, self.embedding_model, d),
            None => format!("{}/{}", self.provider, self.embedding_model),
        }
    }
}

/// A collection as seen by [`VectorStore::collection`].
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    /// `None` for collections created by other tools.
    pub fingerprint: Option<EmbeddingFingerprint>,
    pub rows: u64,
}

/// Fail with [`RagError::ProviderMismatch`] unless `current` may read or
/// write vectors described by `stored`.
pub fn check_fingerprint(
    stored: Option<&EmbeddingFingerprint>,
    current: &EmbeddingFingerprint,
) -> Result<(), RagError> {
    match stored {
        Some(stored) if !stored.is_compatible(current) => Err(RagError::ProviderMismatch {
            expected: stored.describe(),
            found: current.describe(),
        }),
        Some(_) => Ok(()),
        None => {
            tracing::warn!(
                "collection has no embedding fingerprint; assuming {}",
                current.describe()
            );
            Ok(())
        }
    }
}

/// Abstract vector store for the ingestion and retrieval pipelines.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`collection`](VectorStore::collection) | Describe the collection, if it exists |
/// | [`ensure_collection`](VectorStore::ensure_collection) | Create or validate the collection |
/// | [`add_chunks`](VectorStore::add_chunks) | Append chunks and vectors in one batch |
/// | [`similarity_search_with_score`](VectorStore::similarity_search_with_score) | Top-k cosine search |
/// | [`count_with_metadata`](VectorStore::count_with_metadata) | Count rows whose metadata has `key = value` |
/// | [`replace_chunks`](VectorStore::replace_chunks) | Swap the collection's rows and fingerprint in one batch |
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn collection_name(&self) -> &str;

    async fn collection(&self) -> Result<Option<CollectionInfo>, RagError>;

    /// Create the collection if absent, recording `fingerprint`; otherwise
    /// check it against the stored one.
    async fn ensure_collection(&self, fingerprint: &EmbeddingFingerprint) -> Result<(), RagError>;

    /// Append rows. Existing rows with the same ids are kept; re-ingesting
    /// a document duplicates its chunks. Returns the number of rows written.
    async fn add_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<usize, RagError>;

    /// Up to `k` chunks ordered by decreasing cosine similarity.
    async fn similarity_search_with_score(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RagError>;

    async fn count_with_metadata(&self, key: &str, value: &str) -> Result<u64, RagError>;

    /// Delete every row, record `fingerprint` and write the new rows as one
    /// unit. The stored fingerprint is overwritten, not checked, so this is
    /// how a collection moves to another provider. On error the collection
    /// is left as it was.
    ///
    /// Returns the number of rows deleted.
    async fn replace_chunks(
        &self,
        fingerprint: &EmbeddingFingerprint,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<u64, RagError>;
}

pub(crate) fn ensure_same_len(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<(), RagError> {
    if chunks.len() != vectors.len() {
        return Err(RagError::Store(format!(
            "{} chunks but {} vectors",
            chunks.len(),
            vectors.len()
        )));
    }
    Ok(())
}
