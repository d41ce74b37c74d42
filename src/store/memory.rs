//! In-memory [`VectorStore`] implementation for tests.
//!
//! Rows live in a `Vec` behind `std::sync::RwLock`. Search is brute-force
//! cosine similarity over every stored vector.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::RagError;
use crate::models::{Chunk, ScoredChunk};

use super::{
    check_fingerprint, ensure_same_len, CollectionInfo, EmbeddingFingerprint, VectorStore,
};

struct StoredRow {
    chunk: Chunk,
    vector: Vec<f32>,
}

struct Collection {
    fingerprint: Option<EmbeddingFingerprint>,
    rows: Vec<StoredRow>,
}

/// In-memory store holding a single collection.
pub struct InMemoryStore {
    name: String,
    collection: RwLock<Option<Collection>>,
}

impl InMemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            collection: RwLock::new(None),
        }
    }

    /// Ids of every stored row, in insertion order.
    pub fn ids(&self) -> Vec<String> {
        let guard = self.read();
        guard
            .as_ref()
            .map(|c| c.rows.iter().map(|r| r.chunk.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Every stored chunk, in insertion order.
    pub fn chunks(&self) -> Vec<Chunk> {
        let guard = self.read();
        guard
            .as_ref()
            .map(|c| c.rows.iter().map(|r| r.chunk.clone()).collect())
            .unwrap_or_default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Collection>> {
        self.collection.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Collection>> {
        self.collection.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cosine similarity in `f64`; zero for empty, zero-length or mismatched
/// vectors.
fn cosine_sim(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |acc, (&x, &y)| {
        let (x, y) = (f64::from(x), f64::from(y));
        (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
    });
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

fn rows_of(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Vec<StoredRow> {
    chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| StoredRow {
            chunk: chunk.clone(),
            vector: vector.clone(),
        })
        .collect()
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn collection(&self) -> Result<Option<CollectionInfo>, RagError> {
        let guard = self.read();
        Ok(guard.as_ref().map(|c| CollectionInfo {
            name: self.name.clone(),
            fingerprint: c.fingerprint.clone(),
            rows: c.rows.len() as u64,
        }))
    }

    async fn ensure_collection(&self, fingerprint: &EmbeddingFingerprint) -> Result<(), RagError> {
        let mut guard = self.write();
        match guard.as_mut() {
            Some(existing) => {
                check_fingerprint(existing.fingerprint.as_ref(), fingerprint)?;
                if existing.fingerprint.is_none() || fingerprint.dimensions.is_some() {
                    existing.fingerprint = Some(fingerprint.clone());
                }
            }
            None => {
                *guard = Some(Collection {
                    fingerprint: Some(fingerprint.clone()),
                    rows: Vec::new(),
                });
            }
        }
        Ok(())
    }

    async fn add_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<usize, RagError> {
        ensure_same_len(chunks, vectors)?;
        let mut guard = self.write();
        let collection = guard.get_or_insert_with(|| Collection {
            fingerprint: None,
            rows: Vec::new(),
        });
        collection.rows.extend(rows_of(chunks, vectors));
        Ok(chunks.len())
    }

    async fn similarity_search_with_score(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let guard = self.read();
        let Some(collection) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let mut results: Vec<ScoredChunk> = collection
            .rows
            .iter()
            .map(|row| ScoredChunk {
                chunk: row.chunk.clone(),
                score: cosine_sim(query, &row.vector),
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        Ok(results)
    }

    async fn count_with_metadata(&self, key: &str, value: &str) -> Result<u64, RagError> {
        let guard = self.read();
        Ok(guard
            .as_ref()
            .map(|c| {
                c.rows
                    .iter()
                    .filter(|r| r.chunk.metadata.get(key).and_then(|v| v.as_str()) == Some(value))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn replace_chunks(
        &self,
        fingerprint: &EmbeddingFingerprint,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<u64, RagError> {
        ensure_same_len(chunks, vectors)?;
        let mut guard = self.write();
        let previous = guard.replace(Collection {
            fingerprint: Some(fingerprint.clone()),
            rows: rows_of(chunks, vectors),
        });
        Ok(previous.map(|c| c.rows.len() as u64).unwrap_or(0))
    }
}
