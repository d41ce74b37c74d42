//! Core data models used throughout the pipeline.
//!
//! These types represent the pages, chunks, and search results that flow
//! from the PDF loader through the vector store to the prompt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Chunk and page metadata: string keys to scalar JSON values.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Text of a single PDF page as produced by the loader.
#[derive(Debug, Clone)]
pub struct PageDocument {
    pub text: String,
    pub metadata: Metadata,
}

/// A chunk of page text, ready to be embedded and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `doc-<index>` in split order.
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity; higher is closer.
    pub score: f64,
}

/// Sequential chunk id for position `index`.
pub fn chunk_id(index: usize) -> String {
    format!("doc-{}", index)
}

/// Keep only entries whose value is neither null nor an empty string.
pub fn drop_empty_metadata(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(_, v)| !is_empty_value(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}
