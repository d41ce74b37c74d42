//! Deterministic offline provider.
//!
//! Embeddings are hashed bags of lower-cased words, so texts that share
//! words land close together under cosine similarity. Completions are
//! produced by a caller-supplied responder. Call counters let tests assert
//! that no provider work happened.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::LlmProvider;
use crate::error::RagError;

pub const MOCK_DIMENSIONS: usize = 256;

type Responder = Box<dyn Fn(&str) -> Result<String, RagError> + Send + Sync>;

pub struct MockProvider {
    embedding_model: String,
    chat_model: String,
    dimensions: usize,
    responder: Responder,
    embed_calls: AtomicUsize,
    complete_calls: AtomicUsize,
}

impl MockProvider {
    /// A provider whose completion returns the prompt unchanged.
    pub fn new() -> Self {
        Self::with_responder(|prompt| Ok(prompt.to_string()))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, RagError> + Send + Sync + 'static,
    {
        Self {
            embedding_model: "mock-embedding".to_string(),
            chat_model: "mock-chat".to_string(),
            dimensions: MOCK_DIMENSIONS,
            responder: Box::new(responder),
            embed_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = model.to_string();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions.max(1);
        self
    }

    /// Number of `embed_documents` + `embed_query` calls so far.
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in words(text) {
            let slot = (fnv1a(word.as_bytes()) % self.dimensions as u64) as usize;
            vector[slot] += 1.0;
        }
        vector
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower-cased alphanumeric words of `text`.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '$' && c != '.')
        .map(|w| w.trim_matches('.').to_lowercase())
        .filter(|w| !w.is_empty())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn chat_model(&self) -> &str {
        &self.chat_model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.embed(text))
    }

    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(prompt)
    }
}
