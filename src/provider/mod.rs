//! Hosted model providers: embeddings and chat completion behind one trait.
//!
//! Implementations:
//! - **[`OpenAIProvider`]**: `POST /v1/embeddings` and `POST /v1/chat/completions`.
//! - **[`GeminiProvider`]**: `batchEmbedContents`, `embedContent` and `generateContent`.
//! - **[`MockProvider`]**: deterministic, offline; used by tests.
//!
//! Ingestion and retrieval must use the same provider and embedding model;
//! the vector store records which one populated a collection and
//! [`fingerprint`] is what gets compared.
//!
//! # Retry Strategy
//!
//! Both hosted providers share [`http::post_json`]:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

mod gemini;
mod http;
pub mod mock;
mod openai;

use async_trait::async_trait;

use crate::config::{LlmConfig, ProviderKind, ProviderSettings};
use crate::error::RagError;
use crate::store::EmbeddingFingerprint;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use openai::OpenAIProvider;

/// An embedding model and a chat model from the same vendor.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name recorded in collection metadata (`"openai"`).
    fn name(&self) -> &str;
    /// Embedding model identifier (e.g. `"text-embedding-3-small"`).
    fn embedding_model(&self) -> &str;
    /// Chat model identifier (e.g. `"gpt-4o-mini"`).
    fn chat_model(&self) -> &str;

    /// Embed chunk texts. Output order matches input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Send `prompt` as a single user message and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String, RagError>;
}

/// Build the hosted provider for `settings`.
pub fn create_provider(
    settings: &ProviderSettings,
    config: &LlmConfig,
) -> Result<Box<dyn LlmProvider>, RagError> {
    match settings.kind {
        ProviderKind::OpenAI => Ok(Box::new(OpenAIProvider::new(settings, config)?)),
        ProviderKind::Gemini => Ok(Box::new(GeminiProvider::new(settings, config)?)),
    }
}

/// What a collection built with `provider` should record.
pub fn fingerprint(provider: &dyn LlmProvider, dimensions: Option<usize>) -> EmbeddingFingerprint {
    EmbeddingFingerprint {
        provider: provider.name().to_string(),
        embedding_model: provider.embedding_model().to_string(),
        dimensions,
    }
}

/// Check that a provider returned one vector per input.
pub(crate) fn ensure_count(
    vectors: Vec<Vec<f32>>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, RagError> {
    if vectors.len() != expected {
        return Err(RagError::Embedding(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    Ok(vectors)
}
