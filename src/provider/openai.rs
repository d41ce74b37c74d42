//! OpenAI embeddings and chat completions.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{build_client, post_json};
use super::{ensure_count, LlmProvider};
use crate::config::{LlmConfig, ProviderSettings};
use crate::error::RagError;

/// Provider backed by the OpenAI REST API.
///
/// Requires `OPENAI_API_KEY`, `OPENAI_EMBEDDING_MODEL` and
/// `OPENAI_LLM_MODEL`, resolved beforehand into [`ProviderSettings`].
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    embedding_model: String,
    chat_model: String,
    temperature: f32,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(settings: &ProviderSettings, config: &LlmConfig) -> Result<Self, RagError> {
        let client = build_client(config).map_err(RagError::Llm)?;
        Ok(Self {
            client,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            embedding_model: settings.embedding_model.clone(),
            chat_model: settings.llm_model.clone(),
            temperature: config.temperature,
            batch_size: config.embedding_batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value, String> {
        let url = format!("{}/{}", self.base_url, path);
        let auth = format!("Bearer {}", self.api_key);
        post_json(
            &self.client,
            &url,
            &[("Authorization", auth.as_str())],
            body,
            self.max_retries,
            "OpenAI",
        )
        .await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": texts,
        });
        let json = self.post("embeddings", &body).await.map_err(RagError::Embedding)?;
        parse_embeddings_response(json)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Extract `data[].embedding`, ordered by `index`.
fn parse_embeddings_response(json: serde_json::Value) -> Result<Vec<Vec<f32>>, RagError> {
    let mut response: EmbeddingsResponse = serde_json::from_value(json)
        .map_err(|e| RagError::Embedding(format!("Invalid OpenAI response: {}", e)))?;
    response.data.sort_by_key(|item| item.index);
    Ok(response.data.into_iter().map(|item| item.embedding).collect())
}

fn parse_chat_response(json: serde_json::Value) -> Result<String, RagError> {
    let response: ChatResponse = serde_json::from_value(json)
        .map_err(|e| RagError::Llm(format!("Invalid OpenAI response: {}", e)))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| RagError::Llm("OpenAI returned no content".to_string()))
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn chat_model(&self) -> &str {
        &self.chat_model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            tracing::debug!(batch = batch.len(), model = %self.embedding_model, "embedding batch");
            let embedded = self.embed_batch(batch).await?;
            vectors.extend(ensure_count(embedded, batch.len())?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = ensure_count(self.embed_batch(&[text.to_string()]).await?, 1)?;
        Ok(vectors.remove(0))
    }

    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });
        let json = self.post("chat/completions", &body).await.map_err(RagError::Llm)?;
        parse_chat_response(json)
    }
}
