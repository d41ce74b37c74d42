//! Google Gemini embeddings and text generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::{build_client, post_json};
use super::{ensure_count, LlmProvider};
use crate::config::{LlmConfig, ProviderSettings};
use crate::error::RagError;

/// `batchEmbedContents` accepts at most this many requests per call.
const GEMINI_MAX_BATCH: usize = 100;

/// Provider backed by the Gemini REST API (`generativelanguage.googleapis.com`).
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    embedding_model: String,
    chat_model: String,
    temperature: f32,
    batch_size: usize,
    max_retries: u32,
}

impl GeminiProvider {
    pub fn new(settings: &ProviderSettings, config: &LlmConfig) -> Result<Self, RagError> {
        let client = build_client(config).map_err(RagError::Llm)?;
        Ok(Self {
            client,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            // Recorded in collection fingerprints, so keep one spelling
            embedding_model: model_path(&settings.embedding_model),
            chat_model: settings.llm_model.clone(),
            temperature: config.temperature,
            batch_size: config.embedding_batch_size.clamp(1, GEMINI_MAX_BATCH),
            max_retries: config.max_retries,
        })
    }

    async fn post(
        &self,
        model: &str,
        action: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        let url = format!("{}/{}:{}", self.base_url, model_path(model), action);
        post_json(
            &self.client,
            &url,
            &[("x-goog-api-key", self.api_key.as_str())],
            body,
            self.max_retries,
            "Gemini",
        )
        .await
    }

    fn embed_request(&self, text: &str, task_type: &'static str) -> EmbedContentRequest {
        EmbedContentRequest {
            model: model_path(&self.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
            task_type,
        }
    }
}

/// Models are addressed as `models/<name>`; accept either form in config.
fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn parse_generate_response(json: serde_json::Value) -> Result<String, RagError> {
    let response: GenerateResponse = serde_json::from_value(json)
        .map_err(|e| RagError::Llm(format!("Invalid Gemini response: {}", e)))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(RagError::Llm("Gemini returned no content".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
            let requests: Vec<EmbedContentRequest> = batch
                .iter()
                .map(|text| self.embed_request(text, "RETRIEVAL_DOCUMENT"))
                .collect();
            let body = serde_json::json!({ "requests": requests });
            let json = self
                .post(&self.embedding_model, "batchEmbedContents", &body)
                .await
                .map_err(RagError::Embedding)?;
            let response: BatchEmbedResponse = serde_json::from_value(json)
                .map_err(|e| RagError::Embedding(format!("Invalid Gemini response: {}", e)))?;
            let embedded = response.embeddings.into_iter().map(|e| e.values).collect();
            vectors.extend(ensure_count(embedded, batch.len())?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let body = serde_json::to_value(self.embed_request(text, "RETRIEVAL_QUERY"))
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        let json = self
            .post(&self.embedding_model, "embedContent", &body)
            .await
            .map_err(RagError::Embedding)?;
        let response: EmbedResponse = serde_json::from_value(json)
            .map_err(|e| RagError::Embedding(format!("Invalid Gemini response: {}", e)))?;
        Ok(response.embedding.values)
    }

    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        let json = self
            .post(&self.chat_model, "generateContent", &body)
            .await
            .map_err(RagError::Llm)?;
        parse_generate_response(json)
    }
}
