//! Retrieval pipeline: question → top-k chunks → grounded prompt → answer.

use crate::config::{Config, Environment, ProviderKind};
use crate::error::RagError;
use crate::models::ScoredChunk;
use crate::provider::{create_provider, fingerprint, LlmProvider};
use crate::store::{check_fingerprint, PgVectorStore, VectorStore};

/// Prompt sent to the chat model. `{contexto}` and `{pergunta}` are
/// substituted by [`render_prompt`].
pub const PROMPT_TEMPLATE: &str = r#"
CONTEXTO:
{contexto}

REGRAS:
- Responda somente com base no CONTEXTO.
- Se a informação não estiver explicitamente no CONTEXTO, responda:
  "Não tenho informações necessárias para responder sua pergunta."
- Nunca invente ou use conhecimento externo.
- Nunca produza opiniões ou interpretações além do que está escrito.
- Ao final da resposta informe o modelo LLM que foi utilizado para responder a pergunta.

EXEMPLOS DE PERGUNTAS FORA DO CONTEXTO:
Pergunta: "Qual é a capital da França?"
Resposta: "Não tenho informações necessárias para responder sua pergunta."

Pergunta: "Quantos clientes temos em 2024?"
Resposta: "Não tenho informações necessárias para responder sua pergunta."

Pergunta: "Você acha isso bom ou ruim?"
Resposta: "Não tenho informações necessárias para responder sua pergunta."

PERGUNTA DO USUÁRIO:
{pergunta}

RESPONDA A "PERGUNTA DO USUÁRIO"
"#;

/// The sentence the model is told to answer with when the context does not
/// contain the answer.
pub const REFUSAL: &str = "Não tenho informações necessárias para responder sua pergunta.";

/// A model answer plus the chunks it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

/// Validate inputs and environment, then answer `question` from the
/// configured Postgres collection.
pub async fn run_answer<F>(
    question: &str,
    model_choice: &str,
    config: &Config,
    lookup: F,
) -> Result<Answer, RagError>
where
    F: Fn(&str) -> Option<String>,
{
    if question.trim().is_empty() {
        return Err(RagError::EmptyQuestion);
    }
    let kind = ProviderKind::parse(model_choice)?;
    let env = Environment::resolve(kind, &lookup)?;

    let provider = create_provider(&env.provider, &config.llm)?;
    let store = PgVectorStore::connect(&env.store).await?;

    answer(question, config.retrieval.top_k, provider.as_ref(), &store).await
}

/// Retrieve the `top_k` nearest chunks and ask the chat model.
pub async fn answer(
    question: &str,
    top_k: usize,
    provider: &dyn LlmProvider,
    store: &dyn VectorStore,
) -> Result<Answer, RagError> {
    if question.trim().is_empty() {
        return Err(RagError::EmptyQuestion);
    }

    let Some(collection) = store.collection().await? else {
        tracing::warn!(collection = store.collection_name(), "collection does not exist");
        return Err(RagError::NoResults);
    };
    let stored = collection.fingerprint.as_ref();
    check_fingerprint(stored, &fingerprint(provider, None))?;

    let query = provider.embed_query(question).await?;
    if let Some(stored) = stored {
        check_fingerprint(Some(stored), &fingerprint(provider, Some(query.len())))?;
    }

    let results = store.similarity_search_with_score(&query, top_k).await?;
    if results.is_empty() {
        return Err(RagError::NoResults);
    }
    for (rank, result) in results.iter().enumerate() {
        tracing::debug!(rank, id = %result.chunk.id, score = result.score, "retrieved chunk");
    }

    let context = build_context(&results);
    if context.is_empty() {
        return Err(RagError::EmptyContext);
    }

    let prompt = render_prompt(&context, question);
    tracing::info!(
        chunks = results.len(),
        model = provider.chat_model(),
        "sending prompt"
    );
    let text = provider.complete(&prompt).await?;

    Ok(Answer {
        text,
        sources: results,
    })
}

/// Chunk texts in ranked order, separated by a blank line.
pub fn build_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fill [`PROMPT_TEMPLATE`] in a single pass. Braces inside `context` or
/// `question` are copied as-is.
pub fn render_prompt(context: &str, question: &str) -> String {
    let mut out = String::with_capacity(PROMPT_TEMPLATE.len() + context.len() + question.len());
    let mut rest = PROMPT_TEMPLATE;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{contexto}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{pergunta}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Metadata};
    use crate::provider::MockProvider;
    use crate::store::{EmbeddingFingerprint, InMemoryStore};

    fn scored(id: &str, text: &str, score: f64) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                text: text.to_string(),
                metadata: Metadata::new(),
            },
            score,
        }
    }

    async fn seeded_store(provider: &MockProvider, texts: &[&str]) -> InMemoryStore {
        let store = InMemoryStore::new("docs");
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                id: format!("doc-{}", i),
                text: t.to_string(),
                metadata: Metadata::new(),
            })
            .collect();
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let vectors = provider.embed_documents(&owned).await.unwrap();
        store
            .ensure_collection(&fingerprint(provider, Some(vectors[0].len())))
            .await
            .unwrap();
        store.add_chunks(&chunks, &vectors).await.unwrap();
        store
    }

    #[test]
    fn test_template_shape() {
        assert!(PROMPT_TEMPLATE.starts_with("\nCONTEXTO:\n{contexto}\n\nREGRAS:\n"));
        assert!(PROMPT_TEMPLATE.ends_with("{pergunta}\n\nRESPONDA A \"PERGUNTA DO USUÁRIO\"\n"));
        assert!(PROMPT_TEMPLATE.contains(
            "responda:\n  \"Não tenho informações necessárias para responder sua pergunta.\"\n"
        ));
        assert_eq!(PROMPT_TEMPLATE.matches(REFUSAL).count(), 4);
    }

    #[test]
    fn test_render_prompt_single_pass() {
        let prompt = render_prompt("saldo {pergunta}", "Qual o {contexto}?");
        assert!(prompt.starts_with("\nCONTEXTO:\nsaldo {pergunta}\n\nREGRAS:"));
        assert!(prompt.contains("PERGUNTA DO USUÁRIO:\nQual o {contexto}?\n\nRESPONDA"));
        assert!(!prompt.contains("{contexto}\n\nREGRAS"));
    }

    #[test]
    fn test_build_context_order() {
        let results = vec![scored("doc-1", "second", 0.9), scored("doc-0", "first", 0.5)];
        assert_eq!(build_context(&results), "second\n\nfirst");
        assert_eq!(build_context(&[]), "");
    }

    #[tokio::test]
    async fn test_answer_contains_retrieved_text() {
        let provider = MockProvider::new();
        let store = seeded_store(&provider, &["Invoice total: $42.00."]).await;

        let answer = answer("What is the invoice total?", 10, &provider, &store)
            .await
            .unwrap();
        assert!(answer.text.contains("$42.00"));
        assert!(answer.text.contains("What is the invoice total?"));
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].chunk.id, "doc-0");
    }

    #[tokio::test]
    async fn test_unrelated_question_still_retrieves_and_refuses() {
        let provider = MockProvider::with_responder(|prompt| {
            let context_has_capital = prompt
                .split("REGRAS:")
                .next()
                .map(|c| c.to_lowercase().contains("capital"))
                .unwrap_or(false);
            if context_has_capital {
                Ok("Paris".to_string())
            } else {
                Ok(format!("{} (mock-chat)", REFUSAL))
            }
        });
        let store = seeded_store(&provider, &["Invoice total: $42.00.", "Due in 30 days."]).await;

        let answer = answer("Qual é a capital da França?", 10, &provider, &store)
            .await
            .unwrap();
        assert_eq!(answer.sources.len(), 2);
        assert!(answer.text.contains(REFUSAL));
        assert!(answer.text.contains("mock-chat"));
    }

    #[tokio::test]
    async fn test_top_k_limits_sources() {
        let provider = MockProvider::new();
        let texts: Vec<String> = (0..15).map(|i| format!("line number {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let store = seeded_store(&provider, &refs).await;

        let answer = answer("line", 10, &provider, &store).await.unwrap();
        assert_eq!(answer.sources.len(), 10);
        for pair in answer.sources.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_missing_or_empty_collection() {
        let provider = MockProvider::new();
        let store = InMemoryStore::new("docs");
        let err = answer("anything", 10, &provider, &store).await.unwrap_err();
        assert!(matches!(err, RagError::NoResults));
        assert_eq!(provider.embed_calls(), 0);

        store
            .ensure_collection(&fingerprint(&provider, None))
            .await
            .unwrap();
        let err = answer("anything", 10, &provider, &store).await.unwrap_err();
        assert!(matches!(err, RagError::NoResults));
        assert_eq!(provider.complete_calls(), 0);
    }

    #[tokio::test]
    async fn test_other_provider_is_rejected_before_embedding() {
        let store = InMemoryStore::new("docs");
        store
            .ensure_collection(&EmbeddingFingerprint {
                provider: "gemini".into(),
                embedding_model: "models/text-embedding-004".into(),
                dimensions: Some(768),
            })
            .await
            .unwrap();

        let provider = MockProvider::new();
        let err = answer("anything", 10, &provider, &store).await.unwrap_err();
        assert!(matches!(err, RagError::ProviderMismatch { .. }));
        assert_eq!(provider.embed_calls(), 0);
    }

    #[tokio::test]
    async fn test_dimension_change_is_rejected() {
        let provider = MockProvider::new();
        let store = seeded_store(&provider, &["alpha"]).await;
        let resized = MockProvider::new().with_dimensions(32);
        let err = answer("alpha", 10, &resized, &store).await.unwrap_err();
        assert!(matches!(err, RagError::ProviderMismatch { .. }));
    }

    #[tokio::test]
    async fn test_blank_question() {
        let provider = MockProvider::new();
        let store = InMemoryStore::new("docs");
        let err = answer("   ", 10, &provider, &store).await.unwrap_err();
        assert!(matches!(err, RagError::EmptyQuestion));

        let err = run_answer("", "openai", &Config::default(), |_| None)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyQuestion));
    }

    #[tokio::test]
    async fn test_run_answer_validation_order() {
        let err = run_answer("q", "llama", &Config::default(), |_| None)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidModel(_)));

        let err = run_answer("q", " Gemini ", &Config::default(), |_| None)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::MissingConfig(k) if k == "GOOGLE_API_KEY"));
    }
}
