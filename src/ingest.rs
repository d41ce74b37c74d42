//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow for one PDF: validation → loading → chunking →
//! embedding → storage. Everything that can be checked locally (model
//! choice, environment keys, file path) is checked before the first
//! network call.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::chunk::TextSplitter;
use crate::config::{resolve_pdf_path, ChunkingConfig, Config, Environment, ProviderKind};
use crate::error::RagError;
use crate::extract;
use crate::models::{chunk_id, drop_empty_metadata, Chunk, PageDocument};
use crate::provider::{create_provider, fingerprint, LlmProvider};
use crate::store::{check_fingerprint, PgVectorStore, VectorStore};

/// Metadata key holding the SHA-256 of the source file.
pub const SOURCE_HASH_KEY: &str = "source_sha256";

/// Summary of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source: PathBuf,
    pub collection: String,
    pub pages: usize,
    pub chunks: usize,
    pub rows_written: usize,
    /// Rows removed by `--reset` before writing.
    pub rows_cleared: u64,
    pub source_sha256: String,
}

/// Validate the model choice and environment, then ingest `PDF_PATH`
/// (relative to `base_dir`) into the configured Postgres collection.
pub async fn run_ingest<F>(
    model_choice: &str,
    config: &Config,
    lookup: F,
    base_dir: &Path,
    reset: bool,
) -> Result<IngestReport, RagError>
where
    F: Fn(&str) -> Option<String>,
{
    let kind = ProviderKind::parse(model_choice)?;
    let env = Environment::resolve(kind, &lookup)?;
    let pdf_path = resolve_pdf_path(&lookup, base_dir)?;

    tracing::info!(provider = %kind, pdf = %pdf_path.display(), "starting ingestion");

    let provider = create_provider(&env.provider, &config.llm)?;
    let store = PgVectorStore::connect(&env.store).await?;

    ingest_document(&pdf_path, &config.chunking, provider.as_ref(), &store, reset).await
}

/// Load, split, embed and store one PDF.
pub async fn ingest_document(
    pdf_path: &Path,
    chunking: &ChunkingConfig,
    provider: &dyn LlmProvider,
    store: &dyn VectorStore,
    reset: bool,
) -> Result<IngestReport, RagError> {
    let path = pdf_path.to_path_buf();
    let (pages, source_sha256) = tokio::task::spawn_blocking(move || load_with_hash(&path))
        .await
        .map_err(|e| RagError::Load(e.to_string()))??;

    tracing::info!(pages = pages.len(), "loaded PDF");

    let mut report = ingest_pages(pages, &source_sha256, chunking, provider, store, reset).await?;
    report.source = pdf_path.to_path_buf();
    Ok(report)
}

fn load_with_hash(path: &Path) -> Result<(Vec<PageDocument>, String), RagError> {
    let bytes =
        std::fs::read(path).map_err(|e| RagError::Load(format!("{}: {}", path.display(), e)))?;
    let hash = format!("{:x}", Sha256::digest(&bytes));
    let pages = extract::load_pdf_bytes(&bytes, &path.display().to_string())?;
    Ok((pages, hash))
}

/// Split, embed and store pages that were already loaded.
pub async fn ingest_pages(
    mut pages: Vec<PageDocument>,
    source_sha256: &str,
    chunking: &ChunkingConfig,
    provider: &dyn LlmProvider,
    store: &dyn VectorStore,
    reset: bool,
) -> Result<IngestReport, RagError> {
    if pages.is_empty() {
        return Err(RagError::Load("PDF has no pages".to_string()));
    }
    for page in &mut pages {
        page.metadata.insert(
            SOURCE_HASH_KEY.to_string(),
            serde_json::Value::String(source_sha256.to_string()),
        );
    }

    let splitter = TextSplitter::from_config(chunking)?;
    let chunks = prepare_chunks(&pages, &splitter)?;
    tracing::info!(chunks = chunks.len(), "split pages into chunks");

    // Refuse a foreign collection before paying for embeddings. A reset
    // replaces the fingerprint, so any provider may take the collection over.
    if !reset {
        if let Some(existing) = store.collection().await? {
            check_fingerprint(existing.fingerprint.as_ref(), &fingerprint(provider, None))?;
        }
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = provider.embed_documents(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(RagError::Embedding(format!(
            "expected {} embeddings, got {}",
            chunks.len(),
            vectors.len()
        )));
    }
    let current = fingerprint(provider, vectors.first().map(|v| v.len()));

    let (rows_cleared, rows_written) = if reset {
        let cleared = store.replace_chunks(&current, &chunks, &vectors).await?;
        tracing::info!(rows = cleared, collection = store.collection_name(), "cleared collection");
        (cleared, chunks.len())
    } else {
        store.ensure_collection(&current).await?;
        let already = store.count_with_metadata(SOURCE_HASH_KEY, source_sha256).await?;
        if already > 0 {
            tracing::warn!(
                rows = already,
                collection = store.collection_name(),
                "this PDF was already ingested; its chunks will be stored again (use --reset to replace them)"
            );
        }
        (0, store.add_chunks(&chunks, &vectors).await?)
    };
    tracing::info!(rows = rows_written, collection = store.collection_name(), "stored chunks");

    Ok(IngestReport {
        source: PathBuf::new(),
        collection: store.collection_name().to_string(),
        pages: pages.len(),
        chunks: chunks.len(),
        rows_written,
        rows_cleared,
        source_sha256: source_sha256.to_string(),
    })
}

/// Split every page and number the chunks `doc-0 .. doc-(n-1)`.
///
/// Each chunk carries its page's metadata minus null and empty-string
/// values.
pub fn prepare_chunks(
    pages: &[PageDocument],
    splitter: &TextSplitter,
) -> Result<Vec<Chunk>, RagError> {
    let mut chunks = Vec::new();
    for page in pages {
        let metadata = drop_empty_metadata(&page.metadata);
        for text in splitter.split_text(&page.text) {
            chunks.push(Chunk {
                id: chunk_id(chunks.len()),
                text,
                metadata: metadata.clone(),
            });
        }
    }

    if chunks.is_empty() {
        return Err(RagError::Split);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, ScoredChunk};
    use crate::provider::MockProvider;
    use crate::store::{CollectionInfo, EmbeddingFingerprint, InMemoryStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn page(text: &str, index: usize) -> PageDocument {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), json!("document.pdf"));
        metadata.insert("page".into(), json!(index));
        metadata.insert("producer".into(), json!(""));
        metadata.insert("title".into(), serde_json::Value::Null);
        metadata.insert("total_pages".into(), json!(2));
        PageDocument {
            text: text.to_string(),
            metadata,
        }
    }

    fn splitter() -> TextSplitter {
        TextSplitter::new(1000, 150).unwrap()
    }

    fn openai_env(dir: &Path) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = ProviderKind::OpenAI
            .required_keys()
            .iter()
            .map(|k| (k.to_string(), "x".to_string()))
            .collect();
        env.insert("PDF_PATH".into(), "document.pdf".into());
        std::fs::write(dir.join("document.pdf"), b"%PDF-1.4").unwrap();
        env
    }

    #[test]
    fn test_ids_are_sequential_across_pages() {
        let long = "word ".repeat(400);
        let chunks = prepare_chunks(&[page(&long, 0), page("short page", 1)], &splitter()).unwrap();
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let expected: Vec<String> = (0..chunks.len()).map(chunk_id).collect();
        assert_eq!(ids, expected);
        assert!(chunks.len() >= 3);
        assert_eq!(chunks.last().unwrap().text, "short page");
    }

    #[test]
    fn test_empty_metadata_is_dropped() {
        let chunks = prepare_chunks(&[page("Invoice total: $42.00.", 0)], &splitter()).unwrap();
        assert_eq!(chunks.len(), 1);
        let metadata = &chunks[0].metadata;
        assert!(!metadata.contains_key("producer"));
        assert!(!metadata.contains_key("title"));
        assert_eq!(metadata.get("page"), Some(&json!(0)));
        assert_eq!(metadata.get("total_pages"), Some(&json!(2)));
        assert_eq!(metadata.get("source"), Some(&json!("document.pdf")));
    }

    #[test]
    fn test_blank_pages_fail_to_split() {
        let err = prepare_chunks(&[page("   \n\n ", 0)], &splitter()).unwrap_err();
        assert!(matches!(err, RagError::Split));
    }

    #[tokio::test]
    async fn test_invalid_model_is_checked_first() {
        let err = run_ingest("claude", &Config::default(), |_| None, Path::new("."), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidModel(m) if m == "claude"));
    }

    #[tokio::test]
    async fn test_each_missing_key_is_reported() {
        let dir = TempDir::new().unwrap();
        for kind in [ProviderKind::OpenAI, ProviderKind::Gemini] {
            for missing in kind.required_keys() {
                let mut env = openai_env(dir.path());
                for key in kind.required_keys() {
                    env.insert(key.to_string(), "x".into());
                }
                env.remove(missing);
                let err = run_ingest(
                    kind.as_str(),
                    &Config::default(),
                    |k| env.get(k).cloned(),
                    dir.path(),
                    false,
                )
                .await
                .unwrap_err();
                assert!(
                    matches!(&err, RagError::MissingConfig(k) if k == missing),
                    "{}: {:?}",
                    missing,
                    err
                );
            }
        }
    }

    #[tokio::test]
    async fn test_missing_pdf_path_and_file() {
        let dir = TempDir::new().unwrap();
        let mut env = openai_env(dir.path());
        env.remove("PDF_PATH");
        let err = run_ingest("openai", &Config::default(), |k| env.get(k).cloned(), dir.path(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::MissingConfig(k) if k == "PDF_PATH"));

        env.insert("PDF_PATH".into(), "nope.pdf".into());
        let err = run_ingest("openai", &Config::default(), |k| env.get(k).cloned(), dir.path(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::FileNotFound(p) if p == dir.path().join("nope.pdf")));
    }

    #[tokio::test]
    async fn test_ingest_pages_twice_duplicates_rows() {
        let provider = MockProvider::new();
        let store = InMemoryStore::new("docs");
        let pages = vec![page("Invoice total: $42.00.", 0)];

        let first = ingest_pages(pages.clone(), "abc", &ChunkingConfig::default(), &provider, &store, false)
            .await
            .unwrap();
        assert_eq!(first.rows_written, 1);
        ingest_pages(pages.clone(), "abc", &ChunkingConfig::default(), &provider, &store, false)
            .await
            .unwrap();
        assert_eq!(store.ids(), vec!["doc-0", "doc-0"]);

        let third = ingest_pages(pages, "abc", &ChunkingConfig::default(), &provider, &store, true)
            .await
            .unwrap();
        assert_eq!(third.rows_cleared, 2);
        assert_eq!(store.ids(), vec!["doc-0"]);
        assert_eq!(store.chunks()[0].metadata.get(SOURCE_HASH_KEY), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn test_foreign_collection_rejected_before_embedding() {
        let store = InMemoryStore::new("docs");
        let other = MockProvider::new().with_embedding_model("other-embedding");
        ingest_pages(vec![page("alpha", 0)], "h1", &ChunkingConfig::default(), &other, &store, false)
            .await
            .unwrap();

        let provider = MockProvider::new();
        let err = ingest_pages(vec![page("beta", 0)], "h2", &ChunkingConfig::default(), &provider, &store, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ProviderMismatch { .. }));
        assert_eq!(provider.embed_calls(), 0);
    }

    #[tokio::test]
    async fn test_reset_moves_collection_to_another_model() {
        let store = InMemoryStore::new("docs");
        let pages = vec![page("Invoice total: $42.00.", 0)];
        let first = MockProvider::new().with_embedding_model("embedding-a");
        ingest_pages(pages.clone(), "h1", &ChunkingConfig::default(), &first, &store, false)
            .await
            .unwrap();

        let second = MockProvider::new().with_embedding_model("embedding-b");
        let report = ingest_pages(pages, "h1", &ChunkingConfig::default(), &second, &store, true)
            .await
            .unwrap();
        assert_eq!(report.rows_cleared, 1);
        assert_eq!(store.ids(), vec!["doc-0"]);

        let info = store.collection().await.unwrap().unwrap();
        let stored = info.fingerprint.unwrap();
        assert_eq!(stored.embedding_model, "embedding-b");

        // The old model is now the foreign one
        let err = ingest_pages(vec![page("beta", 0)], "h2", &ChunkingConfig::default(), &first, &store, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ProviderMismatch { .. }));
    }

    /// Reads go to an in-memory store; every write fails.
    struct BrokenWrites(InMemoryStore);

    #[async_trait]
    impl VectorStore for BrokenWrites {
        fn collection_name(&self) -> &str {
            self.0.collection_name()
        }

        async fn collection(&self) -> Result<Option<CollectionInfo>, RagError> {
            self.0.collection().await
        }

        async fn ensure_collection(&self, fingerprint: &EmbeddingFingerprint) -> Result<(), RagError> {
            self.0.ensure_collection(fingerprint).await
        }

        async fn add_chunks(&self, _: &[Chunk], _: &[Vec<f32>]) -> Result<usize, RagError> {
            Err(RagError::Store("connection reset".into()))
        }

        async fn similarity_search_with_score(
            &self,
            query: &[f32],
            k: usize,
        ) -> Result<Vec<ScoredChunk>, RagError> {
            self.0.similarity_search_with_score(query, k).await
        }

        async fn count_with_metadata(&self, key: &str, value: &str) -> Result<u64, RagError> {
            self.0.count_with_metadata(key, value).await
        }

        async fn replace_chunks(
            &self,
            _: &EmbeddingFingerprint,
            _: &[Chunk],
            _: &[Vec<f32>],
        ) -> Result<u64, RagError> {
            Err(RagError::Store("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_reset_keeps_previous_rows() {
        let provider = MockProvider::new();
        let inner = InMemoryStore::new("docs");
        ingest_pages(vec![page("alpha", 0)], "h1", &ChunkingConfig::default(), &provider, &inner, false)
            .await
            .unwrap();
        let before = inner.collection().await.unwrap().unwrap().fingerprint;

        let store = BrokenWrites(inner);
        let err = ingest_pages(vec![page("beta", 0)], "h2", &ChunkingConfig::default(), &provider, &store, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Store(_)));

        assert_eq!(store.0.ids(), vec!["doc-0"]);
        assert_eq!(store.0.chunks()[0].text, "alpha");
        assert_eq!(store.0.collection().await.unwrap().unwrap().fingerprint, before);
    }
}
