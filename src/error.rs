//! Error type shared by the ingestion and retrieval pipelines.
//!
//! Every variant aborts the current operation. Callers decide what to do
//! with it: the `ingest` command exits non-zero, the chat loop prints the
//! message and waits for the next question.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// The model choice is not `openai` or `gemini`.
    #[error("Invalid LLM model: '{0}'. Use openai or gemini.")]
    InvalidModel(String),

    /// A required environment variable is absent or empty.
    #[error("Environment variable {0} is not set")]
    MissingConfig(String),

    #[error("File {} not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to load documents: {0}")]
    Load(String),

    #[error("Failed to split documents: no chunks produced")]
    Split,

    #[error("Embedding request failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    Store(String),

    /// The collection was populated by a different provider or model.
    #[error(
        "Collection was built with {expected}, but {found} is in use. \
         Use the same model or re-ingest with --reset."
    )]
    ProviderMismatch { expected: String, found: String },

    #[error("Question is not set")]
    EmptyQuestion,

    #[error("Failed to get results from vector store")]
    NoResults,

    #[error("Failed to get context from results")]
    EmptyContext,

    #[error("Failed to get response from LLM: {0}")]
    Llm(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_names_the_key() {
        let err = RagError::MissingConfig("DATABASE_URL".to_string());
        assert_eq!(err.to_string(), "Environment variable DATABASE_URL is not set");
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = RagError::FileNotFound(PathBuf::from("/tmp/document.pdf"));
        assert_eq!(err.to_string(), "File /tmp/document.pdf not found");
    }

    #[test]
    fn sqlx_errors_become_store_errors() {
        let err: RagError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, RagError::Store(_)));
    }
}
