//! Configuration: TOML tunables plus provider settings from the environment.
//!
//! The TOML file is optional. When it is missing every section falls back
//! to its defaults (chunk size 1000, overlap 150, top-k 10, temperature 0.1).
//!
//! Credentials, model names and the database location always come from
//! environment variables. They are read through a lookup function so the
//! pipelines can be exercised without touching the process environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::RagError;

pub const PDF_PATH_KEY: &str = "PDF_PATH";
pub const DATABASE_URL_KEY: &str = "DATABASE_URL";
pub const COLLECTION_KEY: &str = "PG_VECTOR_COLLECTION_NAME";

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// No local timeout unless set; the HTTP client default applies.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            timeout_secs: None,
            max_retries: default_max_retries(),
            embedding_batch_size: default_embedding_batch_size(),
            openai_base_url: default_openai_base_url(),
            gemini_base_url: default_gemini_base_url(),
        }
    }
}

fn default_temperature() -> f32 {
    0.1
}
fn default_max_retries() -> u32 {
    2
}
fn default_embedding_batch_size() -> usize {
    64
}
fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}
fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}

/// Load the TOML tunables, or the defaults when `path` does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate llm
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if config.llm.embedding_batch_size == 0 {
        anyhow::bail!("llm.embedding_batch_size must be > 0");
    }

    Ok(())
}

/// The two supported hosted providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Gemini,
}

impl ProviderKind {
    /// Parse a user-supplied model choice, case-insensitively.
    pub fn parse(choice: &str) -> Result<Self, RagError> {
        match choice.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "gemini" => Ok(ProviderKind::Gemini),
            _ => Err(RagError::InvalidModel(choice.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn api_key_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GOOGLE_API_KEY",
        }
    }

    pub fn embedding_model_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "OPENAI_EMBEDDING_MODEL",
            ProviderKind::Gemini => "GOOGLE_EMBEDDING_MODEL",
        }
    }

    pub fn llm_model_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "OPENAI_LLM_MODEL",
            ProviderKind::Gemini => "GOOGLE_LLM_MODEL",
        }
    }

    /// Environment keys that must be set before any external call, in the
    /// order they are checked.
    pub fn required_keys(self) -> [&'static str; 5] {
        [
            self.api_key_var(),
            DATABASE_URL_KEY,
            COLLECTION_KEY,
            self.embedding_model_var(),
            self.llm_model_var(),
        ]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials and model names for the selected provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: String,
    pub embedding_model: String,
    pub llm_model: String,
}

/// Where the vector store lives.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub database_url: String,
    pub collection_name: String,
}

/// Everything a pipeline needs from the environment.
#[derive(Debug, Clone)]
pub struct Environment {
    pub provider: ProviderSettings,
    pub store: StoreSettings,
}

impl Environment {
    /// Resolve the settings of `kind`, failing on the first missing key.
    pub fn resolve<F>(kind: ProviderKind, lookup: F) -> Result<Self, RagError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in kind.required_keys() {
            require(&lookup, key)?;
        }

        Ok(Self {
            provider: ProviderSettings {
                kind,
                api_key: require(&lookup, kind.api_key_var())?,
                embedding_model: require(&lookup, kind.embedding_model_var())?,
                llm_model: require(&lookup, kind.llm_model_var())?,
            },
            store: StoreSettings {
                database_url: require(&lookup, DATABASE_URL_KEY)?,
                collection_name: require(&lookup, COLLECTION_KEY)?,
            },
        })
    }
}

/// Read `key`; empty values count as missing.
pub fn require<F>(lookup: &F, key: &str) -> Result<String, RagError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RagError::MissingConfig(key.to_string())),
    }
}

/// Resolve `PDF_PATH` against `base_dir` and check that the file exists.
pub fn resolve_pdf_path<F>(lookup: &F, base_dir: &Path) -> Result<PathBuf, RagError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = require(lookup, PDF_PATH_KEY)?;
    let path = base_dir.join(raw);
    if !path.exists() {
        return Err(RagError::FileNotFound(path));
    }
    Ok(path)
}

/// Lookup backed by the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
