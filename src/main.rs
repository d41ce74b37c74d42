//! # PDF RAG CLI (`rag`)
//!
//! Ingest a PDF into a pgvector collection, then ask questions that are
//! answered only from the retrieved chunks.
//!
//! ## Usage
//!
//! ```bash
//! rag [--config ./config/rag.toml] [--env-file .env] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the pgvector extension and tables |
//! | `rag ingest <openai\|gemini>` | Load, split, embed and store `PDF_PATH` |
//! | `rag ask "<question>" --model <openai\|gemini>` | One-shot question |
//! | `rag chat` | Interactive chat in Portuguese |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest with OpenAI embeddings, replacing what the collection held
//! rag ingest openai --reset
//!
//! # Ask with the same provider, listing the retrieved chunks
//! rag ask "Qual é o valor total da fatura?" --model openai --sources
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use pdf_rag::chat::{self, EnvBackend};
use pdf_rag::config::{self, process_env, DATABASE_URL_KEY};
use pdf_rag::{db, ingest, migrate, search};

/// Exit status after Ctrl-C, as a shell reports SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

/// PDF RAG: answer questions about a PDF from its own text.
///
/// Credentials and connection settings come from environment variables
/// (optionally loaded from a `.env` file); tuning knobs from an optional
/// TOML file.
#[derive(Parser)]
#[command(name = "rag", version, about = "Retrieval-augmented Q&A over a PDF")]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    /// Directory a relative `PDF_PATH` is resolved against.
    ///
    /// Defaults to the current directory.
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Environment file loaded before anything else. Variables already set
    /// in the process environment win.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// More log output on stderr (`-v` info, `-vv` debug). `RUST_LOG`
    /// overrides this.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the pgvector extension and the collection tables.
    ///
    /// Needs `DATABASE_URL`. Idempotent; `ingest` and `ask` run the same
    /// migration on their own.
    Init,

    /// Ingest the PDF at `PDF_PATH` into `PG_VECTOR_COLLECTION_NAME`.
    ///
    /// Re-running without `--reset` stores a second copy of every chunk.
    Ingest {
        /// Provider used for embeddings: `openai` or `gemini`.
        model: Option<String>,

        /// Replace the collection's rows, and the provider it records, with
        /// this run's. Needed to switch provider or embedding model.
        #[arg(long)]
        reset: bool,
    },

    /// Answer one question from the ingested document.
    Ask {
        /// The question.
        question: String,

        /// Provider: `openai` or `gemini`. Must match the one used to ingest.
        #[arg(long, short)]
        model: String,

        /// Also print the retrieved chunk ids and scores.
        #[arg(long)]
        sources: bool,
    },

    /// Interactive chat (Portuguese prompts).
    Chat,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "warn,pdf_rag=info",
        _ => "warn,pdf_rag=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_env_file(path: &Path) -> anyhow::Result<()> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "loaded environment file");
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    load_env_file(&cli.env_file)?;

    let cfg = config::load_config(&cli.config)?;
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };

    match cli.command {
        Commands::Init => {
            let url = config::require(&process_env, DATABASE_URL_KEY)?;
            let pool = db::connect(&url).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { model, reset } => {
            let Some(model) = model else {
                println!("Uso: rag ingest <openai|gemini>");
                std::process::exit(1);
            };

            let report = tokio::select! {
                result = ingest::run_ingest(&model, &cfg, process_env, &base_dir, reset) => result?,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\nIngestion interrupted; the collection was left unchanged.");
                    std::process::exit(EXIT_INTERRUPTED);
                }
            };

            println!("ingest {}", report.source.display());
            println!("  pages: {}", report.pages);
            println!("  chunks: {}", report.chunks);
            if report.rows_cleared > 0 {
                println!("  rows cleared: {}", report.rows_cleared);
            }
            println!("  rows written: {}", report.rows_written);
            println!("  collection: {}", report.collection);
            println!("ok");
        }
        Commands::Ask {
            question,
            model,
            sources,
        } => {
            let answer = search::run_answer(&question, &model, &cfg, process_env).await?;
            println!("{}", answer.text);

            if sources {
                println!();
                println!("Sources:");
                for (i, source) in answer.sources.iter().enumerate() {
                    let page = source
                        .chunk
                        .metadata
                        .get("page_label")
                        .and_then(|v| v.as_str())
                        .unwrap_or("-");
                    println!(
                        "  {}. [{:.4}] {} (page {})",
                        i + 1,
                        source.score,
                        source.chunk.id,
                        page
                    );
                }
            }
        }
        Commands::Chat => {
            let backend = EnvBackend::new(cfg, base_dir);
            let input = BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();

            tokio::select! {
                result = chat::run_chat(&backend, input, &mut stdout) => result?,
                _ = tokio::signal::ctrl_c() => {
                    println!("\n\n{}", chat::INTERRUPTED);
                    let _ = std::io::stdout().flush();
                    // A pending stdin read would block runtime shutdown
                    std::process::exit(0);
                }
            }
        }
    }

    Ok(())
}
