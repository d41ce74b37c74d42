//! # PDF RAG
//!
//! Retrieval-augmented question answering over a single PDF.
//!
//! A PDF is split into overlapping chunks, embedded with a hosted model
//! (OpenAI or Gemini) and stored in a Postgres `pgvector` collection.
//! Questions are embedded with the same model, the nearest chunks become
//! the context of a fixed Portuguese prompt, and a chat model answers from
//! that context only.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   PDF    │──▶│ Split pages │──▶│ Embed chunks │──▶│   pgvector   │
//! │ extract  │   │    chunk    │   │   provider   │   │    store     │
//! └──────────┘   └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                                             │ top-k
//!                     ┌──────────┐   ┌──────────────┐         │
//!                     │  answer  │◀──│ prompt + LLM │◀────────┘
//!                     └──────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init                                   # create extension and tables
//! rag ingest openai                          # ingest $PDF_PATH
//! rag ask "Qual o total?" --model openai     # one-shot question
//! rag chat                                   # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML tuning and environment settings |
//! | [`error`] | Pipeline error type |
//! | [`models`] | Pages, chunks, search results |
//! | [`extract`] | PDF text and metadata |
//! | [`chunk`] | Recursive character splitter |
//! | [`provider`] | Embedding and chat providers |
//! | [`store`] | Vector store trait, pgvector and in-memory backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Retrieval pipeline and prompt |
//! | [`chat`] | Interactive chat loop |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod provider;
pub mod search;
pub mod store;
