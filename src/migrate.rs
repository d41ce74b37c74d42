use anyhow::{Context, Result};
use sqlx::PgPool;

/// Create the pgvector extension and the collection tables.
///
/// Every statement is idempotent; this runs before each command that opens
/// the store.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await
        .context("Failed to create the pgvector extension")?;

    // One row per named collection; cmetadata holds the embedding fingerprint
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rag_collections (
            uuid UUID PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            cmetadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `id` is not unique: re-ingesting a document appends a second set of rows
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rag_embeddings (
            row_id BIGSERIAL PRIMARY KEY,
            id TEXT NOT NULL,
            collection_id UUID NOT NULL REFERENCES rag_collections(uuid) ON DELETE CASCADE,
            document TEXT NOT NULL,
            cmetadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            embedding vector NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rag_embeddings_collection ON rag_embeddings(collection_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_embeddings_id ON rag_embeddings(id)")
        .execute(pool)
        .await?;

    Ok(())
}
