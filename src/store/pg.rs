//! Postgres + pgvector [`VectorStore`].
//!
//! Vectors travel as pgvector text literals (`'[0.1,0.2]'`) cast with
//! `::vector`, so no extra client-side type support is needed. Similarity is
//! `1 - (embedding <=> query)`, the cosine distance operator.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::config::StoreSettings;
use crate::db;
use crate::error::RagError;
use crate::migrate;
use crate::models::{Chunk, Metadata, ScoredChunk};

use super::{
    check_fingerprint, ensure_same_len, CollectionInfo, EmbeddingFingerprint, VectorStore,
};

pub struct PgVectorStore {
    pool: PgPool,
    collection_name: String,
}

impl PgVectorStore {
    /// Connect, run the schema migration, and bind to one collection.
    pub async fn connect(settings: &StoreSettings) -> Result<Self, RagError> {
        let pool = db::connect(&settings.database_url)
            .await
            .map_err(|e| RagError::Store(format!("{:#}", e)))?;
        migrate::run_migrations(&pool)
            .await
            .map_err(|e| RagError::Store(format!("{:#}", e)))?;
        Ok(Self::with_pool(pool, &settings.collection_name))
    }

    pub fn with_pool(pool: PgPool, collection_name: &str) -> Self {
        Self {
            pool,
            collection_name: collection_name.to_string(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lookup(&self) -> Result<Option<(Uuid, Option<EmbeddingFingerprint>)>, RagError> {
        let row = sqlx::query("SELECT uuid, cmetadata FROM rag_collections WHERE name = $1")
            .bind(&self.collection_name)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let uuid: Uuid = row.try_get("uuid")?;
        let cmetadata: serde_json::Value = row.try_get("cmetadata")?;
        Ok(Some((uuid, parse_fingerprint(cmetadata))))
    }

    async fn collection_id(&self) -> Result<Uuid, RagError> {
        self.lookup().await?.map(|(uuid, _)| uuid).ok_or_else(|| {
            RagError::Store(format!("collection '{}' does not exist", self.collection_name))
        })
    }

    async fn write_fingerprint(
        &self,
        uuid: Uuid,
        fingerprint: &EmbeddingFingerprint,
    ) -> Result<(), RagError> {
        sqlx::query("UPDATE rag_collections SET cmetadata = $1 WHERE uuid = $2")
            .bind(fingerprint_json(fingerprint)?)
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn insert_rows(
    conn: &mut PgConnection,
    collection_id: Uuid,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
) -> Result<(), RagError> {
    for (chunk, vector) in chunks.iter().zip(vectors) {
        let metadata =
            serde_json::to_value(&chunk.metadata).map_err(|e| RagError::Store(e.to_string()))?;
        sqlx::query(
            "INSERT INTO rag_embeddings (id, collection_id, document, cmetadata, embedding) \
             VALUES ($1, $2, $3, $4, $5::text::vector)",
        )
        .bind(&chunk.id)
        .bind(collection_id)
        .bind(&chunk.text)
        .bind(metadata)
        .bind(vector_literal(vector))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Render a vector as a pgvector text literal.
pub fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Collections written by other tools carry unrelated metadata; treat
/// anything unparseable as "no fingerprint".
fn parse_fingerprint(cmetadata: serde_json::Value) -> Option<EmbeddingFingerprint> {
    serde_json::from_value(cmetadata).ok()
}

fn fingerprint_json(fingerprint: &EmbeddingFingerprint) -> Result<serde_json::Value, RagError> {
    serde_json::to_value(fingerprint).map_err(|e| RagError::Store(e.to_string()))
}

fn metadata_from_json(value: serde_json::Value) -> Metadata {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => Metadata::new(),
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn collection(&self) -> Result<Option<CollectionInfo>, RagError> {
        let Some((uuid, fingerprint)) = self.lookup().await? else {
            return Ok(None);
        };
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rag_embeddings WHERE collection_id = $1")
            .bind(uuid)
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(CollectionInfo {
            name: self.collection_name.clone(),
            fingerprint,
            rows: rows.max(0) as u64,
        }))
    }

    async fn ensure_collection(&self, fingerprint: &EmbeddingFingerprint) -> Result<(), RagError> {
        if let Some((uuid, stored)) = self.lookup().await? {
            check_fingerprint(stored.as_ref(), fingerprint)?;
            let learned_dims = stored
                .as_ref()
                .map(|s| s.dimensions.is_none() && fingerprint.dimensions.is_some())
                .unwrap_or(true);
            if learned_dims {
                self.write_fingerprint(uuid, fingerprint).await?;
            }
            return Ok(());
        }

        tracing::info!(collection = %self.collection_name, "creating collection");
        sqlx::query(
            "INSERT INTO rag_collections (uuid, name, cmetadata) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(&self.collection_name)
        .bind(fingerprint_json(fingerprint)?)
        .execute(&self.pool)
        .await?;

        // Another writer may have won the race; validate against what is there now
        match self.lookup().await? {
            Some((_, stored)) => check_fingerprint(stored.as_ref(), fingerprint),
            None => Err(RagError::Store(format!(
                "collection '{}' could not be created",
                self.collection_name
            ))),
        }
    }

    async fn add_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<usize, RagError> {
        ensure_same_len(chunks, vectors)?;
        let collection_id = self.collection_id().await?;

        let mut tx = self.pool.begin().await?;
        insert_rows(&mut *tx, collection_id, chunks, vectors).await?;
        tx.commit().await?;

        Ok(chunks.len())
    }

    async fn similarity_search_with_score(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let Some((collection_id, _)) = self.lookup().await? else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            "SELECT id, document, cmetadata, 1 - (embedding <=> $1::text::vector) AS score \
             FROM rag_embeddings \
             WHERE collection_id = $2 \
             ORDER BY embedding <=> $1::text::vector \
             LIMIT $3",
        )
        .bind(vector_literal(query))
        .bind(collection_id)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let cmetadata: serde_json::Value = row.try_get("cmetadata")?;
            // NaN when either side is a zero vector
            let score: Option<f64> = row.try_get("score")?;
            results.push(ScoredChunk {
                chunk: Chunk {
                    id: row.try_get("id")?,
                    text: row.try_get("document")?,
                    metadata: metadata_from_json(cmetadata),
                },
                score: score.filter(|s| s.is_finite()).unwrap_or(0.0),
            });
        }
        Ok(results)
    }

    async fn count_with_metadata(&self, key: &str, value: &str) -> Result<u64, RagError> {
        let Some((collection_id, _)) = self.lookup().await? else {
            return Ok(0);
        };
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rag_embeddings WHERE collection_id = $1 AND cmetadata ->> $2 = $3",
        )
        .bind(collection_id)
        .bind(key)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn replace_chunks(
        &self,
        fingerprint: &EmbeddingFingerprint,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<u64, RagError> {
        ensure_same_len(chunks, vectors)?;

        // Dropping the transaction on any error rolls back the delete too
        let mut tx = self.pool.begin().await?;
        let collection_id: Uuid = sqlx::query_scalar(
            "INSERT INTO rag_collections (uuid, name, cmetadata) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO UPDATE SET cmetadata = EXCLUDED.cmetadata \
             RETURNING uuid",
        )
        .bind(Uuid::new_v4())
        .bind(&self.collection_name)
        .bind(fingerprint_json(fingerprint)?)
        .fetch_one(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM rag_embeddings WHERE collection_id = $1")
            .bind(collection_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        insert_rows(&mut *tx, collection_id, chunks, vectors).await?;
        tx.commit().await?;

        Ok(deleted)
    }
}
