//! Reference vector index over artifact rows.
//!
//! Row text is embedded through the configured provider's `/embeddings`
//! endpoint and kept as little-endian `f32` blobs in `row_embeddings`. A query
//! embeds the question and ranks every stored row by cosine similarity.

use std::sync::Arc;

use async_trait::async_trait;
use caseclaw_core::dataset::{SemanticHit, VectorIndex};
use caseclaw_core::error::StoreError;
use caseclaw_core::provider::{EmbeddingRequest, Provider};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::vector::cosine_similarity;

const BATCH_SIZE: usize = 100;

/// Embedding-backed [`VectorIndex`].
pub struct EmbeddingIndex {
    pool: SqlitePool,
    provider: Arc<dyn Provider>,
    model: String,
}

impl EmbeddingIndex {
    /// Create the index on the store's pool.
    pub async fn new(
        pool: SqlitePool,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
    ) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS row_embeddings (
                artifact_data_id INTEGER PRIMARY KEY,
                job_name         TEXT NOT NULL,
                model            TEXT NOT NULL,
                embedding        BLOB NOT NULL,
                FOREIGN KEY (artifact_data_id) REFERENCES artifact_data(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("row_embeddings table: {e}")))?;

        Ok(Self {
            pool,
            provider,
            model: model.into(),
        })
    }

    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, StoreError> {
        let expected = inputs.len();
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs,
            })
            .await
            .map_err(|e| StoreError::EmbeddingFailed(e.to_string()))?;

        if response.embeddings.len() != expected {
            return Err(StoreError::EmbeddingFailed(format!(
                "expected {expected} embeddings, got {}",
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }

    /// Embed every row of a report that has no embedding yet.
    /// Returns the number of rows embedded.
    pub async fn index_report(&self, job_name: &str) -> Result<usize, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT ad.id, ad.data_json
            FROM artifact_data ad
            LEFT JOIN row_embeddings re ON re.artifact_data_id = ad.id
            WHERE ad.job_name = ?1 AND re.artifact_data_id IS NULL
            ORDER BY ad.id
            "#,
        )
        .bind(job_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Unindexed rows: {e}")))?;

        let mut pending = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
            let text: String = row
                .try_get("data_json")
                .map_err(|e| StoreError::QueryFailed(format!("data_json column: {e}")))?;
            pending.push((id, text));
        }

        let mut indexed = 0;
        for batch in pending.chunks(BATCH_SIZE) {
            let embeddings = self
                .embed(batch.iter().map(|(_, text)| text.clone()).collect())
                .await?;

            for ((id, _), embedding) in batch.iter().zip(embeddings) {
                sqlx::query(
                    "INSERT OR REPLACE INTO row_embeddings (artifact_data_id, job_name, model, embedding) \
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(id)
                .bind(job_name)
                .bind(&self.model)
                .bind(Self::embedding_to_blob(&embedding))
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Storage(format!("INSERT embedding failed: {e}")))?;
            }
            indexed += batch.len();
            debug!(job_name, indexed, total = pending.len(), "Embedded batch");
        }

        info!(job_name, indexed, "Report indexed for semantic search");
        Ok(indexed)
    }
}

#[async_trait]
impl VectorIndex for EmbeddingIndex {
    async fn query(
        &self,
        text: &str,
        job_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SemanticHit>, StoreError> {
        let query_embedding = self
            .embed(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let rows = sqlx::query(
            r#"
            SELECT ad.job_name, ad.artifact_type_id, ad.row_index, ad.data_json,
                   at.file_name, re.embedding
            FROM row_embeddings re
            JOIN artifact_data ad ON ad.id = re.artifact_data_id
            JOIN artifact_types at ON at.id = ad.artifact_type_id
            WHERE re.model = ?1 AND (?2 IS NULL OR ad.job_name = ?2)
            "#,
        )
        .bind(&self.model)
        .bind(job_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Vector scan: {e}")))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row
                .try_get("embedding")
                .map_err(|e| StoreError::QueryFailed(format!("embedding column: {e}")))?;
            let similarity = cosine_similarity(&Self::blob_to_embedding(&blob), &query_embedding);
            hits.push(SemanticHit {
                job_name: row
                    .try_get("job_name")
                    .map_err(|e| StoreError::QueryFailed(format!("job_name column: {e}")))?,
                artifact_type_id: row
                    .try_get("artifact_type_id")
                    .map_err(|e| StoreError::QueryFailed(format!("artifact_type_id column: {e}")))?,
                file_name: row
                    .try_get("file_name")
                    .map_err(|e| StoreError::QueryFailed(format!("file_name column: {e}")))?,
                row_index: row
                    .try_get("row_index")
                    .map_err(|e| StoreError::QueryFailed(format!("row_index column: {e}")))?,
                content: row
                    .try_get("data_json")
                    .map_err(|e| StoreError::QueryFailed(format!("data_json column: {e}")))?,
                distance: 1.0 - similarity,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use caseclaw_core::error::ProviderError;
    use caseclaw_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};

    /// Embeds text as counts of a few keywords, so similarity is predictable.
    struct KeywordEmbedder;

    #[async_trait]
    impl Provider for KeywordEmbedder {
        fn name(&self) -> &str {
            "keywords"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("embeddings only".into()))
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> Result<EmbeddingResponse, ProviderError> {
            let embeddings = request
                .inputs
                .iter()
                .map(|text| {
                    let text = text.to_lowercase();
                    ["van", "dock", "call"]
                        .iter()
                        .map(|kw| text.matches(kw).count() as f32)
                        .collect()
                })
                .collect();
            Ok(EmbeddingResponse {
                embeddings,
                model: request.model,
            })
        }
    }

    async fn seeded() -> (SqliteStore, EmbeddingIndex) {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        store.insert_report("pixel-7", "/cases/pixel-7", "completed").await.unwrap();
        store.insert_report("galaxy", "/cases/galaxy", "completed").await.unwrap();
        let sms = store.insert_artifact_type("pixel-7", "sms.tsv").await.unwrap();
        let other = store.insert_artifact_type("galaxy", "sms.tsv").await.unwrap();
        store.insert_row("pixel-7", sms, 0, r#"{"body":"bring the van"}"#).await.unwrap();
        store.insert_row("pixel-7", sms, 1, r#"{"body":"meet at the dock"}"#).await.unwrap();
        store.insert_row("galaxy", other, 0, r#"{"body":"the van is parked"}"#).await.unwrap();

        let index = EmbeddingIndex::new(store.pool().clone(), Arc::new(KeywordEmbedder), "kw")
            .await
            .unwrap();
        (store, index)
    }

    #[tokio::test]
    async fn index_report_is_incremental() {
        let (_store, index) = seeded().await;
        assert_eq!(index.index_report("pixel-7").await.unwrap(), 2);
        assert_eq!(index.index_report("pixel-7").await.unwrap(), 0);
        assert_eq!(index.index_report("galaxy").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_ranks_by_similarity_within_report() {
        let (_store, index) = seeded().await;
        index.index_report("pixel-7").await.unwrap();
        index.index_report("galaxy").await.unwrap();

        let hits = index.query("where is the dock", Some("pixel-7"), 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].row_index, 1);
        assert!(hits[0].distance < hits[1].distance);
        assert!(hits.iter().all(|h| h.job_name == "pixel-7"));
    }

    #[tokio::test]
    async fn query_across_reports_respects_limit() {
        let (_store, index) = seeded().await;
        index.index_report("pixel-7").await.unwrap();
        index.index_report("galaxy").await.unwrap();

        let hits = index.query("van", None, 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.content.contains("van")));
    }

    #[test]
    fn blob_round_trip() {
        let blob = EmbeddingIndex::embedding_to_blob(&[0.1, -2.5, 3.0]);
        let back = EmbeddingIndex::blob_to_embedding(&blob);
        assert_eq!(back, vec![0.1, -2.5, 3.0]);
    }
}
