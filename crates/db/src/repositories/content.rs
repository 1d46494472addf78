use std::sync::Arc;

use sqlx::{QueryBuilder, Row, Sqlite};

use partsage_core::domain::content::{
    cosine_similarity, ChunkDetail, ContentChunk, ContentSearch, DocumentType, ScoredChunk,
};
use partsage_core::domain::item::ApplianceCategory;

use super::{
    rank_chunks, ContentIndex, EmbeddedChunk, EmbeddingError, QueryEmbedder, RepositoryError,
};
use crate::DbPool;

/// Content index backed by the `content_chunk` table. Embeddings are imported
/// out-of-band and ranked in process by cosine similarity.
pub struct SqlContentIndex {
    pool: DbPool,
    embedder: Arc<dyn QueryEmbedder>,
}

impl SqlContentIndex {
    pub fn new(pool: DbPool, embedder: Arc<dyn QueryEmbedder>) -> Self {
        Self { pool, embedder }
    }

    pub async fn import(&self, record: &EmbeddedChunk) -> Result<(), RepositoryError> {
        self.import_all(std::slice::from_ref(record)).await
    }

    /// Imports every record or none. All embeddings must share the index's
    /// dimension; an empty index adopts the dimension of the first record.
    pub async fn import_all(&self, records: &[EmbeddedChunk]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let stored: Option<i64> = sqlx::query_scalar("SELECT embedding_dim FROM content_chunk LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
        let mut expected = stored.map(|dim| dim.max(0) as usize);

        for record in records {
            check_record(record, &mut expected)?;
            upsert(&mut tx, record).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Dimension shared by every indexed embedding, `None` while empty.
    pub async fn embedding_dimension(&self) -> Result<Option<usize>, RepositoryError> {
        let stored: Option<i64> = sqlx::query_scalar("SELECT embedding_dim FROM content_chunk LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(stored.map(|dim| dim.max(0) as usize))
    }
}

fn check_record(record: &EmbeddedChunk, expected: &mut Option<usize>) -> Result<(), RepositoryError> {
    if record.embedding.is_empty() {
        return Err(RepositoryError::Decode(format!(
            "chunk `{}` has an empty embedding",
            record.chunk.chunk_id
        )));
    }
    if record.chunk.detail.document_type() != record.chunk.document_type {
        return Err(RepositoryError::Decode(format!(
            "chunk `{}` detail does not match document_type `{}`",
            record.chunk.chunk_id, record.chunk.document_type
        )));
    }

    let actual = record.embedding.len();
    match *expected {
        Some(expected) if expected != actual => {
            Err(EmbeddingError::ChunkDimensionMismatch {
                chunk_id: record.chunk.chunk_id.clone(),
                expected,
                actual,
            }
            .into())
        }
        Some(_) => Ok(()),
        None => {
            *expected = Some(actual);
            Ok(())
        }
    }
}

async fn upsert(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    record: &EmbeddedChunk,
) -> Result<(), RepositoryError> {
    let detail_json = serde_json::to_string(&record.chunk.detail)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let embedding_json = serde_json::to_string(&record.embedding)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let chunk = &record.chunk;

    sqlx::query(
        "INSERT INTO content_chunk (chunk_id, text, document_type, appliance_category,
                                    source_url, chunk_index, total_chunks, detail_json,
                                    embedding_json, embedding_dim)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(chunk_id) DO UPDATE SET
             text = excluded.text,
             document_type = excluded.document_type,
             appliance_category = excluded.appliance_category,
             source_url = excluded.source_url,
             chunk_index = excluded.chunk_index,
             total_chunks = excluded.total_chunks,
             detail_json = excluded.detail_json,
             embedding_json = excluded.embedding_json,
             embedding_dim = excluded.embedding_dim",
    )
    .bind(&chunk.chunk_id)
    .bind(&chunk.text)
    .bind(chunk.document_type.as_str())
    .bind(chunk.appliance_category.map(|category| category.as_str()))
    .bind(&chunk.source_url)
    .bind(i64::from(chunk.chunk_index))
    .bind(i64::from(chunk.total_chunks))
    .bind(detail_json)
    .bind(embedding_json)
    .bind(record.embedding.len() as i64)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn row_to_embedded(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(Vec<f32>, ContentChunk), RepositoryError> {
    let document_type: String = row.try_get("document_type").map_err(decode_err)?;
    let appliance_category: Option<String> =
        row.try_get("appliance_category").map_err(decode_err)?;
    let chunk_index: i64 = row.try_get("chunk_index").map_err(decode_err)?;
    let total_chunks: i64 = row.try_get("total_chunks").map_err(decode_err)?;
    let detail_json: String = row.try_get("detail_json").map_err(decode_err)?;
    let embedding_json: String = row.try_get("embedding_json").map_err(decode_err)?;

    let document_type = DocumentType::parse(&document_type).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown document_type `{document_type}`"))
    })?;
    let appliance_category = appliance_category
        .map(|raw| {
            ApplianceCategory::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown category `{raw}`")))
        })
        .transpose()?;
    let detail: ChunkDetail = serde_json::from_str(&detail_json)
        .map_err(|e| RepositoryError::Decode(format!("detail_json: {e}")))?;
    let embedding: Vec<f32> = serde_json::from_str(&embedding_json)
        .map_err(|e| RepositoryError::Decode(format!("embedding_json: {e}")))?;

    let chunk = ContentChunk {
        chunk_id: row.try_get("chunk_id").map_err(decode_err)?,
        text: row.try_get("text").map_err(decode_err)?,
        document_type,
        appliance_category,
        source_url: row.try_get("source_url").map_err(decode_err)?,
        chunk_index: u32::try_from(chunk_index).unwrap_or_default(),
        total_chunks: u32::try_from(total_chunks).unwrap_or(1),
        detail,
    };
    Ok((embedding, chunk))
}

#[async_trait::async_trait]
impl ContentIndex for SqlContentIndex {
    async fn search(&self, search: &ContentSearch) -> Result<Vec<ScoredChunk>, RepositoryError> {
        let query_vector = self.embedder.embed(&search.query_text).await?;

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT chunk_id, text, document_type, appliance_category, source_url, chunk_index,
                    total_chunks, detail_json, embedding_json
             FROM content_chunk WHERE embedding_dim = ",
        );
        builder.push_bind(query_vector.len() as i64);
        if let Some(document_type) = search.document_type {
            builder.push(" AND document_type = ");
            builder.push_bind(document_type.as_str());
        }
        if let Some(category) = search.appliance_category {
            builder.push(" AND (appliance_category IS NULL OR appliance_category = ");
            builder.push_bind(category.as_str());
            builder.push(")");
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        if rows.is_empty() && self.chunk_count().await? > 0 {
            let expected: Option<i64> =
                sqlx::query_scalar("SELECT embedding_dim FROM content_chunk LIMIT 1")
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some(expected) = expected {
                if expected as usize != query_vector.len() {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: expected as usize,
                        actual: query_vector.len(),
                    }
                    .into());
                }
            }
        }

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let (embedding, chunk) = row_to_embedded(row)?;
            if let Some(cosine) = cosine_similarity(&query_vector, &embedding) {
                scored.push((cosine, chunk));
            }
        }

        Ok(rank_chunks(scored, search.top_k))
    }

    async fn chunk_count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_chunk")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use partsage_core::domain::content::{ChunkDetail, ContentChunk, ContentSearch, DocumentType};
    use partsage_core::domain::item::{ApplianceCategory, ItemId};

    use super::SqlContentIndex;
    use crate::repositories::{
        ContentIndex, EmbeddedChunk, EmbeddingError, QueryEmbedder, RepositoryError,
    };
    use crate::{connect_with_settings, migrations};

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl QueryEmbedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(self.0.clone())
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl QueryEmbedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Unavailable("connection refused".to_string()))
        }
    }

    fn repair_chunk(id: &str, category: ApplianceCategory, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: ContentChunk {
                chunk_id: id.to_string(),
                text: format!("Repair guide {id}"),
                document_type: DocumentType::Repair,
                appliance_category: Some(category),
                source_url: format!("https://www.partselect.com/Repair/{id}"),
                chunk_index: 0,
                total_chunks: 1,
                detail: ChunkDetail::Repair {
                    part_name: "Ice Maker Assembly".to_string(),
                    symptom: Some("Ice maker not making ice".to_string()),
                    linked_item_id: Some(ItemId("PS11739035".to_string())),
                },
            },
            embedding,
        }
    }

    fn policy_chunk(embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: ContentChunk {
                chunk_id: "policy-returns".to_string(),
                text: "Return any part within 365 days.".to_string(),
                document_type: DocumentType::Policy,
                appliance_category: None,
                source_url: "https://www.partselect.com/365-Day-Returns.htm".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                detail: ChunkDetail::Policy {
                    policy_type: "returns".to_string(),
                    title: "365 Day Returns".to_string(),
                },
            },
            embedding,
        }
    }

    async fn index_with(embedder: Arc<dyn QueryEmbedder>) -> SqlContentIndex {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let index = SqlContentIndex::new(pool, embedder);
        index
            .import(&repair_chunk("fridge-ice", ApplianceCategory::Refrigerator, vec![1.0, 0.0]))
            .await
            .expect("import");
        index
            .import(&repair_chunk("dish-drain", ApplianceCategory::Dishwasher, vec![0.6, 0.8]))
            .await
            .expect("import");
        index.import(&policy_chunk(vec![0.0, 1.0])).await.expect("import");
        index
    }

    fn search(top_k: u32) -> ContentSearch {
        ContentSearch {
            query_text: "ice maker broken".to_string(),
            document_type: None,
            appliance_category: None,
            top_k,
        }
    }

    #[tokio::test]
    async fn results_are_ranked_by_descending_relevance() {
        let index = index_with(Arc::new(FixedEmbedder(vec![1.0, 0.0]))).await;
        let results = index.search(&search(5)).await.expect("search");

        let ids = results.iter().map(|hit| hit.chunk.chunk_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["fridge-ice", "dish-drain", "policy-returns"]);
        assert_eq!(results[0].rank, 1);
        assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
        assert!(results.iter().all(|hit| (0.0..=1.0).contains(&hit.score.value())));
    }

    #[tokio::test]
    async fn filters_and_top_k_are_applied() {
        let index = index_with(Arc::new(FixedEmbedder(vec![1.0, 0.0]))).await;

        let dishwasher = ContentSearch {
            appliance_category: Some(ApplianceCategory::Dishwasher),
            ..search(5)
        };
        let ids = index
            .search(&dishwasher)
            .await
            .expect("search")
            .into_iter()
            .map(|hit| hit.chunk.chunk_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["dish-drain".to_string(), "policy-returns".to_string()]);

        let policies = ContentSearch { document_type: Some(DocumentType::Policy), ..search(5) };
        assert_eq!(index.search(&policies).await.expect("search").len(), 1);

        assert_eq!(index.search(&search(1)).await.expect("search").len(), 1);
    }

    #[tokio::test]
    async fn embedder_failure_surfaces_as_embedding_error() {
        let index = index_with(Arc::new(DownEmbedder)).await;
        let error = index.search(&search(5)).await.expect_err("embedder is down");
        assert!(matches!(error, RepositoryError::Embedding(EmbeddingError::Unavailable(_))));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_reported() {
        let index = index_with(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0]))).await;
        let error = index.search(&search(5)).await.expect_err("dimension mismatch");
        assert!(matches!(
            error,
            RepositoryError::Embedding(EmbeddingError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn import_rejects_mismatched_detail() {
        let index = index_with(Arc::new(FixedEmbedder(vec![1.0, 0.0]))).await;
        let mut record = policy_chunk(vec![1.0, 0.0]);
        record.chunk.document_type = DocumentType::Article;
        assert!(index.import(&record).await.is_err());
        assert_eq!(index.chunk_count().await.expect("count"), 3);
    }

    #[tokio::test]
    async fn import_rejects_embeddings_of_another_dimension() {
        let index = index_with(Arc::new(FixedEmbedder(vec![1.0, 0.0]))).await;
        let record = repair_chunk("fridge-fan", ApplianceCategory::Refrigerator, vec![1.0, 0.0, 0.0]);

        let error = index.import(&record).await.expect_err("dimension mismatch");
        assert!(matches!(
            error,
            RepositoryError::Embedding(EmbeddingError::ChunkDimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            })
        ));
        assert_eq!(index.embedding_dimension().await.expect("dimension"), Some(2));
        assert_eq!(index.chunk_count().await.expect("count"), 3);
    }

    #[tokio::test]
    async fn batch_import_is_all_or_nothing() {
        let index = index_with(Arc::new(FixedEmbedder(vec![1.0, 0.0]))).await;
        let batch = [
            repair_chunk("fridge-fan", ApplianceCategory::Refrigerator, vec![0.8, 0.6]),
            repair_chunk("dish-pump", ApplianceCategory::Dishwasher, vec![0.0]),
        ];

        assert!(index.import_all(&batch).await.is_err());
        assert_eq!(index.chunk_count().await.expect("count"), 3, "first record rolled back");

        index.import_all(&batch[..1]).await.expect("valid batch");
        assert_eq!(index.chunk_count().await.expect("count"), 4);
    }
}
