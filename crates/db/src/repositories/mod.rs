use async_trait::async_trait;
use thiserror::Error;

use partsage_core::domain::catalog::{CatalogQuery, CatalogResult};
use partsage_core::domain::content::{ContentChunk, ContentSearch, RelevanceScore, ScoredChunk};
use partsage_core::domain::item::{ApplianceModel, CompatibilityEdge, Item, ItemId};

pub mod catalog;
pub mod content;
pub mod memory;

pub use catalog::SqlCatalogRepository;
pub use content::SqlContentIndex;
pub use memory::{InMemoryCatalogRepository, InMemoryContentIndex};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("embedding service unreachable: {0}")]
    Unavailable(String),
    #[error("embedding service returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("chunk `{chunk_id}` has {actual} embedding dimensions, index has {expected}")]
    ChunkDimensionMismatch { chunk_id: String, expected: usize, actual: usize },
}

/// Read-only query surface over parts, appliance models and compatibility.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Runs a validated query. Callers validate first; implementations only
    /// render the typed query with bound parameters.
    async fn query(&self, query: &CatalogQuery) -> Result<CatalogResult, RepositoryError>;

    async fn find_item(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError>;

    async fn compatible_models(
        &self,
        id: &ItemId,
        limit: u32,
    ) -> Result<Vec<String>, RepositoryError>;
}

/// Write side used by seeding and imports. Never handed to the agent.
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    async fn save_item(&self, item: Item) -> Result<(), RepositoryError>;
    async fn save_model(&self, model: ApplianceModel) -> Result<(), RepositoryError>;
    async fn link(&self, edge: CompatibilityEdge) -> Result<(), RepositoryError>;
}

/// Turns query text into a vector in the same space as the indexed chunks.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[async_trait]
pub trait ContentIndex: Send + Sync {
    /// Returns at most `search.top_k` chunks passing the metadata filters, in
    /// descending relevance with ranks starting at 1.
    async fn search(&self, search: &ContentSearch) -> Result<Vec<ScoredChunk>, RepositoryError>;

    async fn chunk_count(&self) -> Result<u64, RepositoryError>;
}

/// Chunk plus its pre-computed embedding, as produced by the offline pipeline.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EmbeddedChunk {
    #[serde(flatten)]
    pub chunk: ContentChunk,
    pub embedding: Vec<f32>,
}

pub(crate) fn rank_chunks(mut scored: Vec<(f32, ContentChunk)>, top_k: u32) -> Vec<ScoredChunk> {
    scored.sort_by(|(left_score, left), (right_score, right)| {
        right_score
            .partial_cmp(left_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| left.chunk_id.cmp(&right.chunk_id))
    });
    scored
        .into_iter()
        .take(top_k as usize)
        .enumerate()
        .map(|(index, (cosine, chunk))| ScoredChunk {
            rank: index as u32 + 1,
            score: RelevanceScore::from_cosine(cosine),
            chunk,
        })
        .collect()
}
