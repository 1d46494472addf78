pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, ping, DbPool};
pub use fixtures::{seed_demo_catalog, SeedResult};
pub use repositories::{
    CatalogRepository, CatalogWriter, ContentIndex, EmbeddedChunk, EmbeddingError,
    InMemoryCatalogRepository, InMemoryContentIndex, QueryEmbedder, RepositoryError,
    SqlCatalogRepository, SqlContentIndex,
};
