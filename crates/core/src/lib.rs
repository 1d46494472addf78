//! Domain types, configuration, error taxonomy and audit events shared by the
//! PartSage crates.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use domain::catalog::{
    CatalogField, CatalogQuery, CatalogQueryError, CatalogResult, CatalogTarget, FilterOp,
    FilterValue, ItemField, ModelField, SortDirection,
};
pub use domain::content::{
    ChunkDetail, ContentChunk, ContentSearch, DocumentType, RelevanceScore, ScoredChunk,
};
pub use domain::conversation::{ConversationHistory, Query, Role, Turn};
pub use domain::item::{
    ApplianceCategory, ApplianceModel, CompatibilityEdge, Item, ItemId, ItemSummary,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
