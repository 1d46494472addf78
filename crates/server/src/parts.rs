use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use partsage_core::domain::item::{Item, ItemId};
use partsage_core::errors::InterfaceError;
use partsage_db::CatalogRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::api::ApiError;

pub const MAX_COMPATIBLE_MODELS: u32 = 10;

#[derive(Clone)]
pub struct PartsState {
    catalog: Arc<dyn CatalogRepository>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartDetail {
    #[serde(flatten)]
    pub item: Item,
    pub compatible_models: Vec<String>,
}

pub fn router(catalog: Arc<dyn CatalogRepository>) -> Router {
    Router::new().route("/api/part/{part_id}", get(part_detail)).with_state(PartsState { catalog })
}

pub async fn part_detail(
    Path(part_id): Path<String>,
    State(state): State<PartsState>,
) -> Result<Json<PartDetail>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let unavailable = |error: partsage_db::RepositoryError| InterfaceError::ServiceUnavailable {
        message: error.to_string(),
        correlation_id: correlation_id.clone(),
    };

    let id = ItemId(part_id.trim().to_string());
    let item = state.catalog.find_item(&id).await.map_err(unavailable)?.ok_or_else(|| {
        InterfaceError::NotFound {
            message: format!("part `{}` is not in the catalog", id.as_str()),
            correlation_id: correlation_id.clone(),
        }
    })?;
    let compatible_models = state
        .catalog
        .compatible_models(&item.id, MAX_COMPATIBLE_MODELS)
        .await
        .map_err(unavailable)?;

    Ok(Json(PartDetail { item, compatible_models }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use partsage_core::errors::InterfaceError;
    use partsage_db::{seed_demo_catalog, InMemoryCatalogRepository};

    use super::{part_detail, PartsState};

    async fn state() -> State<PartsState> {
        let repository = InMemoryCatalogRepository::default();
        seed_demo_catalog(&repository).await.expect("seed");
        State(PartsState { catalog: Arc::new(repository) })
    }

    #[tokio::test]
    async fn known_part_returns_detail_and_models() {
        let detail = part_detail(Path(" PS11756150 ".to_string()), state().await)
            .await
            .expect("detail")
            .0;

        assert_eq!(detail.item.id.as_str(), "PS11756150");
        assert_eq!(detail.compatible_models, vec!["WDT780SAEM1".to_string()]);
    }

    #[tokio::test]
    async fn unknown_part_maps_to_not_found() {
        let error = part_detail(Path("PS404".to_string()), state().await)
            .await
            .expect_err("missing part");
        assert!(matches!(error.0, InterfaceError::NotFound { .. }));
    }
}
