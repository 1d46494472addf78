use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use partsage_core::domain::catalog::{
    CatalogField, CatalogQuery, CatalogResult, CatalogTarget, FieldFilter, FilterOp, FilterValue,
    ItemField, ModelField, SortDirection,
};
use partsage_core::domain::content::{cosine_similarity, ContentSearch, ScoredChunk};
use partsage_core::domain::item::{ApplianceModel, CompatibilityEdge, Item, ItemId};

use super::{
    rank_chunks, CatalogRepository, CatalogWriter, ContentIndex, EmbeddedChunk, QueryEmbedder,
    RepositoryError,
};

/// Catalog held in process. Keys are upper-cased so lookups ignore case the
/// same way the SQLite repository does.
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    items: RwLock<BTreeMap<String, Item>>,
    models: RwLock<BTreeMap<String, ApplianceModel>>,
    edges: RwLock<BTreeSet<(String, String)>>,
}

fn key(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

enum FieldValue<'a> {
    Text(&'a str),
    TextList(&'a [String]),
    Number(Option<Decimal>),
    Bool(bool),
    Category(&'a str),
    Missing,
}

fn item_value(item: &Item, field: ItemField) -> FieldValue<'_> {
    match field {
        ItemField::Id => FieldValue::Text(item.id.as_str()),
        ItemField::Name => FieldValue::Text(&item.name),
        ItemField::ManufacturerPartNumber => FieldValue::Text(&item.manufacturer_part_number),
        ItemField::Brand => FieldValue::Text(&item.brand),
        ItemField::Category => FieldValue::Category(item.category.as_str()),
        ItemField::CurrentPrice => FieldValue::Number(Some(item.current_price)),
        ItemField::OriginalPrice => FieldValue::Number(Some(item.original_price)),
        ItemField::Rating => FieldValue::Number(item.rating),
        ItemField::ReviewCount => FieldValue::Number(Some(Decimal::from(item.review_count))),
        ItemField::InStock => FieldValue::Bool(item.in_stock),
        ItemField::Description => FieldValue::Text(&item.description),
        ItemField::Symptoms => FieldValue::TextList(&item.symptoms),
        ItemField::InstallationDifficulty => match &item.installation_difficulty {
            Some(value) => FieldValue::Text(value),
            None => FieldValue::Missing,
        },
    }
}

fn model_value(model: &ApplianceModel, field: ModelField) -> FieldValue<'_> {
    match field {
        ModelField::ModelNumber => FieldValue::Text(&model.model_number),
        ModelField::Brand => FieldValue::Text(&model.brand),
        ModelField::Category => FieldValue::Category(model.category.as_str()),
        ModelField::Description => FieldValue::Text(&model.description),
    }
}

fn matches(value: FieldValue<'_>, filter: &FieldFilter) -> bool {
    match (value, &filter.value) {
        (FieldValue::Text(actual), FilterValue::Text(wanted)) => match filter.op {
            FilterOp::Contains => {
                actual.to_lowercase().contains(&wanted.trim().to_lowercase())
            }
            _ => actual.eq_ignore_ascii_case(wanted.trim()),
        },
        (FieldValue::TextList(values), FilterValue::Text(wanted)) => {
            let wanted = wanted.trim().to_lowercase();
            values.iter().any(|value| match filter.op {
                FilterOp::Contains => value.to_lowercase().contains(&wanted),
                _ => value.to_lowercase() == wanted,
            })
        }
        (FieldValue::Number(Some(actual)), FilterValue::Number(wanted)) => match filter.op {
            FilterOp::Gte => actual >= *wanted,
            FilterOp::Lte => actual <= *wanted,
            _ => actual == *wanted,
        },
        (FieldValue::Bool(actual), FilterValue::Bool(wanted)) => actual == *wanted,
        (FieldValue::Category(actual), FilterValue::Category(wanted)) => {
            actual == wanted.as_str()
        }
        _ => false,
    }
}

fn compare_items(left: &Item, right: &Item, query: &CatalogQuery) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let Some(order) = &query.order_by else {
        // rating desc with missing last, then review count desc
        return match (left.rating, right.rating) {
            (Some(l), Some(r)) => r.cmp(&l),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| right.review_count.cmp(&left.review_count))
        .then_with(|| left.id.cmp(&right.id));
    };

    let CatalogField::Item(field) = order.field else {
        return left.id.cmp(&right.id);
    };
    let ordering = match (item_value(left, field), item_value(right, field)) {
        (FieldValue::Number(l), FieldValue::Number(r)) => match (l, r) {
            (Some(l), Some(r)) => directed(l.cmp(&r), order.direction),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        (FieldValue::Text(l), FieldValue::Text(r)) => {
            directed(l.to_lowercase().cmp(&r.to_lowercase()), order.direction)
        }
        _ => Ordering::Equal,
    };
    ordering.then_with(|| left.id.cmp(&right.id))
}

fn compare_models(
    left: &ApplianceModel,
    right: &ApplianceModel,
    query: &CatalogQuery,
) -> std::cmp::Ordering {
    let tie_break = left.model_number.cmp(&right.model_number);
    match &query.order_by {
        Some(order) => match order.field {
            CatalogField::Model(ModelField::Brand) => directed(
                left.brand.to_lowercase().cmp(&right.brand.to_lowercase()),
                order.direction,
            )
            .then(tie_break),
            _ => directed(tie_break, order.direction),
        },
        None => tie_break,
    }
}

fn directed(ordering: std::cmp::Ordering, direction: SortDirection) -> std::cmp::Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn query(&self, query: &CatalogQuery) -> Result<CatalogResult, RepositoryError> {
        let edges = self.edges.read().await;
        let limit = query.limit as usize;

        match query.target {
            CatalogTarget::Items => {
                let items = self.items.read().await;
                let mut selected = items
                    .iter()
                    .filter(|(item_key, _)| match &query.compatible_with {
                        Some(model) => edges.contains(&((*item_key).clone(), key(model))),
                        None => true,
                    })
                    .map(|(_, item)| item)
                    .filter(|item| {
                        query.filters.iter().all(|filter| match filter.field {
                            CatalogField::Item(field) => matches(item_value(item, field), filter),
                            CatalogField::Model(_) => false,
                        })
                    })
                    .cloned()
                    .collect::<Vec<_>>();
                selected.sort_by(|left, right| compare_items(left, right, query));
                selected.truncate(limit);
                Ok(CatalogResult { items: selected, models: Vec::new() })
            }
            CatalogTarget::Models => {
                let models = self.models.read().await;
                let mut selected = models
                    .iter()
                    .filter(|(model_key, _)| match &query.compatible_with {
                        Some(item) => edges.contains(&(key(item), (*model_key).clone())),
                        None => true,
                    })
                    .map(|(_, model)| model)
                    .filter(|model| {
                        query.filters.iter().all(|filter| match filter.field {
                            CatalogField::Model(field) => {
                                matches(model_value(model, field), filter)
                            }
                            CatalogField::Item(_) => false,
                        })
                    })
                    .cloned()
                    .collect::<Vec<_>>();
                selected.sort_by(|left, right| compare_models(left, right, query));
                selected.truncate(limit);
                Ok(CatalogResult { items: Vec::new(), models: selected })
            }
        }
    }

    async fn find_item(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError> {
        let items = self.items.read().await;
        Ok(items.get(&key(id.as_str())).cloned())
    }

    async fn compatible_models(
        &self,
        id: &ItemId,
        limit: u32,
    ) -> Result<Vec<String>, RepositoryError> {
        let item_key = key(id.as_str());
        let edges = self.edges.read().await;
        let models = self.models.read().await;
        Ok(edges
            .iter()
            .filter(|(part, _)| *part == item_key)
            .filter_map(|(_, model)| models.get(model).map(|found| found.model_number.clone()))
            .take(limit as usize)
            .collect())
    }
}

#[async_trait::async_trait]
impl CatalogWriter for InMemoryCatalogRepository {
    async fn save_item(&self, item: Item) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        items.insert(key(item.id.as_str()), item);
        Ok(())
    }

    async fn save_model(&self, model: ApplianceModel) -> Result<(), RepositoryError> {
        let mut models = self.models.write().await;
        models.insert(key(&model.model_number), model);
        Ok(())
    }

    async fn link(&self, edge: CompatibilityEdge) -> Result<(), RepositoryError> {
        let mut edges = self.edges.write().await;
        edges.insert((key(edge.item_id.as_str()), key(&edge.model_number)));
        Ok(())
    }
}

pub struct InMemoryContentIndex {
    chunks: RwLock<Vec<EmbeddedChunk>>,
    embedder: Arc<dyn QueryEmbedder>,
}

impl InMemoryContentIndex {
    pub fn new(embedder: Arc<dyn QueryEmbedder>) -> Self {
        Self { chunks: RwLock::new(Vec::new()), embedder }
    }

    pub async fn insert(&self, record: EmbeddedChunk) {
        let mut chunks = self.chunks.write().await;
        chunks.retain(|existing| existing.chunk.chunk_id != record.chunk.chunk_id);
        chunks.push(record);
    }
}

#[async_trait::async_trait]
impl ContentIndex for InMemoryContentIndex {
    async fn search(&self, search: &ContentSearch) -> Result<Vec<ScoredChunk>, RepositoryError> {
        let query_vector = self.embedder.embed(&search.query_text).await?;
        let chunks = self.chunks.read().await;
        let scored = chunks
            .iter()
            .filter(|record| search.matches(&record.chunk))
            .filter_map(|record| {
                cosine_similarity(&query_vector, &record.embedding)
                    .map(|cosine| (cosine, record.chunk.clone()))
            })
            .collect();
        Ok(rank_chunks(scored, search.top_k))
    }

    async fn chunk_count(&self) -> Result<u64, RepositoryError> {
        Ok(self.chunks.read().await.len() as u64)
    }
}
