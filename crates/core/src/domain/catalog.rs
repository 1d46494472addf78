//! Typed, whitelisted query object for the parts catalog.
//!
//! Oracle output never reaches the store as text. Tool arguments are parsed
//! into a [`CatalogQuery`], checked with [`CatalogQuery::validate`], and only
//! then rendered by a repository using bound parameters.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::item::{ApplianceCategory, ApplianceModel, Item};

pub const DEFAULT_RESULT_CAP: u32 = 10;
pub const MAX_RESULT_CAP: u32 = 50;
pub const MIN_CONTAINS_LEN: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogTarget {
    Items,
    Models,
}

impl CatalogTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::Models => "models",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Identifiers and short labels: equality only.
    Exact,
    /// Free text: equality or substring match.
    FreeText,
    Numeric,
    Boolean,
    Category,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemField {
    Id,
    Name,
    ManufacturerPartNumber,
    Brand,
    Category,
    CurrentPrice,
    OriginalPrice,
    Rating,
    ReviewCount,
    InStock,
    Description,
    Symptoms,
    InstallationDifficulty,
}

impl ItemField {
    pub const ALL: [ItemField; 13] = [
        ItemField::Id,
        ItemField::Name,
        ItemField::ManufacturerPartNumber,
        ItemField::Brand,
        ItemField::Category,
        ItemField::CurrentPrice,
        ItemField::OriginalPrice,
        ItemField::Rating,
        ItemField::ReviewCount,
        ItemField::InStock,
        ItemField::Description,
        ItemField::Symptoms,
        ItemField::InstallationDifficulty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::ManufacturerPartNumber => "manufacturer_part_number",
            Self::Brand => "brand",
            Self::Category => "category",
            Self::CurrentPrice => "current_price",
            Self::OriginalPrice => "original_price",
            Self::Rating => "rating",
            Self::ReviewCount => "review_count",
            Self::InStock => "in_stock",
            Self::Description => "description",
            Self::Symptoms => "symptoms",
            Self::InstallationDifficulty => "installation_difficulty",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Id | Self::InstallationDifficulty => FieldKind::Exact,
            Self::Name
            | Self::ManufacturerPartNumber
            | Self::Brand
            | Self::Description
            | Self::Symptoms => FieldKind::FreeText,
            Self::CurrentPrice | Self::OriginalPrice | Self::Rating | Self::ReviewCount => {
                FieldKind::Numeric
            }
            Self::InStock => FieldKind::Boolean,
            Self::Category => FieldKind::Category,
        }
    }

    pub fn sortable(&self) -> bool {
        matches!(
            self,
            Self::CurrentPrice | Self::OriginalPrice | Self::Rating | Self::ReviewCount | Self::Name
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelField {
    ModelNumber,
    Brand,
    Category,
    Description,
}

impl ModelField {
    pub const ALL: [ModelField; 4] =
        [ModelField::ModelNumber, ModelField::Brand, ModelField::Category, ModelField::Description];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelNumber => "model_number",
            Self::Brand => "brand",
            Self::Category => "category",
            Self::Description => "description",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::ModelNumber | Self::Brand | Self::Description => FieldKind::FreeText,
            Self::Category => FieldKind::Category,
        }
    }

    pub fn sortable(&self) -> bool {
        matches!(self, Self::ModelNumber | Self::Brand)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogField {
    Item(ItemField),
    Model(ModelField),
}

impl CatalogField {
    pub fn parse(target: CatalogTarget, raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match target {
            CatalogTarget::Items => ItemField::ALL
                .into_iter()
                .find(|field| field.as_str() == normalized)
                .map(Self::Item),
            CatalogTarget::Models => ModelField::ALL
                .into_iter()
                .find(|field| field.as_str() == normalized)
                .map(Self::Model),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Item(field) => field.kind(),
            Self::Model(field) => field.kind(),
        }
    }

    pub fn sortable(&self) -> bool {
        match self {
            Self::Item(field) => field.sortable(),
            Self::Model(field) => field.sortable(),
        }
    }

    pub fn target(&self) -> CatalogTarget {
        match self {
            Self::Item(_) => CatalogTarget::Items,
            Self::Model(_) => CatalogTarget::Models,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Item(field) => field.as_str(),
            Self::Model(field) => field.as_str(),
        }
    }
}

impl fmt::Display for CatalogField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Contains,
    Gte,
    Lte,
}

impl FilterOp {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "contains" => Some(Self::Contains),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Contains => "contains",
            Self::Gte => "gte",
            Self::Lte => "lte",
        }
    }

    fn allowed_for(&self, kind: FieldKind) -> bool {
        match self {
            Self::Eq => true,
            Self::Contains => kind == FieldKind::FreeText,
            Self::Gte | Self::Lte => kind == FieldKind::Numeric,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterValue {
    Text(String),
    Number(Decimal),
    Bool(bool),
    Category(ApplianceCategory),
}

impl FilterValue {
    fn fits(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (Self::Text(_), FieldKind::Exact | FieldKind::FreeText)
                | (Self::Number(_), FieldKind::Numeric)
                | (Self::Bool(_), FieldKind::Boolean)
                | (Self::Category(_), FieldKind::Category)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: CatalogField,
    pub op: FilterOp,
    pub value: FilterValue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: CatalogField,
    pub direction: SortDirection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub target: CatalogTarget,
    pub filters: Vec<FieldFilter>,
    /// Join across the compatibility relation: a model number when targeting
    /// items, an item id when targeting models.
    pub compatible_with: Option<String>,
    pub order_by: Option<OrderBy>,
    pub limit: u32,
}

impl CatalogQuery {
    pub fn items() -> Self {
        Self {
            target: CatalogTarget::Items,
            filters: Vec::new(),
            compatible_with: None,
            order_by: None,
            limit: DEFAULT_RESULT_CAP,
        }
    }

    pub fn models() -> Self {
        Self { target: CatalogTarget::Models, ..Self::items() }
    }

    pub fn filter(mut self, field: CatalogField, op: FilterOp, value: FilterValue) -> Self {
        self.filters.push(FieldFilter { field, op, value });
        self
    }

    pub fn compatible_with(mut self, key: impl Into<String>) -> Self {
        self.compatible_with = Some(key.into());
        self
    }

    pub fn order_by(mut self, field: CatalogField, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy { field, direction });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn validate(&self) -> Result<(), CatalogQueryError> {
        for filter in &self.filters {
            if filter.field.target() != self.target {
                return Err(CatalogQueryError::InvalidField(format!(
                    "field `{}` is not readable on {}",
                    filter.field,
                    self.target.as_str()
                )));
            }
            let kind = filter.field.kind();
            if !filter.op.allowed_for(kind) {
                return Err(CatalogQueryError::InvalidField(format!(
                    "operator `{}` is not supported on field `{}`",
                    filter.op.as_str(),
                    filter.field
                )));
            }
            if !filter.value.fits(kind) {
                return Err(CatalogQueryError::InvalidField(format!(
                    "value type does not match field `{}`",
                    filter.field
                )));
            }
            if let (FilterOp::Contains, FilterValue::Text(text)) = (filter.op, &filter.value) {
                if text.trim().chars().count() < MIN_CONTAINS_LEN {
                    return Err(CatalogQueryError::QueryTooBroad(format!(
                        "substring match on `{}` needs at least {MIN_CONTAINS_LEN} characters",
                        filter.field
                    )));
                }
            }
        }

        if let Some(order) = &self.order_by {
            if order.field.target() != self.target || !order.field.sortable() {
                return Err(CatalogQueryError::InvalidField(format!(
                    "field `{}` is not sortable on {}",
                    order.field,
                    self.target.as_str()
                )));
            }
        }

        if let Some(key) = &self.compatible_with {
            if key.trim().is_empty() {
                return Err(CatalogQueryError::InvalidField(
                    "compatible_with must not be empty".to_string(),
                ));
            }
        }

        if self.filters.is_empty() && self.compatible_with.is_none() && self.order_by.is_none() {
            return Err(CatalogQueryError::QueryTooBroad(
                "add at least one filter, a compatibility join, or an ordering".to_string(),
            ));
        }

        if self.limit == 0 || self.limit > MAX_RESULT_CAP {
            return Err(CatalogQueryError::InvalidField(format!(
                "limit must be in range 1..={MAX_RESULT_CAP}"
            )));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogQueryError {
    #[error("invalid field: {0}")]
    InvalidField(String),
    #[error("query too broad: {0}")]
    QueryTooBroad(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogResult {
    pub items: Vec<Item>,
    pub models: Vec<ApplianceModel>,
}

impl CatalogResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len() + self.models.len()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        CatalogField, CatalogQuery, CatalogQueryError, CatalogTarget, FilterOp, FilterValue,
        ItemField, ModelField, SortDirection,
    };

    #[test]
    fn identifier_lookup_is_valid() {
        let query = CatalogQuery::items().filter(
            CatalogField::Item(ItemField::Id),
            FilterOp::Eq,
            FilterValue::Text("PS11752778".to_string()),
        );
        assert_eq!(query.validate(), Ok(()));
    }

    #[test]
    fn unconstrained_scan_is_too_broad() {
        let error = CatalogQuery::items().validate().expect_err("scan should be rejected");
        assert!(matches!(error, CatalogQueryError::QueryTooBroad(_)));
    }

    #[test]
    fn ordering_alone_is_enough_to_bound_a_query() {
        let query = CatalogQuery::items()
            .order_by(CatalogField::Item(ItemField::Rating), SortDirection::Desc)
            .limit(5);
        assert_eq!(query.validate(), Ok(()));
    }

    #[test]
    fn range_operator_on_text_field_is_rejected() {
        let query = CatalogQuery::items().filter(
            CatalogField::Item(ItemField::Brand),
            FilterOp::Gte,
            FilterValue::Text("GE".to_string()),
        );
        assert!(matches!(query.validate(), Err(CatalogQueryError::InvalidField(_))));
    }

    #[test]
    fn model_field_on_item_query_is_rejected() {
        let query = CatalogQuery::items().filter(
            CatalogField::Model(ModelField::ModelNumber),
            FilterOp::Eq,
            FilterValue::Text("WDT780SAEM1".to_string()),
        );
        assert!(matches!(query.validate(), Err(CatalogQueryError::InvalidField(_))));
    }

    #[test]
    fn one_character_substring_is_too_broad() {
        let query = CatalogQuery::items().filter(
            CatalogField::Item(ItemField::Name),
            FilterOp::Contains,
            FilterValue::Text("a".to_string()),
        );
        assert!(matches!(query.validate(), Err(CatalogQueryError::QueryTooBroad(_))));
    }

    #[test]
    fn numeric_range_filter_is_valid() {
        let query = CatalogQuery::items()
            .filter(
                CatalogField::Item(ItemField::CurrentPrice),
                FilterOp::Lte,
                FilterValue::Number(Decimal::new(5000, 2)),
            )
            .limit(50);
        assert_eq!(query.validate(), Ok(()));
    }

    #[test]
    fn field_names_parse_per_target() {
        assert_eq!(
            CatalogField::parse(CatalogTarget::Models, "MODEL_NUMBER"),
            Some(CatalogField::Model(ModelField::ModelNumber))
        );
        assert_eq!(CatalogField::parse(CatalogTarget::Items, "model_number"), None);
        assert_eq!(CatalogField::parse(CatalogTarget::Items, "part_id; drop table"), None);
    }
}
