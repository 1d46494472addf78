use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

use partsage_core::domain::catalog::{
    CatalogField, CatalogQuery, CatalogQueryError, CatalogTarget, FieldKind, FilterOp,
    FilterValue, SortDirection, DEFAULT_RESULT_CAP, MAX_RESULT_CAP,
};
use partsage_core::domain::item::ApplianceCategory;
use partsage_db::CatalogRepository;

use super::{Tool, ToolErrorKind, ToolFailure, ToolPayload};
use crate::schema::{Overflow, ParamKind, ParamSpec, ToolSchema};

pub const TOOL_NAME: &str = "catalog_search";

const MAX_FILTERS: usize = 8;
const STORE_RETRY_DELAY: Duration = Duration::from_millis(100);
const BACKEND_UNAVAILABLE_MESSAGE: &str =
    "The parts catalog is temporarily unavailable. Try again or answer from other results.";

const DESCRIPTION: &str = "Look up refrigerator and dishwasher parts and appliance models in the store catalog. \
Filters apply to whitelisted fields only. Item fields: id, name, manufacturer_part_number, brand, category, \
current_price, original_price, rating, review_count, in_stock, description, symptoms, installation_difficulty. \
Model fields: model_number, brand, category, description. Operators: eq (any field), contains (name, description, \
symptoms, brand, manufacturer_part_number, model description; at least 2 characters), gte/lte (numeric fields). \
Sortable: current_price, original_price, rating, review_count, name for items; model_number, brand for models.";

const USAGE: &str = "Use when the user names a part number (PS...), a manufacturer part number, or a model number, \
asks about price, rating, stock or availability, or asks which parts fit a model (target=items with \
compatible_with=<model number>) or which models a part fits (target=models with compatible_with=<part id>). \
Do not use for repair instructions, troubleshooting explanations or store policies; use knowledge_search for those.";

/// Whitelisted, read-only catalog lookup. The oracle never authors query text;
/// arguments are turned into a typed [`CatalogQuery`] rendered by the repository.
pub struct StructuredQueryTool {
    repository: Arc<dyn CatalogRepository>,
    schema: ToolSchema,
}

impl StructuredQueryTool {
    pub fn new(repository: Arc<dyn CatalogRepository>) -> Self {
        Self::with_result_caps(repository, DEFAULT_RESULT_CAP, MAX_RESULT_CAP)
    }

    pub fn with_result_caps(
        repository: Arc<dyn CatalogRepository>,
        default_cap: u32,
        max_cap: u32,
    ) -> Self {
        let max_cap = max_cap.clamp(1, MAX_RESULT_CAP);
        let default_cap = default_cap.clamp(1, max_cap);
        Self { repository, schema: schema(default_cap, max_cap) }
    }

    async fn run_query(&self, query: &CatalogQuery) -> Result<ToolPayload, ToolFailure> {
        match self.repository.query(query).await {
            Ok(result) => return Ok(ToolPayload::Catalog(result)),
            Err(error) => {
                warn!(
                    event_name = "agent.tool.catalog_retry",
                    error = %error,
                    "catalog query failed, retrying once"
                );
            }
        }

        tokio::time::sleep(STORE_RETRY_DELAY).await;
        self.repository.query(query).await.map(ToolPayload::Catalog).map_err(|error| {
            warn!(
                event_name = "agent.tool.catalog_unavailable",
                error = %error,
                "catalog query failed after retry"
            );
            ToolFailure::new(ToolErrorKind::BackendUnavailable, BACKEND_UNAVAILABLE_MESSAGE)
        })
    }
}

fn schema(default_cap: u32, max_cap: u32) -> ToolSchema {
    ToolSchema {
        name: TOOL_NAME,
        description: DESCRIPTION,
        usage: USAGE,
        params: vec![
            ParamSpec::optional(
                "target",
                "What to return: parts (items) or appliance models.",
                ParamKind::Choice { values: &["items", "models"], default: Some("items") },
            ),
            ParamSpec::optional(
                "filters",
                "Field filters, combined with AND.",
                ParamKind::List {
                    item: Box::new(ParamKind::Object {
                        fields: vec![
                            ParamSpec::required(
                                "field",
                                "Whitelisted field name.",
                                ParamKind::Text { min_len: 1, max_len: 64 },
                            ),
                            ParamSpec::optional(
                                "op",
                                "Comparison operator.",
                                ParamKind::Choice {
                                    values: &["eq", "contains", "gte", "lte"],
                                    default: Some("eq"),
                                },
                            ),
                            ParamSpec::required("value", "Value to compare against.", ParamKind::Scalar),
                        ],
                    }),
                    max_items: MAX_FILTERS,
                },
            ),
            ParamSpec::optional(
                "compatible_with",
                "Model number (target=items) or part id (target=models) to join on compatibility.",
                ParamKind::Text { min_len: 1, max_len: 64 },
            ),
            ParamSpec::optional(
                "order_by",
                "Sort by a sortable field.",
                ParamKind::Object {
                    fields: vec![
                        ParamSpec::required(
                            "field",
                            "Sortable field name.",
                            ParamKind::Text { min_len: 1, max_len: 64 },
                        ),
                        ParamSpec::optional(
                            "direction",
                            "Sort direction.",
                            ParamKind::Choice { values: &["asc", "desc"], default: Some("asc") },
                        ),
                    ],
                },
            ),
            ParamSpec::optional(
                "limit",
                "Maximum rows to return.",
                ParamKind::Integer {
                    min: 1,
                    max: i64::from(max_cap),
                    default: Some(i64::from(default_cap)),
                    overflow: Overflow::Clamp,
                },
            ),
        ],
    }
}

#[async_trait]
impl Tool for StructuredQueryTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn invoke(&self, arguments: &Value) -> Result<ToolPayload, ToolFailure> {
        let query = build_query(arguments)?;
        query.validate().map_err(query_failure)?;
        self.run_query(&query).await
    }
}

fn query_failure(error: CatalogQueryError) -> ToolFailure {
    match error {
        CatalogQueryError::InvalidField(message) => {
            ToolFailure::new(ToolErrorKind::InvalidField, message)
        }
        CatalogQueryError::QueryTooBroad(message) => {
            ToolFailure::new(ToolErrorKind::QueryTooBroad, message)
        }
    }
}

fn invalid_field(message: impl Into<String>) -> ToolFailure {
    ToolFailure::new(ToolErrorKind::InvalidField, message)
}

fn build_query(arguments: &Value) -> Result<CatalogQuery, ToolFailure> {
    let target = match arguments.get("target").and_then(Value::as_str) {
        Some("models") => CatalogTarget::Models,
        _ => CatalogTarget::Items,
    };
    let mut query = match target {
        CatalogTarget::Items => CatalogQuery::items(),
        CatalogTarget::Models => CatalogQuery::models(),
    };

    for filter in arguments.get("filters").and_then(Value::as_array).into_iter().flatten() {
        let field = parse_field(target, filter.get("field"))?;
        let op = filter
            .get("op")
            .and_then(Value::as_str)
            .and_then(FilterOp::parse)
            .unwrap_or(FilterOp::Eq);
        let value = filter_value(field, filter.get("value").unwrap_or(&Value::Null))?;
        query = query.filter(field, op, value);
    }

    if let Some(key) = arguments.get("compatible_with").and_then(Value::as_str) {
        query = query.compatible_with(key);
    }

    if let Some(order) = arguments.get("order_by") {
        let field = parse_field(target, order.get("field"))?;
        let direction = match order.get("direction").and_then(Value::as_str) {
            Some("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        };
        query = query.order_by(field, direction);
    }

    if let Some(limit) = arguments.get("limit").and_then(Value::as_u64) {
        query = query.limit(u32::try_from(limit).unwrap_or(MAX_RESULT_CAP));
    }

    Ok(query)
}

fn parse_field(target: CatalogTarget, raw: Option<&Value>) -> Result<CatalogField, ToolFailure> {
    let name = raw.and_then(Value::as_str).unwrap_or_default();
    CatalogField::parse(target, name).ok_or_else(|| {
        invalid_field(format!("`{name}` is not a readable field on {}", target.as_str()))
    })
}

fn filter_value(field: CatalogField, raw: &Value) -> Result<FilterValue, ToolFailure> {
    let mismatch = || invalid_field(format!("value `{raw}` does not fit field `{field}`"));

    match field.kind() {
        FieldKind::Exact | FieldKind::FreeText => match raw {
            Value::String(text) => Ok(FilterValue::Text(text.trim().to_string())),
            Value::Number(number) => Ok(FilterValue::Text(number.to_string())),
            _ => Err(mismatch()),
        },
        FieldKind::Numeric => {
            let text = match raw {
                Value::Number(number) => number.to_string(),
                Value::String(text) => text.trim().trim_start_matches('$').to_string(),
                _ => return Err(mismatch()),
            };
            Decimal::from_str(&text).map(FilterValue::Number).map_err(|_| mismatch())
        }
        FieldKind::Boolean => match raw {
            Value::Bool(flag) => Ok(FilterValue::Bool(*flag)),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(FilterValue::Bool(true)),
                "false" | "no" => Ok(FilterValue::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        FieldKind::Category => {
            let text = raw.as_str().ok_or_else(mismatch)?;
            let category = match text.trim().to_ascii_lowercase().as_str() {
                "fridge" | "freezer" => Some(ApplianceCategory::Refrigerator),
                "dish washer" => Some(ApplianceCategory::Dishwasher),
                other => ApplianceCategory::parse(other),
            };
            category.map(FilterValue::Category).ok_or_else(mismatch)
        }
    }
}
