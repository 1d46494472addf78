use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use partsage_core::domain::content::{ContentSearch, DocumentType};
use partsage_core::domain::item::ApplianceCategory;
use partsage_db::ContentIndex;

use super::{Tool, ToolErrorKind, ToolFailure, ToolPayload};
use crate::schema::{Overflow, ParamKind, ParamSpec, ToolSchema};

pub const TOOL_NAME: &str = "knowledge_search";

pub const MIN_QUERY_CHARS: usize = 3;
pub const MAX_QUERY_CHARS: usize = 500;
pub const DEFAULT_TOP_K: u32 = 5;
pub const MAX_TOP_K: u32 = 20;

const BACKEND_UNAVAILABLE_MESSAGE: &str =
    "The repair and policy library is temporarily unavailable. Try again or answer from other results.";

const DESCRIPTION: &str = "Semantic search over repair guides, how-to articles and store policies \
for refrigerators and dishwashers. Results come back in descending relevance; repair results may carry \
a linked_item_id that can be priced with catalog_search.";

const USAGE: &str = "Use for symptoms and troubleshooting (\"won't cool\", \"leaking\", \"not draining\"), \
installation or repair instructions, and questions about returns, shipping, warranty or ordering \
(document_type=policy). Do not use to look up prices, ratings, stock or compatibility; use catalog_search for those.";

/// Nearest-neighbour lookup against the pre-built content index.
pub struct SemanticSearchTool {
    index: Arc<dyn ContentIndex>,
    schema: ToolSchema,
}

impl SemanticSearchTool {
    pub fn new(index: Arc<dyn ContentIndex>) -> Self {
        Self::with_top_k(index, DEFAULT_TOP_K, MAX_TOP_K)
    }

    pub fn with_top_k(index: Arc<dyn ContentIndex>, default_top_k: u32, max_top_k: u32) -> Self {
        let max_top_k = max_top_k.clamp(1, MAX_TOP_K);
        let default_top_k = default_top_k.clamp(1, max_top_k);
        Self { index, schema: schema(default_top_k, max_top_k) }
    }
}

fn schema(default_top_k: u32, max_top_k: u32) -> ToolSchema {
    ToolSchema {
        name: TOOL_NAME,
        description: DESCRIPTION,
        usage: USAGE,
        params: vec![
            ParamSpec::required(
                "query_text",
                "Natural-language description of what to find.",
                ParamKind::Text { min_len: MIN_QUERY_CHARS, max_len: MAX_QUERY_CHARS },
            ),
            ParamSpec::optional(
                "document_type",
                "Restrict to one kind of document.",
                ParamKind::Choice { values: &["repair", "article", "policy"], default: None },
            ),
            ParamSpec::optional(
                "appliance_category",
                "Restrict to one appliance category. Policies match every category.",
                ParamKind::Choice { values: &["refrigerator", "dishwasher"], default: None },
            ),
            ParamSpec::optional(
                "top_k",
                "Number of chunks to return.",
                ParamKind::Integer {
                    min: 1,
                    max: i64::from(max_top_k),
                    default: Some(i64::from(default_top_k)),
                    overflow: Overflow::Clamp,
                },
            ),
        ],
    }
}

#[async_trait]
impl Tool for SemanticSearchTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn invoke(&self, arguments: &Value) -> Result<ToolPayload, ToolFailure> {
        let search = ContentSearch {
            query_text: arguments
                .get("query_text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            document_type: arguments
                .get("document_type")
                .and_then(Value::as_str)
                .and_then(DocumentType::parse),
            appliance_category: arguments
                .get("appliance_category")
                .and_then(Value::as_str)
                .and_then(ApplianceCategory::parse),
            top_k: arguments
                .get("top_k")
                .and_then(Value::as_u64)
                .map(|top_k| top_k.min(u64::from(MAX_TOP_K)) as u32)
                .unwrap_or(DEFAULT_TOP_K),
        };

        self.index.search(&search).await.map(ToolPayload::Content).map_err(|error| {
            warn!(
                event_name = "agent.tool.knowledge_unavailable",
                error = %error,
                "content search failed"
            );
            ToolFailure::new(ToolErrorKind::BackendUnavailable, BACKEND_UNAVAILABLE_MESSAGE)
        })
    }
}
