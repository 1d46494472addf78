//! Tool contracts, invocations, observations and the validating registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use partsage_core::domain::catalog::CatalogResult;
use partsage_core::domain::content::ScoredChunk;
use partsage_core::domain::item::Item;

use crate::schema::{ToolSchema, ValidationError};

pub mod catalog;
pub mod knowledge;

pub use catalog::StructuredQueryTool;
pub use knowledge::SemanticSearchTool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidArguments,
    InvalidField,
    QueryTooBroad,
    BackendUnavailable,
    Timeout,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArguments => "invalid_arguments",
            Self::InvalidField => "invalid_field",
            Self::QueryTooBroad => "query_too_broad",
            Self::BackendUnavailable => "backend_unavailable",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool-level error. `message` is shown to the oracle and must never carry
/// raw backend error text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ToolFailure {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolFailure {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl From<ValidationError> for ToolFailure {
    fn from(error: ValidationError) -> Self {
        Self::new(ToolErrorKind::InvalidArguments, error.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ToolPayload {
    Catalog(CatalogResult),
    Content(Vec<ScoredChunk>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self { call_id: call_id.into(), tool_name: tool_name.into(), arguments }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ObservationOutcome {
    Success { payload: ToolPayload },
    Error { kind: ToolErrorKind, message: String },
}

/// Result of one dispatch, appended to the loop state and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolObservation {
    pub call_id: String,
    pub tool_name: String,
    pub iteration: u32,
    pub outcome: ObservationOutcome,
}

impl ToolObservation {
    pub fn success(invocation: &ToolInvocation, iteration: u32, payload: ToolPayload) -> Self {
        Self {
            call_id: invocation.call_id.clone(),
            tool_name: invocation.tool_name.clone(),
            iteration,
            outcome: ObservationOutcome::Success { payload },
        }
    }

    pub fn failure(invocation: &ToolInvocation, iteration: u32, failure: ToolFailure) -> Self {
        Self {
            call_id: invocation.call_id.clone(),
            tool_name: invocation.tool_name.clone(),
            iteration,
            outcome: ObservationOutcome::Error { kind: failure.kind, message: failure.message },
        }
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match &self.outcome {
            ObservationOutcome::Error { kind, .. } => Some(*kind),
            ObservationOutcome::Success { .. } => None,
        }
    }

    pub fn catalog_result(&self) -> Option<&CatalogResult> {
        match &self.outcome {
            ObservationOutcome::Success { payload: ToolPayload::Catalog(result) } => Some(result),
            _ => None,
        }
    }

    pub fn catalog_items(&self) -> Option<&[Item]> {
        self.catalog_result().map(|result| result.items.as_slice())
    }

    pub fn chunks(&self) -> Option<&[ScoredChunk]> {
        match &self.outcome {
            ObservationOutcome::Success { payload: ToolPayload::Content(chunks) } => Some(chunks),
            _ => None,
        }
    }

    /// Compact JSON handed back to the oracle as the tool result.
    pub fn to_oracle_json(&self) -> Value {
        match &self.outcome {
            ObservationOutcome::Error { kind, message } => {
                json!({ "status": "error", "error": kind.as_str(), "message": message })
            }
            ObservationOutcome::Success { payload: ToolPayload::Catalog(result) } => json!({
                "status": "success",
                "items": result.items.iter().map(item_json).collect::<Vec<_>>(),
                "models": result.models,
            }),
            ObservationOutcome::Success { payload: ToolPayload::Content(chunks) } => json!({
                "status": "success",
                "chunks": chunks
                    .iter()
                    .map(|scored| json!({
                        "rank": scored.rank,
                        "score": scored.score.value(),
                        "document_type": scored.chunk.document_type.as_str(),
                        "appliance_category": scored.chunk.appliance_category.map(|c| c.as_str()),
                        "title": scored.chunk.detail.title(),
                        "linked_item_id": scored.chunk.detail.linked_item_id().map(|id| id.as_str()),
                        "source_url": scored.chunk.source_url,
                        "text": scored.chunk.text,
                    }))
                    .collect::<Vec<_>>(),
            }),
        }
    }
}

fn item_json(item: &Item) -> Value {
    json!({
        "id": item.id.as_str(),
        "name": item.name,
        "manufacturer_part_number": item.manufacturer_part_number,
        "brand": item.brand,
        "category": item.category.as_str(),
        "current_price": item.current_price.to_string(),
        "original_price": item.original_price.to_string(),
        "rating": item.rating.map(|rating| rating.to_string()),
        "review_count": item.review_count,
        "in_stock": item.in_stock,
        "availability": item.availability,
        "installation_difficulty": item.installation_difficulty,
        "symptoms": item.symptoms,
        "product_url": item.product_url,
        "video_url": item.video_url,
    })
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> &ToolSchema;

    /// Receives arguments already normalized by [`ToolSchema::validate`].
    async fn invoke(&self, arguments: &Value) -> Result<ToolPayload, ToolFailure>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.register_shared(Arc::new(tool));
    }

    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.schema().name, tool);
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|tool| tool.schema().clone()).collect()
    }

    /// Resolves the tool and validates the invocation against its schema.
    /// Nothing is dispatched here.
    pub fn prepare(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<(Arc<dyn Tool>, Value), ValidationError> {
        let tool = self
            .tools
            .get(invocation.tool_name.as_str())
            .ok_or_else(|| ValidationError::UnknownTool(invocation.tool_name.clone()))?;
        let arguments = tool.schema().validate(&invocation.arguments)?;
        Ok((Arc::clone(tool), arguments))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
