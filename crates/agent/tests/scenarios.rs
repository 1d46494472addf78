//! End-to-end conversations against a seeded SQLite catalog and content index,
//! driven by deterministic scripted oracles.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use partsage_agent::oracle::{OracleDecision, OracleRequest, ScriptedOracle};
use partsage_agent::orchestrator::{LoopSettings, Orchestrator, Termination};
use partsage_agent::synthesizer::PARTIAL_PREFIX;
use partsage_agent::tools::{SemanticSearchTool, StructuredQueryTool, ToolErrorKind, ToolInvocation, ToolRegistry};
use partsage_agent::{AgentRuntime, CancellationToken, ChatRequest, OUT_OF_SCOPE_REPLY};
use partsage_core::audit::InMemoryAuditSink;
use partsage_core::config::AppConfig;
use partsage_core::domain::catalog::{CatalogQuery, CatalogResult};
use partsage_core::domain::content::{ChunkDetail, ContentChunk, DocumentType};
use partsage_core::domain::conversation::Query;
use partsage_core::domain::item::{ApplianceCategory, CompatibilityEdge, Item, ItemId};
use partsage_db::{
    connect_with_settings, migrations, seed_demo_catalog, CatalogRepository, CatalogWriter,
    EmbeddedChunk, EmbeddingError, QueryEmbedder, RepositoryError, SqlCatalogRepository,
    SqlContentIndex,
};

type ScenarioResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!(
                "{}: `{:?}` != `{:?}`",
                format!($($arg)*),
                $left,
                $right
            ));
        }
    };
}

const KEYWORDS: [&str; 5] = ["cool", "ice", "leak", "return", "drain"];

/// Bag-of-keywords vectors: enough to make nearest-neighbour ranking predictable.
struct KeywordEmbedder;

fn keyword_vector(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    KEYWORDS.iter().map(|keyword| text.matches(keyword).count() as f32 + 0.01).collect()
}

#[async_trait]
impl QueryEmbedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(keyword_vector(text))
    }
}

fn extra_item(id: &str, name: &str, category: ApplianceCategory, price_cents: i64) -> Item {
    Item {
        id: ItemId(id.to_string()),
        name: name.to_string(),
        manufacturer_part_number: format!("MPN-{id}"),
        brand: "Whirlpool".to_string(),
        category,
        current_price: Decimal::new(price_cents, 2),
        original_price: Decimal::new(price_cents, 2),
        rating: Some(Decimal::new(46, 1)),
        review_count: 12,
        in_stock: true,
        availability: "In Stock".to_string(),
        description: format!("{name} replacement."),
        symptoms: Vec::new(),
        installation_difficulty: Some("Easy".to_string()),
        image_url: None,
        video_url: None,
        product_url: format!("https://www.partselect.com/{id}.htm"),
    }
}

fn repair_chunk(id: &str, text: &str, category: ApplianceCategory, part_name: &str, linked: &str) -> EmbeddedChunk {
    EmbeddedChunk {
        chunk: ContentChunk {
            chunk_id: id.to_string(),
            text: text.to_string(),
            document_type: DocumentType::Repair,
            appliance_category: Some(category),
            source_url: format!("https://www.partselect.com/Repair/{id}/"),
            chunk_index: 0,
            total_chunks: 1,
            detail: ChunkDetail::Repair {
                part_name: part_name.to_string(),
                symptom: None,
                linked_item_id: Some(ItemId(linked.to_string())),
            },
        },
        embedding: keyword_vector(text),
    }
}

fn corpus() -> Vec<EmbeddedChunk> {
    let mut chunks = vec![
        repair_chunk(
            "refrigerator-not-cooling-0",
            "Refrigerator not cooling: a failed evaporator fan motor stops cold air from circulating.",
            ApplianceCategory::Refrigerator,
            "Evaporator Fan Motor",
            "PS12364199",
        ),
        repair_chunk(
            "ice-maker-not-making-ice-0",
            "Ice maker not making ice: check the water inlet valve and the ice maker assembly.",
            ApplianceCategory::Refrigerator,
            "Ice Maker Assembly",
            "PS11739035",
        ),
        repair_chunk(
            "dishwasher-leaking-0",
            "Dishwasher leaking from the door: replace a worn door gasket.",
            ApplianceCategory::Dishwasher,
            "Door Gasket",
            "PS11750057",
        ),
    ];
    chunks.push(EmbeddedChunk {
        chunk: ContentChunk {
            chunk_id: "policy-returns-0".to_string(),
            text: "You can return most parts within 365 days for a full refund.".to_string(),
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
        embedding: keyword_vector("return policy"),
    });
    chunks
}

struct Harness {
    catalog: Arc<SqlCatalogRepository>,
    index: Arc<SqlContentIndex>,
    audit: InMemoryAuditSink,
    config: AppConfig,
}

async fn harness() -> ScenarioResult<Harness> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;

    let catalog = SqlCatalogRepository::new(pool.clone());
    seed_demo_catalog(&catalog).await.map_err(|error| format!("seed: {error}"))?;
    for item in [
        extra_item("X123", "Dishwasher Lower Spray Arm", ApplianceCategory::Dishwasher, 2195),
        extra_item("PS12364199", "Evaporator Fan Motor", ApplianceCategory::Refrigerator, 5495),
    ] {
        catalog.save_item(item).await.map_err(|error| format!("save item: {error}"))?;
    }
    catalog
        .link(CompatibilityEdge {
            item_id: ItemId("PS12364199".to_string()),
            model_number: "WRS325SDHZ01".to_string(),
        })
        .await
        .map_err(|error| format!("link: {error}"))?;

    let index = SqlContentIndex::new(pool, Arc::new(KeywordEmbedder));
    for chunk in corpus() {
        index.import(&chunk).await.map_err(|error| format!("import: {error}"))?;
    }

    Ok(Harness {
        catalog: Arc::new(catalog),
        index: Arc::new(index),
        audit: InMemoryAuditSink::default(),
        config: AppConfig::default(),
    })
}

impl Harness {
    fn runtime(&self, oracle: Arc<ScriptedOracle>) -> AgentRuntime {
        AgentRuntime::from_config(
            &self.config,
            self.catalog.clone(),
            self.index.clone(),
            oracle,
            Arc::new(self.audit.clone()),
        )
    }

    fn orchestrator_with(&self, catalog: Arc<dyn CatalogRepository>, oracle: Arc<ScriptedOracle>) -> Orchestrator {
        let mut registry = ToolRegistry::default();
        registry.register(StructuredQueryTool::new(catalog));
        registry.register(SemanticSearchTool::new(self.index.clone()));
        Orchestrator::new(oracle, Arc::new(registry), Arc::new(self.audit.clone()), LoopSettings::default())
    }

    fn orchestrator(&self, oracle: Arc<ScriptedOracle>) -> Orchestrator {
        self.orchestrator_with(self.catalog.clone(), oracle)
    }

    fn dispatched_arguments(&self, tool: &str) -> Vec<Value> {
        self.audit
            .events_of("agent.tool.dispatched")
            .into_iter()
            .filter(|event| event.metadata.get("tool").map(String::as_str) == Some(tool))
            .filter_map(|event| event.metadata.get("arguments").and_then(|raw| serde_json::from_str(raw).ok()))
            .collect()
    }
}

fn catalog_call(arguments: Value) -> OracleDecision {
    OracleDecision::UseTools(vec![ToolInvocation::new("", "catalog_search", arguments)])
}

fn knowledge_call(arguments: Value) -> OracleDecision {
    OracleDecision::UseTools(vec![ToolInvocation::new("", "knowledge_search", arguments)])
}

fn id_lookup(id: &str) -> Value {
    json!({ "filters": [{ "field": "id", "op": "eq", "value": id }] })
}

/// Looks an item up, then describes it from the observation.
fn item_lookup_oracle(id: &'static str) -> ScriptedOracle {
    ScriptedOracle::from_fn(move |request: &OracleRequest<'_>| {
        let Some(last) = request.observations.last() else {
            return Ok(catalog_call(id_lookup(id)));
        };
        let text = match last.catalog_items().and_then(|items| items.first()) {
            Some(item) => format!(
                "{} ({}) costs ${}, rated {}/5, availability: {}.",
                item.name,
                item.id,
                item.current_price,
                item.rating.map(|rating| rating.to_string()).unwrap_or_else(|| "n/a".to_string()),
                item.availability
            ),
            None => "No matching parts were found for that part number.".to_string(),
        };
        Ok(OracleDecision::FinalAnswer(text))
    })
}

/// Troubleshoots with the repair library, then prices the linked part.
fn troubleshooting_oracle() -> ScriptedOracle {
    ScriptedOracle::from_fn(|request: &OracleRequest<'_>| match request.observations {
        [] => Ok(knowledge_call(json!({
            "query_text": request.query.text,
            "document_type": "repair"
        }))),
        [diagnosis] => {
            let linked = diagnosis
                .chunks()
                .and_then(|chunks| chunks.first())
                .and_then(|top| top.chunk.detail.linked_item_id().cloned());
            match linked {
                Some(id) => Ok(catalog_call(id_lookup(id.as_str()))),
                None => Ok(OracleDecision::FinalAnswer("I could not find a matching guide.".to_string())),
            }
        }
        [diagnosis, pricing, ..] => {
            let guide = diagnosis.chunks().and_then(|chunks| chunks.first());
            let part = pricing.catalog_items().and_then(|items| items.first());
            let text = match (guide, part) {
                (Some(guide), Some(part)) => format!(
                    "Diagnosis: {} Recommended part: {} ({}) for ${}.",
                    guide.chunk.text, part.name, part.id, part.current_price
                ),
                _ => "I could not find a matching part.".to_string(),
            };
            Ok(OracleDecision::FinalAnswer(text))
        }
    })
}

#[tokio::test]
async fn scenario_a_item_lookup_uses_only_the_catalog() -> ScenarioResult {
    let harness = harness().await?;
    let oracle = Arc::new(item_lookup_oracle("X123"));

    let reply = harness
        .runtime(oracle.clone())
        .handle_message(ChatRequest::new("Tell me about item X123"), &CancellationToken::new())
        .await
        .map_err(|error| format!("chat: {error}"))?;

    let catalog_calls = harness.dispatched_arguments("catalog_search");
    require_eq!(catalog_calls.len(), 1, "catalog calls");
    require_eq!(catalog_calls[0]["filters"][0]["field"], json!("id"), "identifier filter");
    require!(harness.dispatched_arguments("knowledge_search").is_empty(), "no semantic search");

    require!(reply.reply.contains("21.95"), "price missing from `{}`", reply.reply);
    require!(reply.reply.contains("4.6"), "rating missing from `{}`", reply.reply);
    require!(reply.reply.contains("In Stock"), "availability missing from `{}`", reply.reply);
    require_eq!(reply.metadata.count, 1, "product cards");
    require_eq!(reply.metadata.products[0].part_id, "X123".to_string(), "product id");
    Ok(())
}

#[tokio::test]
async fn scenario_b_troubleshooting_prices_the_linked_part() -> ScenarioResult {
    let harness = harness().await?;
    let oracle = Arc::new(troubleshooting_oracle());

    let reply = harness
        .runtime(oracle)
        .handle_message(ChatRequest::new("My appliance won't cool"), &CancellationToken::new())
        .await
        .map_err(|error| format!("chat: {error}"))?;

    let searches = harness.dispatched_arguments("knowledge_search");
    require_eq!(searches.len(), 1, "semantic calls");
    require_eq!(searches[0]["document_type"], json!("repair"), "document type");

    let lookups = harness.dispatched_arguments("catalog_search");
    require_eq!(lookups.len(), 1, "catalog calls");
    require_eq!(lookups[0]["filters"][0]["value"], json!("PS12364199"), "linked item lookup");

    require!(reply.reply.contains("evaporator fan motor"), "diagnosis missing from `{}`", reply.reply);
    require!(reply.reply.contains("54.95"), "price missing from `{}`", reply.reply);
    require_eq!(reply.metadata.products[0].part_id, "PS12364199".to_string(), "priced part card");
    Ok(())
}

#[tokio::test]
async fn scenario_c_out_of_scope_never_reaches_a_tool() -> ScenarioResult {
    let harness = harness().await?;
    let oracle = Arc::new(troubleshooting_oracle());

    let reply = harness
        .runtime(oracle.clone())
        .handle_message(ChatRequest::new("How do I fix my car stereo?"), &CancellationToken::new())
        .await
        .map_err(|error| format!("chat: {error}"))?;

    require_eq!(reply.reply, OUT_OF_SCOPE_REPLY.to_string(), "rejection template");
    require!(reply.metadata.products.is_empty());
    require_eq!(oracle.calls(), 0, "oracle calls");
    require!(harness.audit.events_of("agent.tool.dispatched").is_empty(), "tool calls");
    Ok(())
}

#[tokio::test]
async fn scenario_d_empty_catalog_result_reports_no_matches() -> ScenarioResult {
    let harness = harness().await?;
    let oracle = Arc::new(ScriptedOracle::from_fn(|request: &OracleRequest<'_>| {
        match request.observations.last() {
            None => Ok(catalog_call(json!({
                "filters": [{ "field": "brand", "value": "Bosch" }, { "field": "category", "value": "dishwasher" }]
            }))),
            Some(observation) if observation.catalog_items().map(<[Item]>::is_empty).unwrap_or(false) => {
                Ok(OracleDecision::FinalAnswer("No matching parts were found for Bosch dishwashers.".to_string()))
            }
            Some(_) => Ok(OracleDecision::FinalAnswer("Found some parts.".to_string())),
        }
    }));

    let reply = harness
        .runtime(oracle)
        .handle_message(ChatRequest::new("Do you have Bosch dishwasher parts?"), &CancellationToken::new())
        .await
        .map_err(|error| format!("chat: {error}"))?;

    require!(reply.reply.contains("No matching parts"), "reply `{}`", reply.reply);
    let body = serde_json::to_value(&reply).map_err(|error| format!("serialize: {error}"))?;
    require_eq!(body["metadata"]["products"], json!([]), "products present and empty");
    require_eq!(body["metadata"]["count"], json!(0), "count");
    Ok(())
}

#[tokio::test]
async fn iteration_budget_produces_a_partial_reply() -> ScenarioResult {
    let harness = harness().await?;
    let oracle = Arc::new(ScriptedOracle::from_fn(|_: &OracleRequest<'_>| {
        Ok(knowledge_call(json!({ "query_text": "ice maker not making ice" })))
    }));

    let reply = harness
        .runtime(oracle.clone())
        .handle_message(ChatRequest::new("My ice maker is broken"), &CancellationToken::new())
        .await
        .map_err(|error| format!("chat: {error}"))?;

    let max = harness.config.agent.max_iterations;
    require!(reply.reply.starts_with(PARTIAL_PREFIX), "reply `{}`", reply.reply);
    require!(reply.reply.contains("Ice Maker Assembly"), "summary `{}`", reply.reply);
    require_eq!(oracle.calls(), max, "oracle consulted once per cycle");
    require_eq!(harness.dispatched_arguments("knowledge_search").len(), max as usize, "dispatches");

    let completed = harness.audit.events_of("chat.completed");
    require_eq!(
        completed[0].metadata.get("iterations").cloned(),
        Some(max.to_string()),
        "iterations recorded"
    );
    Ok(())
}

#[tokio::test]
async fn top_k_is_clamped_into_range() -> ScenarioResult {
    let harness = harness().await?;
    let oracle = Arc::new(ScriptedOracle::sequence([
        Ok(knowledge_call(json!({ "query_text": "fridge not cooling", "top_k": 37 }))),
        Ok(knowledge_call(json!({ "query_text": "fridge not cooling", "top_k": 0 }))),
        Ok(OracleDecision::FinalAnswer("Check the fan motor.".to_string())),
    ]));

    let outcome = harness
        .orchestrator(oracle)
        .run(&Query::new("fridge not cooling"), &CancellationToken::new())
        .await;

    let top_ks = harness
        .dispatched_arguments("knowledge_search")
        .iter()
        .map(|arguments| arguments["top_k"].clone())
        .collect::<Vec<_>>();
    require_eq!(top_ks, vec![json!(20), json!(1)], "clamped top_k");
    require_eq!(outcome.observations[1].chunks().map(|chunks| chunks.len()), Some(1), "single chunk");
    Ok(())
}

#[tokio::test]
async fn invalid_document_type_is_folded_back_without_dispatch() -> ScenarioResult {
    let harness = harness().await?;
    let oracle = Arc::new(ScriptedOracle::sequence([
        Ok(knowledge_call(json!({ "query_text": "how long is coverage", "document_type": "warranty" }))),
        Ok(OracleDecision::FinalAnswer("Let me rephrase.".to_string())),
    ]));

    let outcome = harness
        .orchestrator(oracle)
        .run(&Query::new("What is the warranty?"), &CancellationToken::new())
        .await;

    require_eq!(
        outcome.observations[0].error_kind(),
        Some(ToolErrorKind::InvalidArguments),
        "validation observation"
    );
    require!(harness.audit.events_of("agent.tool.dispatched").is_empty(), "nothing dispatched");
    require_eq!(harness.audit.events_of("agent.tool.rejected").len(), 1, "rejection audited");
    require_eq!(outcome.termination, Termination::FinalAnswer("Let me rephrase.".to_string()), "loop recovered");
    Ok(())
}

/// Returns each item a dollar cheaper on every call.
struct RepricingCatalog {
    inner: Arc<dyn CatalogRepository>,
    calls: AtomicU32,
}

#[async_trait]
impl CatalogRepository for RepricingCatalog {
    async fn query(&self, query: &CatalogQuery) -> Result<CatalogResult, RepositoryError> {
        let discount = Decimal::from(self.calls.fetch_add(1, Ordering::SeqCst));
        let mut result = self.inner.query(query).await?;
        for item in &mut result.items {
            item.current_price -= discount;
        }
        Ok(result)
    }

    async fn find_item(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError> {
        self.inner.find_item(id).await
    }

    async fn compatible_models(&self, id: &ItemId, limit: u32) -> Result<Vec<String>, RepositoryError> {
        self.inner.compatible_models(id, limit).await
    }
}

#[tokio::test]
async fn duplicate_items_keep_the_latest_price() -> ScenarioResult {
    let harness = harness().await?;
    let catalog = Arc::new(RepricingCatalog { inner: harness.catalog.clone(), calls: AtomicU32::new(0) });
    let oracle = Arc::new(ScriptedOracle::sequence([
        Ok(catalog_call(id_lookup("PS11752778"))),
        Ok(catalog_call(json!({ "compatible_with": "WRS325SDHZ01" }))),
        Ok(OracleDecision::FinalAnswer("Here is the door bin.".to_string())),
    ]));

    let outcome = harness
        .orchestrator_with(catalog, oracle)
        .run(&Query::new("door bin for WRS325SDHZ01"), &CancellationToken::new())
        .await;
    let reply = partsage_agent::ResponseSynthesizer::default().synthesize(&outcome);

    let bin = reply
        .metadata
        .products
        .iter()
        .find(|product| product.part_id == "PS11752778")
        .ok_or_else(|| "door bin missing".to_string())?;
    require_eq!(bin.current_price, Decimal::new(4395, 2), "most recent price wins");
    require_eq!(
        reply.metadata.products.iter().filter(|product| product.part_id == "PS11752778").count(),
        1,
        "deduplicated"
    );
    Ok(())
}

#[tokio::test]
async fn identical_requests_produce_identical_tool_sequences() -> ScenarioResult {
    let harness = harness().await?;
    let query = Query::new("My appliance won't cool");

    let first = harness
        .orchestrator(Arc::new(troubleshooting_oracle()))
        .run(&query, &CancellationToken::new())
        .await;
    let second = harness
        .orchestrator(Arc::new(troubleshooting_oracle()))
        .run(&query, &CancellationToken::new())
        .await;

    require_eq!(first.invocations, second.invocations, "invocation sequence");
    require_eq!(first.iterations, 2, "two tool cycles");
    require!(first.iterations <= LoopSettings::default().max_iterations);
    Ok(())
}
