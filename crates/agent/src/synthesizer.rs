//! Turns a finished loop into the reply text and product cards.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use partsage_core::domain::item::{Item, ItemId, ItemSummary};

use crate::orchestrator::{LoopOutcome, Termination};

pub const DEFAULT_DISPLAY_CAP: usize = 4;
pub const RESPONSE_TYPE: &str = "product_search";

pub const PARTIAL_PREFIX: &str =
    "I ran out of steps before finishing, so this is a partial, best-effort answer.";
pub const UNAVAILABLE_REPLY: &str =
    "Sorry, the assistant is temporarily unavailable. Please try again in a moment.";
pub const CANCELLED_REPLY: &str = "The request was cancelled before it finished.";
pub const NO_MATCHES_REPLY: &str = "No matching parts were found.";

const MAX_SUMMARY_SOURCES: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMetadata {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: usize,
    pub products: Vec<ItemSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub metadata: ReplyMetadata,
}

impl ChatReply {
    pub fn new(reply: impl Into<String>, products: Vec<ItemSummary>) -> Self {
        Self {
            reply: reply.into(),
            metadata: ReplyMetadata {
                kind: RESPONSE_TYPE.to_string(),
                count: products.len(),
                products,
            },
        }
    }

    pub fn text_only(reply: impl Into<String>) -> Self {
        Self::new(reply, Vec::new())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseSynthesizer {
    display_cap: usize,
}

impl Default for ResponseSynthesizer {
    fn default() -> Self {
        Self { display_cap: DEFAULT_DISPLAY_CAP }
    }
}

impl ResponseSynthesizer {
    pub fn new(display_cap: usize) -> Self {
        Self { display_cap: display_cap.max(1) }
    }

    pub fn synthesize(&self, outcome: &LoopOutcome) -> ChatReply {
        let items = self.ranked_items(outcome);
        let reply = match &outcome.termination {
            Termination::FinalAnswer(text) if !text.trim().is_empty() => text.trim().to_string(),
            Termination::FinalAnswer(_) => summarize(outcome, &items),
            Termination::IterationBudgetExceeded => {
                format!("{PARTIAL_PREFIX}\n\n{}", summarize(outcome, &items))
            }
            Termination::OracleUnavailable => UNAVAILABLE_REPLY.to_string(),
            Termination::Cancelled => CANCELLED_REPLY.to_string(),
        };
        ChatReply::new(reply, items.iter().map(ItemSummary::from).collect())
    }

    /// Items from every successful catalog observation, deduplicated by id
    /// with the most recently observed record winning, best first.
    fn ranked_items(&self, outcome: &LoopOutcome) -> Vec<Item> {
        let mut latest: BTreeMap<ItemId, Item> = BTreeMap::new();
        for items in outcome.observations.iter().filter_map(|observation| observation.catalog_items()) {
            for item in items {
                latest.insert(item.id.clone(), item.clone());
            }
        }

        let mut items = latest.into_values().collect::<Vec<_>>();
        items.sort_by(display_order);
        items.truncate(self.display_cap);
        items
    }
}

fn display_order(left: &Item, right: &Item) -> Ordering {
    let by_rating = match (left.rating, right.rating) {
        (Some(l), Some(r)) => r.cmp(&l),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_rating
        .then_with(|| left.current_price.cmp(&right.current_price))
        .then_with(|| left.id.cmp(&right.id))
}

fn summarize(outcome: &LoopOutcome, items: &[Item]) -> String {
    let mut lines = Vec::new();

    if !items.is_empty() {
        lines.push("Here are the best matching parts I found:".to_string());
        for item in items {
            let rating = item
                .rating
                .map(|rating| format!(", rated {rating}/5"))
                .unwrap_or_default();
            lines.push(format!(
                "- {} ({}): ${}{rating}, {}",
                item.name, item.id, item.current_price, item.availability
            ));
        }
    }

    let mut seen = HashSet::new();
    let sources = outcome
        .observations
        .iter()
        .rev()
        .filter_map(|observation| observation.chunks())
        .flatten()
        .filter(|scored| seen.insert(scored.chunk.chunk_id.clone()))
        .take(MAX_SUMMARY_SOURCES)
        .map(|scored| format!("- {} ({})", scored.chunk.detail.title(), scored.chunk.source_url))
        .collect::<Vec<_>>();
    if !sources.is_empty() {
        lines.push("Relevant guides and policies:".to_string());
        lines.extend(sources);
    }

    if lines.is_empty() {
        return NO_MATCHES_REPLY.to_string();
    }
    lines.join("\n")
}
