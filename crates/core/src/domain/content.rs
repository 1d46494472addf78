use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::item::{ApplianceCategory, ItemId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Repair,
    Article,
    Policy,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] =
        [DocumentType::Repair, DocumentType::Article, DocumentType::Policy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repair => "repair",
            Self::Article => "article",
            Self::Policy => "policy",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "repair" => Some(Self::Repair),
            "article" => Some(Self::Article),
            "policy" => Some(Self::Policy),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata that only makes sense for one document type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkDetail {
    Repair { part_name: String, symptom: Option<String>, linked_item_id: Option<ItemId> },
    Article { title: String, author: Option<String> },
    Policy { policy_type: String, title: String },
}

impl ChunkDetail {
    pub fn document_type(&self) -> DocumentType {
        match self {
            Self::Repair { .. } => DocumentType::Repair,
            Self::Article { .. } => DocumentType::Article,
            Self::Policy { .. } => DocumentType::Policy,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Repair { part_name, .. } => part_name,
            Self::Article { title, .. } | Self::Policy { title, .. } => title,
        }
    }

    pub fn linked_item_id(&self) -> Option<&ItemId> {
        match self {
            Self::Repair { linked_item_id, .. } => linked_item_id.as_ref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChunk {
    pub chunk_id: String,
    pub text: String,
    pub document_type: DocumentType,
    pub appliance_category: Option<ApplianceCategory>,
    pub source_url: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub detail: ChunkDetail,
}

/// Ranking signal within a single result set, always in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f32")]
pub struct RelevanceScore(f32);

impl From<f32> for RelevanceScore {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl RelevanceScore {
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Maps cosine similarity in `[-1, 1]` onto the score range.
    pub fn from_cosine(cosine: f32) -> Self {
        Self::new((cosine + 1.0) / 2.0)
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub rank: u32,
    pub score: RelevanceScore,
    pub chunk: ContentChunk,
}

/// Nearest-neighbour request handed to the content index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSearch {
    pub query_text: String,
    pub document_type: Option<DocumentType>,
    pub appliance_category: Option<ApplianceCategory>,
    pub top_k: u32,
}

impl ContentSearch {
    pub fn matches(&self, chunk: &ContentChunk) -> bool {
        if let Some(document_type) = self.document_type {
            if chunk.document_type != document_type {
                return false;
            }
        }
        // Chunks without a category (policies) are never filtered out by category.
        if let (Some(wanted), Some(actual)) = (self.appliance_category, chunk.appliance_category) {
            if wanted != actual {
                return false;
            }
        }
        true
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::{
        cosine_similarity, ChunkDetail, ContentChunk, ContentSearch, DocumentType, RelevanceScore,
    };
    use crate::domain::item::ApplianceCategory;

    fn policy_chunk() -> ContentChunk {
        ContentChunk {
            chunk_id: "policy-returns-0".to_string(),
            text: "Parts may be returned within 365 days.".to_string(),
            document_type: DocumentType::Policy,
            appliance_category: None,
            source_url: "https://www.partselect.com/365-Day-Returns.htm".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            detail: ChunkDetail::Policy {
                policy_type: "returns".to_string(),
                title: "365 Day Returns".to_string(),
            },
        }
    }

    #[test]
    fn relevance_score_is_bounded() {
        assert_eq!(RelevanceScore::new(1.7).value(), 1.0);
        assert_eq!(RelevanceScore::new(-0.2).value(), 0.0);
        assert_eq!(RelevanceScore::new(f32::NAN).value(), 0.0);
        assert_eq!(RelevanceScore::from_cosine(1.0).value(), 1.0);
        assert_eq!(RelevanceScore::from_cosine(-1.0).value(), 0.0);
    }

    #[test]
    fn category_filter_keeps_uncategorized_chunks() {
        let search = ContentSearch {
            query_text: "return policy".to_string(),
            document_type: None,
            appliance_category: Some(ApplianceCategory::Dishwasher),
            top_k: 5,
        };
        assert!(search.matches(&policy_chunk()));

        let repair_only = ContentSearch { document_type: Some(DocumentType::Repair), ..search };
        assert!(!repair_only.matches(&policy_chunk()));
    }

    #[test]
    fn cosine_rejects_dimension_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), None);
        let same = cosine_similarity(&[0.5, 0.5], &[0.5, 0.5]).unwrap_or_default();
        assert!((same - 1.0).abs() < 1e-6);
    }

    #[test]
    fn document_type_rejects_unknown_values() {
        assert_eq!(DocumentType::parse("Repair"), Some(DocumentType::Repair));
        assert_eq!(DocumentType::parse("warranty"), None);
    }

    #[test]
    fn deserialized_scores_are_clamped() {
        #[derive(serde::Deserialize)]
        struct Scored {
            score: RelevanceScore,
        }

        let high: Scored = toml::from_str("score = 1.7").expect("toml");
        let low: Scored = toml::from_str("score = -0.4").expect("toml");
        let mid: Scored = toml::from_str("score = 0.25").expect("toml");

        assert_eq!(high.score.value(), 1.0);
        assert_eq!(low.score.value(), 0.0);
        assert_eq!(mid.score.value(), 0.25);
    }
}
