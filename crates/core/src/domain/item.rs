use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Appliance categories the assistant supports. No other value may appear in
/// catalog rows, content chunks, or tool arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplianceCategory {
    Refrigerator,
    Dishwasher,
}

impl ApplianceCategory {
    pub const ALL: [ApplianceCategory; 2] =
        [ApplianceCategory::Refrigerator, ApplianceCategory::Dishwasher];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refrigerator => "refrigerator",
            Self::Dishwasher => "dishwasher",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "refrigerator" => Some(Self::Refrigerator),
            "dishwasher" => Some(Self::Dishwasher),
            _ => None,
        }
    }
}

impl fmt::Display for ApplianceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub manufacturer_part_number: String,
    pub brand: String,
    pub category: ApplianceCategory,
    pub current_price: Decimal,
    pub original_price: Decimal,
    pub rating: Option<Decimal>,
    pub review_count: u32,
    pub in_stock: bool,
    pub availability: String,
    pub description: String,
    pub symptoms: Vec<String>,
    pub installation_difficulty: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub product_url: String,
}

impl Item {
    pub fn has_discount(&self) -> bool {
        self.current_price < self.original_price
    }
}

/// Product card exposed to callers in the chat response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub part_id: String,
    pub part_name: String,
    pub current_price: Decimal,
    pub rating: Option<Decimal>,
    pub review_count: u32,
    pub image_url: Option<String>,
    pub product_url: String,
}

impl From<&Item> for ItemSummary {
    fn from(item: &Item) -> Self {
        Self {
            part_id: item.id.0.clone(),
            part_name: item.name.clone(),
            current_price: item.current_price,
            rating: item.rating,
            review_count: item.review_count,
            image_url: item.image_url.clone(),
            product_url: item.product_url.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceModel {
    pub model_number: String,
    pub brand: String,
    pub category: ApplianceCategory,
    pub description: String,
    pub model_url: Option<String>,
}

/// An item fits a model. Stored once, queried from either side.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompatibilityEdge {
    pub item_id: ItemId,
    pub model_number: String,
}
