//! Small demo catalog used by `partsage seed` and by tests across the
//! workspace. Content chunks are not seeded: their embeddings must come from
//! the same model the query embedder uses.

use rust_decimal::Decimal;
use serde::Serialize;

use partsage_core::domain::item::{
    ApplianceCategory, ApplianceModel, CompatibilityEdge, Item, ItemId,
};

use crate::repositories::{CatalogWriter, RepositoryError};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub items: usize,
    pub models: usize,
    pub edges: usize,
}

struct SeedItem {
    id: &'static str,
    name: &'static str,
    mpn: &'static str,
    brand: &'static str,
    category: ApplianceCategory,
    price_cents: i64,
    original_cents: i64,
    rating_tenths: Option<i64>,
    reviews: u32,
    in_stock: bool,
    description: &'static str,
    symptoms: &'static [&'static str],
    difficulty: Option<&'static str>,
    fits: &'static [&'static str],
}

const SEED_MODELS: &[(&str, &str, ApplianceCategory, &str)] = &[
    ("WDT780SAEM1", "Whirlpool", ApplianceCategory::Dishwasher, "Whirlpool built-in dishwasher"),
    ("KDTE334GPS0", "KitchenAid", ApplianceCategory::Dishwasher, "KitchenAid top control dishwasher"),
    ("WRS325SDHZ01", "Whirlpool", ApplianceCategory::Refrigerator, "Whirlpool side-by-side refrigerator"),
    ("LFX28968ST", "LG", ApplianceCategory::Refrigerator, "LG French door refrigerator"),
];

const SEED_ITEMS: &[SeedItem] = &[
    SeedItem {
        id: "PS11752778",
        name: "Refrigerator Door Shelf Bin",
        mpn: "WPW10321304",
        brand: "Whirlpool",
        category: ApplianceCategory::Refrigerator,
        price_cents: 4495,
        original_cents: 5195,
        rating_tenths: Some(48),
        reviews: 152,
        in_stock: true,
        description: "Clear door bin that holds jars and bottles on the refrigerator door.",
        symptoms: &["Door won't close", "Shelf or bin cracked"],
        difficulty: Some("Really Easy"),
        fits: &["WRS325SDHZ01"],
    },
    SeedItem {
        id: "PS11739035",
        name: "Refrigerator Ice Maker Assembly",
        mpn: "W10873791",
        brand: "Whirlpool",
        category: ApplianceCategory::Refrigerator,
        price_cents: 8995,
        original_cents: 8995,
        rating_tenths: Some(46),
        reviews: 88,
        in_stock: true,
        description: "Replacement ice maker assembly with harness.",
        symptoms: &["Ice maker not making ice", "Leaking", "Noisy"],
        difficulty: Some("Easy"),
        fits: &["WRS325SDHZ01"],
    },
    SeedItem {
        id: "PS12070506",
        name: "Water Inlet Valve for Ice Maker",
        mpn: "W11082871",
        brand: "Whirlpool",
        category: ApplianceCategory::Refrigerator,
        price_cents: 3895,
        original_cents: 4295,
        rating_tenths: Some(45),
        reviews: 41,
        in_stock: true,
        description: "Controls water flow to the ice maker and dispenser.",
        symptoms: &["Ice maker not making ice", "Water dispenser not working"],
        difficulty: Some("Easy"),
        fits: &["WRS325SDHZ01"],
    },
    SeedItem {
        id: "PS3634394",
        name: "Refrigerator Water Filter",
        mpn: "LT700P",
        brand: "LG",
        category: ApplianceCategory::Refrigerator,
        price_cents: 4999,
        original_cents: 5499,
        rating_tenths: None,
        reviews: 0,
        in_stock: false,
        description: "Replacement water filter cartridge.",
        symptoms: &["Water has bad taste or odor"],
        difficulty: Some("Really Easy"),
        fits: &["LFX28968ST"],
    },
    SeedItem {
        id: "PS11750057",
        name: "Dishwasher Door Gasket",
        mpn: "W10300924",
        brand: "Whirlpool",
        category: ApplianceCategory::Dishwasher,
        price_cents: 3295,
        original_cents: 3295,
        rating_tenths: Some(49),
        reviews: 210,
        in_stock: true,
        description: "Door seal that keeps water inside the tub.",
        symptoms: &["Leaking"],
        difficulty: Some("Easy"),
        fits: &["WDT780SAEM1", "KDTE334GPS0"],
    },
    SeedItem {
        id: "PS11756150",
        name: "Dishwasher Drain Pump",
        mpn: "W10348269",
        brand: "Whirlpool",
        category: ApplianceCategory::Dishwasher,
        price_cents: 6495,
        original_cents: 7195,
        rating_tenths: Some(47),
        reviews: 64,
        in_stock: true,
        description: "Pumps water out of the dishwasher at the end of a cycle.",
        symptoms: &["Not draining", "Noisy"],
        difficulty: Some("A Bit Difficult"),
        fits: &["WDT780SAEM1"],
    },
    SeedItem {
        id: "PS10065979",
        name: "Dishwasher Upper Rack Adjuster Kit",
        mpn: "W10712394",
        brand: "Whirlpool",
        category: ApplianceCategory::Dishwasher,
        price_cents: 2795,
        original_cents: 3195,
        rating_tenths: Some(47),
        reviews: 320,
        in_stock: true,
        description: "Adjuster kit for the upper dish rack, both sides.",
        symptoms: &["Door won't close", "Rack will not adjust"],
        difficulty: Some("Really Easy"),
        fits: &["WDT780SAEM1", "KDTE334GPS0"],
    },
];

fn seed_item(seed: &SeedItem) -> Item {
    Item {
        id: ItemId(seed.id.to_string()),
        name: seed.name.to_string(),
        manufacturer_part_number: seed.mpn.to_string(),
        brand: seed.brand.to_string(),
        category: seed.category,
        current_price: Decimal::new(seed.price_cents, 2),
        original_price: Decimal::new(seed.original_cents, 2),
        rating: seed.rating_tenths.map(|tenths| Decimal::new(tenths, 1)),
        review_count: seed.reviews,
        in_stock: seed.in_stock,
        availability: if seed.in_stock { "In Stock" } else { "Special Order" }.to_string(),
        description: seed.description.to_string(),
        symptoms: seed.symptoms.iter().map(|symptom| symptom.to_string()).collect(),
        installation_difficulty: seed.difficulty.map(str::to_string),
        image_url: Some(format!("https://www.partselect.com/assets/images/{}.jpg", seed.id)),
        video_url: None,
        product_url: format!("https://www.partselect.com/{}.htm", seed.id),
    }
}

pub fn demo_items() -> Vec<Item> {
    SEED_ITEMS.iter().map(seed_item).collect()
}

pub fn demo_models() -> Vec<ApplianceModel> {
    SEED_MODELS
        .iter()
        .map(|(model_number, brand, category, description)| ApplianceModel {
            model_number: model_number.to_string(),
            brand: brand.to_string(),
            category: *category,
            description: description.to_string(),
            model_url: Some(format!("https://www.partselect.com/Models/{model_number}/")),
        })
        .collect()
}

pub fn demo_edges() -> Vec<CompatibilityEdge> {
    SEED_ITEMS
        .iter()
        .flat_map(|seed| {
            seed.fits.iter().map(|model_number| CompatibilityEdge {
                item_id: ItemId(seed.id.to_string()),
                model_number: model_number.to_string(),
            })
        })
        .collect()
}

/// Idempotent: every write is an upsert.
pub async fn seed_demo_catalog(writer: &dyn CatalogWriter) -> Result<SeedResult, RepositoryError> {
    let mut result = SeedResult::default();

    for model in demo_models() {
        writer.save_model(model).await?;
        result.models += 1;
    }
    for item in demo_items() {
        writer.save_item(item).await?;
        result.items += 1;
    }
    for edge in demo_edges() {
        writer.link(edge).await?;
        result.edges += 1;
    }

    Ok(result)
}
