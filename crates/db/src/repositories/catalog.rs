use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Row, Sqlite};

use partsage_core::domain::catalog::{
    CatalogField, CatalogQuery, CatalogResult, CatalogTarget, FieldFilter, FieldKind, FilterOp,
    FilterValue, ItemField, ModelField, SortDirection,
};
use partsage_core::domain::item::{
    ApplianceCategory, ApplianceModel, CompatibilityEdge, Item, ItemId,
};

use super::{CatalogRepository, CatalogWriter, RepositoryError};
use crate::DbPool;

const PART_COLUMNS: &str = "p.id, p.name, p.manufacturer_part_number, p.brand, p.category,
    p.current_price, p.original_price, p.rating, p.review_count, p.in_stock, p.availability,
    p.description, p.symptoms, p.installation_difficulty, p.image_url, p.video_url,
    p.product_url";

const MODEL_COLUMNS: &str = "m.model_number, m.brand, m.category, m.description, m.model_url";

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn query_items(&self, query: &CatalogQuery) -> Result<Vec<Item>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {PART_COLUMNS} FROM part p"));
        if let Some(model_number) = &query.compatible_with {
            builder.push(
                " JOIN part_model_compatibility c ON c.part_id = p.id AND c.model_number = ",
            );
            builder.push_bind(model_number.trim().to_string());
            builder.push(" COLLATE NOCASE");
        }
        push_filters(&mut builder, &query.filters);

        builder.push(" ORDER BY ");
        match &query.order_by {
            Some(order) => {
                push_order_term(&mut builder, order.field, order.direction);
                builder.push(", p.id ASC");
            }
            None => {
                builder.push(
                    "CAST(p.rating AS REAL) DESC NULLS LAST, p.review_count DESC, p.id ASC",
                );
            }
        }
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(query.limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn query_models(
        &self,
        query: &CatalogQuery,
    ) -> Result<Vec<ApplianceModel>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {MODEL_COLUMNS} FROM appliance_model m"));
        if let Some(item_id) = &query.compatible_with {
            builder.push(
                " JOIN part_model_compatibility c ON c.model_number = m.model_number AND c.part_id = ",
            );
            builder.push_bind(item_id.trim().to_string());
            builder.push(" COLLATE NOCASE");
        }
        push_filters(&mut builder, &query.filters);

        builder.push(" ORDER BY ");
        match &query.order_by {
            Some(order) => {
                push_order_term(&mut builder, order.field, order.direction);
                builder.push(", m.model_number ASC");
            }
            None => {
                builder.push("m.model_number ASC");
            }
        }
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(query.limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_model).collect()
    }
}

fn item_column(field: ItemField) -> &'static str {
    match field {
        ItemField::Id => "p.id",
        ItemField::Name => "p.name",
        ItemField::ManufacturerPartNumber => "p.manufacturer_part_number",
        ItemField::Brand => "p.brand",
        ItemField::Category => "p.category",
        ItemField::CurrentPrice => "p.current_price",
        ItemField::OriginalPrice => "p.original_price",
        ItemField::Rating => "p.rating",
        ItemField::ReviewCount => "p.review_count",
        ItemField::InStock => "p.in_stock",
        ItemField::Description => "p.description",
        ItemField::Symptoms => "p.symptoms",
        ItemField::InstallationDifficulty => "p.installation_difficulty",
    }
}

fn model_column(field: ModelField) -> &'static str {
    match field {
        ModelField::ModelNumber => "m.model_number",
        ModelField::Brand => "m.brand",
        ModelField::Category => "m.category",
        ModelField::Description => "m.description",
    }
}

fn column(field: CatalogField) -> &'static str {
    match field {
        CatalogField::Item(field) => item_column(field),
        CatalogField::Model(field) => model_column(field),
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &[FieldFilter]) {
    for (index, filter) in filters.iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        push_filter(builder, filter);
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &FieldFilter) {
    let column = column(filter.field);
    match (&filter.value, filter.op) {
        // Symptoms are a JSON array; match per element, never the encoded text.
        (FilterValue::Text(text), op) if filter.field == CatalogField::Item(ItemField::Symptoms) => {
            builder.push(format!("EXISTS (SELECT 1 FROM json_each({column}) AS j WHERE j.value "));
            if op == FilterOp::Contains {
                builder.push("LIKE ");
                builder.push_bind(format!("%{}%", escape_like(text.trim())));
                builder.push(" ESCAPE '\\')");
            } else {
                builder.push("= ");
                builder.push_bind(text.trim().to_string());
                builder.push(" COLLATE NOCASE)");
            }
        }
        (FilterValue::Text(text), FilterOp::Contains) => {
            builder.push(format!("{column} LIKE "));
            builder.push_bind(format!("%{}%", escape_like(text.trim())));
            builder.push(" ESCAPE '\\'");
        }
        (FilterValue::Text(text), _) => {
            builder.push(format!("{column} = "));
            builder.push_bind(text.trim().to_string());
            builder.push(" COLLATE NOCASE");
        }
        (FilterValue::Number(number), op) => {
            let comparator = match op {
                FilterOp::Gte => ">=",
                FilterOp::Lte => "<=",
                _ => "=",
            };
            builder.push(format!("CAST({column} AS REAL) {comparator} "));
            builder.push_bind(number.to_f64().unwrap_or_default());
        }
        (FilterValue::Bool(flag), _) => {
            builder.push(format!("{column} = "));
            builder.push_bind(i64::from(*flag));
        }
        (FilterValue::Category(category), _) => {
            builder.push(format!("{column} = "));
            builder.push_bind(category.as_str());
        }
    }
}

fn push_order_term(
    builder: &mut QueryBuilder<'_, Sqlite>,
    field: CatalogField,
    direction: SortDirection,
) {
    let column = column(field);
    let direction = match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    if field.kind() == FieldKind::Numeric {
        builder.push(format!("CAST({column} AS REAL) {direction} NULLS LAST"));
    } else {
        builder.push(format!("{column} COLLATE NOCASE {direction}"));
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| RepositoryError::Decode(format!("{column} `{raw}`: {e}")))
}

fn parse_category(raw: &str) -> Result<ApplianceCategory, RepositoryError> {
    ApplianceCategory::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unsupported appliance category `{raw}`")))
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<Item, RepositoryError> {
    let current_price: String = decode(row, "current_price")?;
    let original_price: String = decode(row, "original_price")?;
    let rating: Option<String> = decode(row, "rating")?;
    let review_count: i64 = decode(row, "review_count")?;
    let in_stock: i64 = decode(row, "in_stock")?;
    let category: String = decode(row, "category")?;
    let symptoms: String = decode(row, "symptoms")?;

    Ok(Item {
        id: ItemId(decode(row, "id")?),
        name: decode(row, "name")?,
        manufacturer_part_number: decode(row, "manufacturer_part_number")?,
        brand: decode(row, "brand")?,
        category: parse_category(&category)?,
        current_price: parse_decimal("current_price", &current_price)?,
        original_price: parse_decimal("original_price", &original_price)?,
        rating: rating.as_deref().map(|raw| parse_decimal("rating", raw)).transpose()?,
        review_count: u32::try_from(review_count)
            .map_err(|e| RepositoryError::Decode(format!("review_count: {e}")))?,
        in_stock: in_stock != 0,
        availability: decode(row, "availability")?,
        description: decode(row, "description")?,
        symptoms: serde_json::from_str(&symptoms)
            .map_err(|e| RepositoryError::Decode(format!("symptoms: {e}")))?,
        installation_difficulty: decode(row, "installation_difficulty")?,
        image_url: decode(row, "image_url")?,
        video_url: decode(row, "video_url")?,
        product_url: decode(row, "product_url")?,
    })
}

fn row_to_model(row: &sqlx::sqlite::SqliteRow) -> Result<ApplianceModel, RepositoryError> {
    let category: String = decode(row, "category")?;
    Ok(ApplianceModel {
        model_number: decode(row, "model_number")?,
        brand: decode(row, "brand")?,
        category: parse_category(&category)?,
        description: decode(row, "description")?,
        model_url: decode(row, "model_url")?,
    })
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn query(&self, query: &CatalogQuery) -> Result<CatalogResult, RepositoryError> {
        match query.target {
            CatalogTarget::Items => {
                Ok(CatalogResult { items: self.query_items(query).await?, models: Vec::new() })
            }
            CatalogTarget::Models => {
                Ok(CatalogResult { items: Vec::new(), models: self.query_models(query).await? })
            }
        }
    }

    async fn find_item(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PART_COLUMNS} FROM part p WHERE p.id = ? COLLATE NOCASE"
        ))
        .bind(id.as_str().trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn compatible_models(
        &self,
        id: &ItemId,
        limit: u32,
    ) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT model_number FROM part_model_compatibility
             WHERE part_id = ? COLLATE NOCASE
             ORDER BY model_number ASC
             LIMIT ?",
        )
        .bind(id.as_str().trim())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| decode::<String>(row, "model_number")).collect()
    }
}

#[async_trait::async_trait]
impl CatalogWriter for SqlCatalogRepository {
    async fn save_item(&self, item: Item) -> Result<(), RepositoryError> {
        let symptoms = serde_json::to_string(&item.symptoms)
            .map_err(|e| RepositoryError::Decode(format!("symptoms: {e}")))?;

        sqlx::query(
            "INSERT INTO part (id, name, manufacturer_part_number, brand, category, current_price,
                               original_price, rating, review_count, in_stock, availability,
                               description, symptoms, installation_difficulty, image_url,
                               video_url, product_url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 manufacturer_part_number = excluded.manufacturer_part_number,
                 brand = excluded.brand,
                 category = excluded.category,
                 current_price = excluded.current_price,
                 original_price = excluded.original_price,
                 rating = excluded.rating,
                 review_count = excluded.review_count,
                 in_stock = excluded.in_stock,
                 availability = excluded.availability,
                 description = excluded.description,
                 symptoms = excluded.symptoms,
                 installation_difficulty = excluded.installation_difficulty,
                 image_url = excluded.image_url,
                 video_url = excluded.video_url,
                 product_url = excluded.product_url",
        )
        .bind(item.id.as_str())
        .bind(&item.name)
        .bind(&item.manufacturer_part_number)
        .bind(&item.brand)
        .bind(item.category.as_str())
        .bind(item.current_price.to_string())
        .bind(item.original_price.to_string())
        .bind(item.rating.map(|rating| rating.to_string()))
        .bind(i64::from(item.review_count))
        .bind(i64::from(item.in_stock))
        .bind(&item.availability)
        .bind(&item.description)
        .bind(symptoms)
        .bind(&item.installation_difficulty)
        .bind(&item.image_url)
        .bind(&item.video_url)
        .bind(&item.product_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_model(&self, model: ApplianceModel) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO appliance_model (model_number, brand, category, description, model_url)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(model_number) DO UPDATE SET
                 brand = excluded.brand,
                 category = excluded.category,
                 description = excluded.description,
                 model_url = excluded.model_url",
        )
        .bind(&model.model_number)
        .bind(&model.brand)
        .bind(model.category.as_str())
        .bind(&model.description)
        .bind(&model.model_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn link(&self, edge: CompatibilityEdge) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO part_model_compatibility (part_id, model_number) VALUES (?, ?)
             ON CONFLICT(part_id, model_number) DO NOTHING",
        )
        .bind(edge.item_id.as_str())
        .bind(&edge.model_number)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
