//! Types and functions for storing and loading items from the database.

use crate::infra::{
    database::Tx,
    error::{ApiResult, ClientError},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::{instrument, Instrument};
use utoipa::ToSchema;
use validator::Validate;

/// The closed set of unit-of-measure codes an item may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    /// Pieces ("styck").
    St,
    /// Packs ("förpackningar").
    Fp,
    /// Bottles ("flaskor").
    Fl,
    /// Boxes.
    Lador,
    /// Pairs.
    Par,
    /// Sets.
    Set,
    /// Rolls.
    Rullar,
}

impl Unit {
    /// Every allowed unit.
    pub const ALL: [Unit; 7] = [
        Unit::St,
        Unit::Fp,
        Unit::Fl,
        Unit::Lador,
        Unit::Par,
        Unit::Set,
        Unit::Rullar,
    ];

    /// The wire representation of the unit.
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::St => "st",
            Unit::Fp => "fp",
            Unit::Fl => "fl",
            Unit::Lador => "lådor",
            Unit::Par => "par",
            Unit::Set => "set",
            Unit::Rullar => "rullar",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::ALL
            .into_iter()
            .find(|unit| unit.as_str() == s)
            .ok_or(ClientError::UnknownUnit)
    }
}

/// A new item.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewItem {
    /// The item's name.
    #[schema(example = "Bolt M6")]
    #[validate(custom(function = "crate::infra::validation::non_blank"))]
    pub name: String,
    /// How many of the item are in stock.
    #[schema(example = 100)]
    #[validate(range(min = 0))]
    pub amount: i32,
    /// The item's unit of measure.
    #[schema(example = "st")]
    #[validate(custom(function = "crate::infra::validation::non_blank"))]
    pub unit: String,
}

/// A partial update of an item. Absent fields are left untouched.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateItem {
    /// A new name for the item.
    #[schema(example = "Bolt M8")]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "crate::infra::validation::non_blank"))]
    pub name: Option<String>,
    /// A new stock amount.
    #[schema(example = 50)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0))]
    pub amount: Option<i32>,
    /// A new unit of measure.
    #[schema(example = "fp")]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "crate::infra::validation::non_blank"))]
    pub unit: Option<String>,
}

/// An existing item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// The item's id.
    pub id: i32,
    /// The item's name.
    #[schema(example = "Bolt M6")]
    pub name: String,
    /// How many of the item are in stock.
    #[schema(example = 100)]
    pub amount: i32,
    /// The item's unit of measure.
    #[schema(example = "st")]
    pub unit: String,
    /// When the item was last written. Set by the store on every write.
    pub last_updated: DateTime<Utc>,
}

/// Creates a new item.
#[instrument(skip(tx))]
pub async fn insert_item(tx: &mut Tx, name: &str, amount: i32, unit: Unit) -> ApiResult<Item> {
    tracing::info!("Creating item {:?}", name);
    let item = sqlx::query_as::<_, Item>(
        r#"
        INSERT INTO items (name, amount, unit)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(amount)
    .bind(unit.as_str())
    .fetch_one(tx.as_mut())
    .await?;
    tracing::info!("Created item {:?}", item);
    Ok(item)
}

/// Reads an item.
#[instrument(skip(tx))]
pub async fn fetch_item(tx: &mut Tx, id: i32) -> ApiResult<Option<Item>> {
    tracing::info!("Reading item");
    let item = sqlx::query_as::<_, Item>(
        r#"
        SELECT * FROM items
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(tx.as_mut())
    .instrument(tracing::info_span!("fetch_optional"))
    .await?;
    tracing::info!("Found item: {:?}", item);
    Ok(item)
}

/// Persists every field of an existing item.
/// The row's `last_updated` is refreshed by the store.
#[instrument(skip(tx))]
pub async fn update_item(tx: &mut Tx, item: &Item) -> ApiResult<Item> {
    tracing::info!("Updating item {:?}", item);
    let item = sqlx::query_as::<_, Item>(
        r#"
        UPDATE items
        SET name = $2, amount = $3, unit = $4
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(item.id)
    .bind(&item.name)
    .bind(item.amount)
    .bind(&item.unit)
    .fetch_one(tx.as_mut())
    .await?;
    tracing::info!("Updated item {:?}", item);
    Ok(item)
}

/// Deletes an item. Returns whether a row was removed.
#[instrument(skip(tx))]
pub async fn delete_item(tx: &mut Tx, id: i32) -> ApiResult<bool> {
    tracing::info!("Deleting item {:?}", id);
    let rows = sqlx::query(
        r#"
        DELETE FROM items
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(tx.as_mut())
    .await?;
    let deleted = rows.rows_affected() > 0;
    if deleted {
        tracing::info!("Deleted item");
    } else {
        tracing::warn!("Item not found");
    }
    Ok(deleted)
}

/// Lists all items.
#[instrument(skip(tx))]
pub async fn list_items(tx: &mut Tx) -> ApiResult<Vec<Item>> {
    tracing::info!("Listing items");
    let items = sqlx::query_as::<_, Item>(
        r#"
        SELECT * FROM items
        ORDER BY id
        "#,
    )
    .fetch_all(tx.as_mut())
    .instrument(tracing::info_span!("fetch_all"))
    .await?;
    tracing::info!("Listed {} items", items.len());
    Ok(items)
}

/// Lists items whose name contains the given substring, case-insensitively.
/// An empty needle matches every item.
#[instrument(skip(tx))]
pub async fn search_items(tx: &mut Tx, name: &str) -> ApiResult<Vec<Item>> {
    tracing::info!("Searching items by name {:?}", name);
    let items = sqlx::query_as::<_, Item>(
        r#"
        SELECT * FROM items
        WHERE position(lower($1) in lower(name)) > 0
        ORDER BY id
        "#,
    )
    .bind(name)
    .fetch_all(tx.as_mut())
    .instrument(tracing::info_span!("fetch_all"))
    .await?;
    tracing::info!("Found {} items", items.len());
    Ok(items)
}
