//! A service for interacting with items.
//!
//! Holds the business rules of the inventory API: the shared unit
//! membership check and the field-merge semantics of partial updates.

use crate::{
    api::item::item_repository::{self, Item, NewItem, Unit, UpdateItem},
    infra::{database::Tx, error::ApiResult, error::ClientError, validation::Valid},
};
use tracing::instrument;

/// Creates a new item.
///
/// Field validation has already happened via [`Valid`]; the unit
/// membership check happens here so an unknown unit surfaces as a
/// conflict rather than a validation failure.
#[instrument(skip(tx))]
pub async fn create_item(tx: &mut Tx, new_item: Valid<NewItem>) -> ApiResult<Item> {
    let new_item = new_item.into_inner();
    let unit: Unit = new_item.unit.parse()?;
    item_repository::insert_item(tx, &new_item.name, new_item.amount, unit).await
}

/// Reads an item.
#[instrument(skip(tx))]
pub async fn read_item(tx: &mut Tx, id: i32) -> ApiResult<Option<Item>> {
    item_repository::fetch_item(tx, id).await
}

/// Partially updates an item.
///
/// Present fields replace the stored ones in the order amount, name,
/// unit; absent fields are left untouched. An unknown unit aborts the
/// whole update, so fields merged before it are never persisted.
#[instrument(skip(tx))]
pub async fn update_item(tx: &mut Tx, id: i32, update: Valid<UpdateItem>) -> ApiResult<Item> {
    let update = update.into_inner();
    let mut item = item_repository::fetch_item(tx, id)
        .await?
        .ok_or(ClientError::MissingItem)?;
    if let Some(amount) = update.amount {
        item.amount = amount;
    }
    if let Some(name) = update.name {
        item.name = name;
    }
    if let Some(unit) = update.unit {
        item.unit = unit.parse::<Unit>()?.as_str().to_string();
    }
    item_repository::update_item(tx, &item).await
}

/// Deletes an item. Returns whether it existed.
#[instrument(skip(tx))]
pub async fn delete_item(tx: &mut Tx, id: i32) -> ApiResult<bool> {
    item_repository::delete_item(tx, id).await
}

/// Lists items, optionally filtered by a case-insensitive name substring.
#[instrument(skip(tx))]
pub async fn list_items(tx: &mut Tx, name: Option<&str>) -> ApiResult<Vec<Item>> {
    match name {
        Some(name) => item_repository::search_items(tx, name).await,
        None => item_repository::list_items(tx).await,
    }
}
