//! The item API implementation.

use crate::{
    api::item::{
        item_repository::{Item, NewItem, UpdateItem},
        item_service,
    },
    infra::{
        database::DbPool,
        error::{ApiResult, ClientError, ErrorBody, StatusBody},
        extract::{Json, Query},
        state::AppState,
        validation::Valid,
    },
};
use axum::{extract::State, Router};
use axum_extra::routing::{RouterExt, TypedPath};
use http::{header, HeaderName, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::IntoParams;

/// The item API endpoints.
pub fn routes() -> Router<AppState> {
    Router::new()
        .typed_get(list_items)
        .typed_post(create_item)
        .typed_get(get_item)
        .typed_patch(update_item)
        .typed_delete(delete_item)
}

#[derive(Deserialize, TypedPath)]
#[typed_path("/items", rejection(ClientError))]
struct Items;

#[derive(Deserialize, TypedPath)]
#[typed_path("/items/:id", rejection(ClientError))]
struct ItemsId(i32);

/// The location of an item resource.
fn item_location(item: &Item) -> [(HeaderName, String); 1] {
    [(header::LOCATION, format!("/api/items/{}", item.id))]
}

/// Filters for listing items.
#[derive(Clone, Debug, Default, Serialize, Deserialize, IntoParams)]
pub struct ListParams {
    /// Only include items whose name contains this substring,
    /// case-insensitively. An empty string matches every item.
    name: Option<String>,
}

/// Lists all items, or searches them by name.
#[utoipa::path(
    get,
    path = "/api/items",
    params(ListParams),
    responses(
        (status = 200, description = "Success", body = [Item]),
        (status = 500, description = "Internal Server Error", body = ErrorBody),
    )
)]
#[instrument(skip_all, fields(params))]
pub(crate) async fn list_items(
    Items: Items,
    db: State<DbPool>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Item>>> {
    let mut tx = db.begin().await?;
    let items = item_service::list_items(&mut tx, params.name.as_deref()).await?;
    tx.commit().await?;
    Ok(Json(items))
}

/// Gets an item.
#[utoipa::path(
    get,
    path = "/api/items/{id}",
    responses(
        (status = 200, description = "Ok", body = Item),
        (status = 404, description = "Not Found"),
        (status = 500, description = "Internal Server Error", body = ErrorBody),
    )
)]
#[instrument(skip_all, fields(id))]
pub(crate) async fn get_item(ItemsId(id): ItemsId, db: State<DbPool>) -> ApiResult<(StatusCode, Json<Item>)> {
    let mut tx = db.begin().await?;
    let item = item_service::read_item(&mut tx, id)
        .await?
        .ok_or(ClientError::NotFound)?;
    tx.commit().await?;
    Ok((StatusCode::OK, Json(item)))
}

/// Creates a new item.
#[utoipa::path(
    post,
    path = "/api/items",
    request_body = NewItem,
    responses(
        (status = 201, description = "Created", body = Item),
        (status = 400, description = "Bad Request", body = ErrorBody),
        (status = 409, description = "Conflict", body = ErrorBody),
        (status = 500, description = "Internal Server Error", body = ErrorBody),
    )
)]
#[instrument(skip_all, fields(new_item))]
pub(crate) async fn create_item(
    Items: Items,
    db: State<DbPool>,
    Json(new_item): Json<NewItem>,
) -> ApiResult<(StatusCode, [(HeaderName, String); 1], Json<Item>)> {
    let new_item = Valid::new(new_item)?;
    let mut tx = db.begin().await?;
    let item = item_service::create_item(&mut tx, new_item).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, item_location(&item), Json(item)))
}

/// Partially updates an item.
///
/// Responds with 201 on success and 409 when the id does not exist;
/// both are part of the published contract.
#[utoipa::path(
    patch,
    path = "/api/items/{id}",
    request_body = UpdateItem,
    responses(
        (status = 201, description = "Created", body = Item),
        (status = 400, description = "Bad Request", body = ErrorBody),
        (status = 409, description = "Conflict", body = ErrorBody),
        (status = 500, description = "Internal Server Error", body = ErrorBody),
    )
)]
#[instrument(skip_all, fields(id))]
pub(crate) async fn update_item(
    ItemsId(id): ItemsId,
    db: State<DbPool>,
    Json(update): Json<UpdateItem>,
) -> ApiResult<(StatusCode, [(HeaderName, String); 1], Json<Item>)> {
    let update = Valid::new(update)?;
    let mut tx = db.begin().await?;
    let item = item_service::update_item(&mut tx, id, update).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, item_location(&item), Json(item)))
}

/// Deletes an item.
///
/// Always responds with 200; the body reports whether the item existed.
#[utoipa::path(
    delete,
    path = "/api/items/{id}",
    responses(
        (status = 200, description = "Ok", body = StatusBody),
        (status = 500, description = "Internal Server Error", body = ErrorBody),
    )
)]
#[instrument(skip_all, fields(id))]
pub(crate) async fn delete_item(ItemsId(id): ItemsId, db: State<DbPool>) -> ApiResult<Json<StatusBody>> {
    let mut tx = db.begin().await?;
    let deleted = item_service::delete_item(&mut tx, id).await?;
    tx.commit().await?;
    let status = if deleted {
        StatusBody::ok()
    } else {
        StatusBody::failed(ClientError::MissingItem.to_string())
    };
    Ok(Json(status))
}
