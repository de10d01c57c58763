//! Plain item CRUD, scoped to group membership.
//!
//! - `GET    /api/v1/items/group/{groupId}` — items in a group
//! - `POST   /api/v1/items/group/{groupId}` — create via the kind factory
//! - `GET    /api/v1/items/search?q=`       — name/category search
//! - `PUT    /api/v1/items/{id}`            — update
//! - `DELETE /api/v1/items/{id}`            — delete

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use larder_core::{ApplicationError, DomainError, InventoryItem, NewItem};
use larder_db::{SqlGroupRepository, SqlInventoryRepository};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::api::{app_error, db_error, new_correlation_id, ErrorResponse};
use crate::auth::ActingUser;
use crate::bootstrap::AppState;
use crate::groups::resolve_member_group;

const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub name: String,
    pub quantity: Option<i64>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub condition: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/items/group/{group_id}", get(list_items).post(create_item))
        .route("/api/v1/items/search", get(search_items))
        .route("/api/v1/items/{id}", axum::routing::put(update_item).delete(delete_item))
        .with_state(state)
}

fn validate_payload(payload: &ItemPayload) -> Result<(), ApplicationError> {
    if payload.name.trim().is_empty() {
        return Err(DomainError::InvalidArgument("item name must not be empty".to_string()).into());
    }
    if matches!(payload.quantity, Some(quantity) if quantity < 0) {
        return Err(
            DomainError::InvalidArgument("quantity must not be negative".to_string()).into()
        );
    }
    Ok(())
}

fn draft_from_payload(payload: &ItemPayload) -> NewItem {
    NewItem::from_wire(
        payload.kind.as_deref(),
        payload.name.trim(),
        payload.quantity,
        payload.price,
        payload.expiry_date,
        payload.condition.as_deref(),
    )
}

fn category_of(payload: &ItemPayload) -> &str {
    payload
        .category
        .as_deref()
        .map(str::trim)
        .filter(|category| !category.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
}

async fn list_items(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<InventoryItem>>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let groups = SqlGroupRepository::new(state.pool.clone());
    resolve_member_group(&groups, user.id, group_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;

    let items = SqlInventoryRepository::new(state.pool.clone())
        .items_for_group(group_id)
        .await
        .map_err(db_error)?;
    Ok(Json(items))
}

async fn create_item(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(group_id): Path<i64>,
    Json(payload): Json<ItemPayload>,
) -> Result<Json<InventoryItem>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let groups = SqlGroupRepository::new(state.pool.clone());
    resolve_member_group(&groups, user.id, group_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;
    validate_payload(&payload).map_err(|err| app_error(err, &correlation_id))?;

    let item = SqlInventoryRepository::new(state.pool.clone())
        .add_item(group_id, &draft_from_payload(&payload), category_of(&payload), Some(user.id))
        .await
        .map_err(db_error)?;

    info!(
        event_name = "inventory.item.created",
        correlation_id = %correlation_id,
        item_id = item.id,
        group_id,
        "inventory item created"
    );
    Ok(Json(item))
}

async fn search_items(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<InventoryItem>>, ErrorResponse> {
    let items = SqlInventoryRepository::new(state.pool.clone())
        .search_for_user(user.id, &params.q)
        .await
        .map_err(db_error)?;
    Ok(Json(items))
}

async fn update_item(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(item_id): Path<i64>,
    Json(payload): Json<ItemPayload>,
) -> Result<Json<InventoryItem>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let inventory = SqlInventoryRepository::new(state.pool.clone());
    let existing = resolve_visible_item(&state, &inventory, user.id, item_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;
    validate_payload(&payload).map_err(|err| app_error(err, &correlation_id))?;

    let updated = inventory
        .update_item(existing.id, &draft_from_payload(&payload), category_of(&payload))
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            app_error(ApplicationError::NotFound { entity: "inventory item" }, &correlation_id)
        })?;

    Ok(Json(updated))
}

async fn delete_item(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(item_id): Path<i64>,
) -> Result<StatusCode, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let inventory = SqlInventoryRepository::new(state.pool.clone());
    let existing = resolve_visible_item(&state, &inventory, user.id, item_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;

    inventory.delete_item(existing.id).await.map_err(db_error)?;
    info!(
        event_name = "inventory.item.deleted",
        correlation_id = %correlation_id,
        item_id = existing.id,
        "inventory item deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn resolve_visible_item(
    state: &AppState,
    inventory: &SqlInventoryRepository,
    user_id: i64,
    item_id: i64,
) -> Result<InventoryItem, ApplicationError> {
    let item = inventory
        .find_item(item_id)
        .await
        .map_err(|err| ApplicationError::Persistence(err.to_string()))?
        .ok_or(ApplicationError::NotFound { entity: "inventory item" })?;

    let member = SqlGroupRepository::new(state.pool.clone())
        .is_member(item.group_id, user_id)
        .await
        .map_err(|err| ApplicationError::Persistence(err.to_string()))?;
    if !member {
        return Err(ApplicationError::Unauthorized { entity: "inventory item" });
    }

    Ok(item)
}
