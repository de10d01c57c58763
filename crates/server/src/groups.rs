//! Inventory group routes: shared namespaces with join-code enrollment.
//!
//! - `GET    /api/v1/groups`        — groups the caller belongs to
//! - `POST   /api/v1/groups`        — create (caller enrolled, code generated)
//! - `POST   /api/v1/groups/join`   — join by code
//! - `GET    /api/v1/groups/{id}`   — detail, members only
//! - `DELETE /api/v1/groups/{id}`   — owner deletes, member leaves

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use larder_core::{ApplicationError, DomainError, InventoryGroup};
use larder_db::SqlGroupRepository;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::{app_error, db_error, new_correlation_id, ErrorResponse};
use crate::auth::ActingUser;
use crate::bootstrap::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinGroupRequest {
    pub code: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/groups", post(create_group).get(list_groups))
        .route("/api/v1/groups/join", post(join_group))
        .route("/api/v1/groups/{id}", get(get_group).delete(delete_group))
        .with_state(state)
}

/// Six uppercase characters from a v4 UUID, shown to users for sharing.
fn generate_join_code() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_ascii_uppercase()
}

async fn create_group(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Json(body): Json<CreateGroupRequest>,
) -> Result<Json<InventoryGroup>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let name = body.name.trim();
    if name.is_empty() {
        return Err(app_error(
            DomainError::InvalidArgument("group name must not be empty".to_string()).into(),
            &correlation_id,
        ));
    }

    let join_code = generate_join_code();
    let group = SqlGroupRepository::new(state.pool.clone())
        .create(name, &join_code, user.id)
        .await
        .map_err(db_error)?;

    info!(
        event_name = "group.created",
        correlation_id = %correlation_id,
        group_id = group.id,
        user_id = user.id,
        "inventory group created"
    );
    Ok(Json(group))
}

async fn list_groups(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
) -> Result<Json<Vec<InventoryGroup>>, ErrorResponse> {
    let groups = SqlGroupRepository::new(state.pool.clone())
        .groups_for_user(user.id)
        .await
        .map_err(db_error)?;
    Ok(Json(groups))
}

async fn join_group(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Json(body): Json<JoinGroupRequest>,
) -> Result<Json<InventoryGroup>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let group = SqlGroupRepository::new(state.pool.clone())
        .join_by_code(&body.code, user.id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            app_error(ApplicationError::NotFound { entity: "inventory group" }, &correlation_id)
        })?;

    info!(
        event_name = "group.joined",
        correlation_id = %correlation_id,
        group_id = group.id,
        user_id = user.id,
        "user joined inventory group"
    );
    Ok(Json(group))
}

async fn get_group(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(group_id): Path<i64>,
) -> Result<Json<InventoryGroup>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let repo = SqlGroupRepository::new(state.pool.clone());
    let group = resolve_member_group(&repo, user.id, group_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;
    Ok(Json(group))
}

/// Owner deletion removes the whole group (items cascade); a member
/// deletion is a leave.
async fn delete_group(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(group_id): Path<i64>,
) -> Result<StatusCode, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let repo = SqlGroupRepository::new(state.pool.clone());
    let group = resolve_member_group(&repo, user.id, group_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;

    if group.created_by == user.id {
        repo.delete(group.id).await.map_err(db_error)?;
        info!(
            event_name = "group.deleted",
            correlation_id = %correlation_id,
            group_id = group.id,
            "inventory group deleted by owner"
        );
    } else {
        repo.remove_member(group.id, user.id).await.map_err(db_error)?;
        info!(
            event_name = "group.member_left",
            correlation_id = %correlation_id,
            group_id = group.id,
            user_id = user.id,
            "member left inventory group"
        );
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn resolve_member_group(
    repo: &SqlGroupRepository,
    user_id: i64,
    group_id: i64,
) -> Result<InventoryGroup, ApplicationError> {
    let group = repo
        .find_by_id(group_id)
        .await
        .map_err(|err| ApplicationError::Persistence(err.to_string()))?
        .ok_or(ApplicationError::NotFound { entity: "inventory group" })?;

    let member = repo
        .is_member(group_id, user_id)
        .await
        .map_err(|err| ApplicationError::Persistence(err.to_string()))?;
    if !member {
        return Err(ApplicationError::Unauthorized { entity: "inventory group" });
    }

    Ok(group)
}
