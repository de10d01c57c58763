//! Chat session routes and the per-turn orchestration.
//!
//! Endpoints:
//! - `POST   /api/v1/chat/sessions`                — start a session
//! - `GET    /api/v1/chat/sessions`                — caller's sessions, newest first
//! - `GET    /api/v1/chat/sessions/{id}`           — session detail
//! - `PUT    /api/v1/chat/sessions/{id}/title`     — rename
//! - `DELETE /api/v1/chat/sessions/{id}`           — delete (cascades turns)
//! - `GET    /api/v1/chat/sessions/{id}/messages`  — turns in creation order
//! - `POST   /api/v1/chat/sessions/{id}/messages`  — send a turn, get the reply
//! - `POST   /api/v1/chat/execute-proposal`        — apply an embedded proposal
//!
//! Ownership failures answer exactly like missing sessions so session ids
//! never leak across users.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use larder_agent::{build_system_prompt, Attachment, CompletionRequest, TurnMessage};
use larder_core::{
    auto_title, is_marked_executed, mark_executed, parse_proposal, render_inventory_context,
    AddItem, ApplicationError, ChatSession, ChatTurn, DomainError, MutationProposal, NewItem,
    ReduceItem, TurnRole, DEFAULT_SESSION_TITLE,
};
use larder_db::{ReduceOutcome, SqlChatRepository, SqlGroupRepository, SqlInventoryRepository};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{app_error, db_error, new_correlation_id, ErrorResponse};
use crate::auth::ActingUser;
use crate::bootstrap::AppState;

/// Marker appended to the stored user turn when an image rode along. The
/// binary itself is never persisted.
const ATTACHMENT_MARKER: &str = " [image attached]";

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub text: String,
    pub attachment: Option<String>,
    pub attachment_mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteProposalRequest {
    pub proposal_text: String,
    pub message_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteProposalResponse {
    pub success: bool,
    pub applied: usize,
    pub message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/chat/sessions", post(create_session).get(list_sessions))
        .route("/api/v1/chat/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/v1/chat/sessions/{id}/title", put(rename_session))
        .route("/api/v1/chat/sessions/{id}/messages", get(list_messages).post(send_message))
        .route("/api/v1/chat/execute-proposal", post(execute_proposal))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Session CRUD
// ---------------------------------------------------------------------------

async fn create_session(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<ChatSession>, ErrorResponse> {
    let title = body
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_SESSION_TITLE);

    let session = SqlChatRepository::new(state.pool.clone())
        .create_session(user.id, title)
        .await
        .map_err(db_error)?;

    info!(
        event_name = "chat.session.created",
        session_id = session.id,
        user_id = user.id,
        "chat session created"
    );
    Ok(Json(session))
}

async fn list_sessions(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
) -> Result<Json<Vec<ChatSession>>, ErrorResponse> {
    let sessions = SqlChatRepository::new(state.pool.clone())
        .sessions_for_user(user.id)
        .await
        .map_err(db_error)?;
    Ok(Json(sessions))
}

async fn get_session(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(session_id): Path<i64>,
) -> Result<Json<ChatSession>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let chat = SqlChatRepository::new(state.pool.clone());
    let session = resolve_owned_session(&chat, user.id, session_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;
    Ok(Json(session))
}

async fn rename_session(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(session_id): Path<i64>,
    Json(body): Json<RenameSessionRequest>,
) -> Result<Json<ChatSession>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let chat = SqlChatRepository::new(state.pool.clone());
    let mut session = resolve_owned_session(&chat, user.id, session_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;

    let title = body.title.trim();
    if title.is_empty() {
        return Err(app_error(
            DomainError::InvalidArgument("title must not be empty".to_string()).into(),
            &correlation_id,
        ));
    }

    chat.rename_session(session.id, title).await.map_err(db_error)?;
    session.title = title.to_string();
    Ok(Json(session))
}

async fn delete_session(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(session_id): Path<i64>,
) -> Result<StatusCode, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let chat = SqlChatRepository::new(state.pool.clone());
    let session = resolve_owned_session(&chat, user.id, session_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;

    chat.delete_session(session.id).await.map_err(db_error)?;
    info!(
        event_name = "chat.session.deleted",
        correlation_id = %correlation_id,
        session_id = session.id,
        "chat session deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(session_id): Path<i64>,
) -> Result<Json<Vec<ChatTurn>>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let chat = SqlChatRepository::new(state.pool.clone());
    let session = resolve_owned_session(&chat, user.id, session_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;

    let turns = chat.turns_for_session(session.id).await.map_err(db_error)?;
    Ok(Json(turns))
}

// ---------------------------------------------------------------------------
// Turn orchestration
// ---------------------------------------------------------------------------

async fn send_message(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(session_id): Path<i64>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let chat = SqlChatRepository::new(state.pool.clone());
    let inventory = SqlInventoryRepository::new(state.pool.clone());

    let session = resolve_owned_session(&chat, user.id, session_id)
        .await
        .map_err(|err| app_error(err, &correlation_id))?;

    let text = body.text;
    if text.trim().is_empty() && body.attachment.is_none() {
        return Err(app_error(
            DomainError::InvalidArgument("message text is required".to_string()).into(),
            &correlation_id,
        ));
    }

    let stored_text = if body.attachment.is_some() {
        format!("{text}{ATTACHMENT_MARKER}")
    } else {
        text.clone()
    };
    let user_turn =
        chat.append_turn(session.id, TurnRole::User, &stored_text).await.map_err(db_error)?;

    let lines = inventory.snapshot_for_user(user.id).await.map_err(db_error)?;
    let system = build_system_prompt(Utc::now().date_naive(), &render_inventory_context(&lines));

    let turns = chat.turns_for_session(session.id).await.map_err(db_error)?;
    let prior_turns = turns.len().saturating_sub(1);
    let history = turns
        .iter()
        .filter(|turn| turn.id != user_turn.id)
        .map(|turn| TurnMessage { role: turn.role, content: turn.content.clone() })
        .collect();

    let request = CompletionRequest {
        system,
        history,
        user_text: text.clone(),
        attachment: body.attachment.map(|base64_data| Attachment {
            base64_data,
            mime_type: body.attachment_mime_type,
        }),
    };

    // The user turn stays persisted even when the completion fails:
    // at-least-once for inbound messages, no rollback.
    let reply = state.llm.complete(request).await.map_err(|err| {
        app_error(ApplicationError::Upstream(err.to_string()), &correlation_id)
    })?;

    chat.append_turn(session.id, TurnRole::Assistant, &reply).await.map_err(db_error)?;

    if let Some(title) = auto_title(&session.title, prior_turns, &text) {
        chat.rename_session(session.id, &title).await.map_err(db_error)?;
    }

    info!(
        event_name = "chat.turn.completed",
        correlation_id = %correlation_id,
        session_id = session.id,
        user_id = user.id,
        "assistant turn persisted"
    );
    Ok(Json(SendMessageResponse { reply }))
}

// ---------------------------------------------------------------------------
// Proposal execution
// ---------------------------------------------------------------------------

async fn execute_proposal(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Json(body): Json<ExecuteProposalRequest>,
) -> Result<Json<ExecuteProposalResponse>, ErrorResponse> {
    let correlation_id = new_correlation_id();
    let chat = SqlChatRepository::new(state.pool.clone());
    let inventory = SqlInventoryRepository::new(state.pool.clone());
    let groups = SqlGroupRepository::new(state.pool.clone());

    // Resolve the source message first: an already-flagged message rejects
    // the whole request before any mutation is applied.
    let marker_turn = match body.message_id {
        Some(message_id) => match chat.find_turn(message_id).await.map_err(db_error)? {
            Some(turn) => {
                resolve_owned_session(&chat, user.id, turn.session_id)
                    .await
                    .map_err(|err| app_error(err, &correlation_id))?;
                if is_marked_executed(&turn.content) {
                    return Err(app_error(
                        DomainError::InvalidArgument("proposal already executed".to_string())
                            .into(),
                        &correlation_id,
                    ));
                }
                Some(turn)
            }
            None => {
                warn!(
                    event_name = "proposal.execute.message_missing",
                    correlation_id = %correlation_id,
                    message_id,
                    "source message no longer exists; executing without marking"
                );
                None
            }
        },
        None => None,
    };

    let proposal = parse_proposal(&body.proposal_text)
        .map_err(|err| app_error(err.into(), &correlation_id))?;

    let applied = match &proposal {
        MutationProposal::ReduceQuantity { items } => apply_reduce(&inventory, items).await,
        MutationProposal::AddItems { items } => {
            apply_add(&inventory, &groups, user.id, items).await
        }
    };

    if let Some(turn) = marker_turn {
        if let Some(updated) = mark_executed(&turn.content) {
            chat.update_turn_content(turn.id, &updated).await.map_err(db_error)?;
        }
    }

    info!(
        event_name = "proposal.execute.completed",
        correlation_id = %correlation_id,
        user_id = user.id,
        applied,
        "proposal executed"
    );
    Ok(Json(ExecuteProposalResponse {
        success: true,
        applied,
        message: "Proposal executed.".to_string(),
    }))
}

/// Each item applies in its own transaction; failures are logged and
/// skipped so one bad line never aborts the rest of the batch.
async fn apply_reduce(inventory: &SqlInventoryRepository, items: &[ReduceItem]) -> usize {
    let mut applied = 0;
    for item in items {
        match inventory.reduce_quantity(item.item_id, item.quantity).await {
            Ok(ReduceOutcome::NotFound) => {
                warn!(
                    event_name = "proposal.reduce.missing_item",
                    item_id = item.item_id,
                    "reduce target no longer exists; skipping"
                );
            }
            Ok(_) => applied += 1,
            Err(err) => {
                warn!(
                    event_name = "proposal.reduce.failed",
                    item_id = item.item_id,
                    error = %err,
                    "reduce failed; continuing batch"
                );
            }
        }
    }
    applied
}

async fn apply_add(
    inventory: &SqlInventoryRepository,
    groups: &SqlGroupRepository,
    user_id: i64,
    items: &[AddItem],
) -> usize {
    let mut applied = 0;
    let mut fallback_group: Option<Option<i64>> = None;

    for item in items {
        let group_id = match item.group_id {
            Some(group_id) => match groups.is_member(group_id, user_id).await {
                Ok(true) => Some(group_id),
                Ok(false) => {
                    warn!(
                        event_name = "proposal.add.group_unavailable",
                        group_id,
                        item_name = %item.name,
                        "proposed group is not available to the caller; skipping item"
                    );
                    None
                }
                Err(err) => {
                    warn!(
                        event_name = "proposal.add.failed",
                        item_name = %item.name,
                        error = %err,
                        "membership lookup failed; skipping item"
                    );
                    None
                }
            },
            None => {
                if fallback_group.is_none() {
                    fallback_group = Some(first_group(groups, user_id).await);
                }
                fallback_group.flatten()
            }
        };

        let Some(group_id) = group_id else {
            continue;
        };

        let draft = NewItem {
            name: item.name.clone(),
            quantity: Some(item.quantity),
            price: None,
            kind: item.kind,
            expiry_date: item.expiry_date,
            condition: None,
        };

        match inventory.add_item(group_id, &draft, &item.category, Some(user_id)).await {
            Ok(_) => applied += 1,
            Err(err) => {
                warn!(
                    event_name = "proposal.add.failed",
                    item_name = %item.name,
                    error = %err,
                    "add failed; continuing batch"
                );
            }
        }
    }
    applied
}

async fn first_group(groups: &SqlGroupRepository, user_id: i64) -> Option<i64> {
    match groups.first_group_id_for_user(user_id).await {
        Ok(Some(group_id)) => Some(group_id),
        Ok(None) => {
            warn!(
                event_name = "proposal.add.no_fallback_group",
                user_id,
                "caller belongs to no group; items without a group id are skipped"
            );
            None
        }
        Err(err) => {
            warn!(
                event_name = "proposal.add.failed",
                user_id,
                error = %err,
                "fallback group lookup failed"
            );
            None
        }
    }
}

async fn resolve_owned_session(
    chat: &SqlChatRepository,
    user_id: i64,
    session_id: i64,
) -> Result<ChatSession, ApplicationError> {
    let session = chat
        .find_session(session_id)
        .await
        .map_err(|err| ApplicationError::Persistence(err.to_string()))?;

    match session {
        None => Err(ApplicationError::NotFound { entity: "chat session" }),
        Some(session) if session.user_id != user_id => {
            Err(ApplicationError::Unauthorized { entity: "chat session" })
        }
        Some(session) => Ok(session),
    }
}
