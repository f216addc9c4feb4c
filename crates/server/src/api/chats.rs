//! Chat CRUD endpoints: list, create, get, delete.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_core::{new_chat_id, ChatMessage};

use crate::session::DEFAULT_TITLE;
use crate::state::AppState;

use super::{internal, not_found, ApiError, ErrorResponse};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateChatResponse {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ChatEntry {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatEntry>,
}

#[derive(Debug, Serialize)]
pub struct ChatDetailResponse {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub online: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DeleteChatResponse {
    pub ok: bool,
}

/// List all chats
///
/// Newest first; `online` marks chats with a live session.
#[utoipa::path(
    get,
    path = "/api/chats",
    tag = "Chats",
    responses(
        (status = 200, description = "Chat summaries, newest first", body = Object),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn chats_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ChatListResponse>, ApiError> {
    let summaries = state
        .store
        .list()
        .await
        .map_err(|e| internal(format!("Failed to list chats: {e}")))?;
    let live = state.registry.live_ids().await;

    let chats = summaries
        .into_iter()
        .map(|s| ChatEntry {
            online: live.contains(&s.id),
            id: s.id,
            title: s.title,
            created_at: s.created_at,
        })
        .collect();
    Ok(Json(ChatListResponse { chats }))
}

/// Create a chat
///
/// Inserts the record and starts its session.
#[utoipa::path(
    post,
    path = "/api/chats",
    tag = "Chats",
    request_body = CreateChatRequest,
    responses(
        (status = 200, description = "Chat created", body = CreateChatResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn chats_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateChatRequest>,
) -> Result<Json<CreateChatResponse>, ApiError> {
    let id = new_chat_id();
    let title = req
        .title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let chat = state
        .store
        .create(&id, &title)
        .await
        .map_err(|e| internal(format!("Failed to create chat: {e}")))?;
    state
        .registry
        .get_or_start(&id)
        .await
        .map_err(|e| internal(format!("Failed to start session: {e}")))?;

    Ok(Json(CreateChatResponse {
        id: chat.id,
        title: chat.title,
    }))
}

/// Get a chat
///
/// Returns the full message log. Live sessions answer from memory.
#[utoipa::path(
    get,
    path = "/api/chats/{id}",
    tag = "Chats",
    params(("id" = String, Path, description = "Chat ID")),
    responses(
        (status = 200, description = "Full chat with messages", body = Object),
        (status = 404, description = "Chat not found", body = ErrorResponse)
    )
)]
pub async fn chats_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChatDetailResponse>, ApiError> {
    if let Some(handle) = state.registry.get_live(&id).await {
        if let Some(chat) = handle.snapshot().await {
            return Ok(Json(ChatDetailResponse {
                id: chat.id,
                title: chat.title,
                messages: chat.messages,
                online: true,
            }));
        }
    }

    match state.store.get(&id).await {
        Ok(Some(chat)) => Ok(Json(ChatDetailResponse {
            id: chat.id,
            title: chat.title,
            messages: chat.messages,
            online: false,
        })),
        Ok(None) => Err(not_found(format!("Chat not found: {id}"))),
        Err(e) => Err(internal(format!("Failed to get chat: {e}"))),
    }
}

/// Delete a chat
///
/// Stops the session (best-effort) and removes the record. Deleting an
/// unknown id succeeds.
#[utoipa::path(
    delete,
    path = "/api/chats/{id}",
    tag = "Chats",
    params(("id" = String, Path, description = "Chat ID")),
    responses(
        (status = 200, description = "Chat deleted", body = DeleteChatResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn chats_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteChatResponse>, ApiError> {
    state.registry.stop(&id).await;
    state
        .store
        .delete(&id)
        .await
        .map_err(|e| internal(format!("Failed to delete chat: {e}")))?;
    Ok(Json(DeleteChatResponse { ok: true }))
}
