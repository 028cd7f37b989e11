//! Host chat routes.
//!
//! These drive the local chat host directly: creating and opening chats,
//! posting messages and toggling the busy flags.

use super::host_error;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use starmark_core::{ChatHost, ChatSummary};
use starmark_types::{
    ActiveChat, ChatMessage, ChatMeta, ChatOwner, ChatRole, HostStatus, MessageRef, OwnerKind,
};
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatSummary>,
    pub active_chat_id: Option<String>,
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<ChatListResponse> {
    let chats = state.host.list_chats().await;
    let active_chat_id = chats
        .iter()
        .find(|chat| chat.is_active)
        .map(|chat| chat.chat_id.clone());

    Json(ChatListResponse {
        chats,
        active_chat_id,
    })
}

#[derive(Deserialize)]
pub struct CreateChatRequest {
    pub name: String,
    /// Owning character or group id; defaults to the chat name
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub group: bool,
}

#[derive(Serialize)]
pub struct CreateChatResponse {
    pub chat_id: String,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<CreateChatResponse>), (StatusCode, String)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Chat name must not be empty".to_string()));
    }

    let owner_id = req.owner_id.unwrap_or_else(|| name.to_string());
    let owner = ChatOwner {
        kind: if req.group { OwnerKind::Group } else { OwnerKind::Private },
        id: owner_id,
    };
    let chat_id = state
        .host
        .start_chat(ChatMeta {
            name: name.to_string(),
            owner,
        })
        .await
        .map_err(host_error)?;

    info!(target: "starmark::api", "Created chat {}", chat_id);
    Ok((StatusCode::CREATED, Json(CreateChatResponse { chat_id })))
}

#[derive(Serialize)]
pub struct ActiveChatResponse {
    pub chat: ActiveChat,
    pub messages: Vec<ChatMessage>,
    pub status: HostStatus,
}

pub async fn active(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActiveChatResponse>, (StatusCode, String)> {
    let chat = state
        .host
        .active_chat()
        .await
        .ok_or((StatusCode::NOT_FOUND, "No chat is open".to_string()))?;
    let messages = state.host.active_messages().await.map_err(host_error)?;
    let status = state.host.status().await;

    Ok(Json(ActiveChatResponse {
        chat,
        messages,
        status,
    }))
}

pub async fn open(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.host.open_chat(&chat_id).await.map_err(host_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.host.delete_chat(&chat_id).await.map_err(host_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct AppendMessageRequest {
    pub sender: String,
    #[serde(default = "default_role")]
    pub role: ChatRole,
    pub text: String,
}

fn default_role() -> ChatRole {
    ChatRole::User
}

#[derive(Serialize)]
pub struct AppendMessageResponse {
    pub message_ref: MessageRef,
}

pub async fn append_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<(StatusCode, Json<AppendMessageResponse>), (StatusCode, String)> {
    let index = state
        .host
        .push_message(ChatMessage::new(req.sender, req.role, req.text))
        .await
        .map_err(host_error)?;

    Ok((
        StatusCode::CREATED,
        Json(AppendMessageResponse {
            message_ref: MessageRef::from_index(index),
        }),
    ))
}

/// Delete a message. Later messages shift down, so favorites pointing past
/// `index` now denote different messages.
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<ChatMessage>, (StatusCode, String)> {
    let removed = state.host.delete_message(index).await.map_err(host_error)?;
    Ok(Json(removed))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub is_generating: Option<bool>,
    #[serde(default)]
    pub is_saving: Option<bool>,
}

pub async fn set_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StatusRequest>,
) -> Json<HostStatus> {
    if let Some(generating) = req.is_generating {
        state.host.set_generating(generating).await;
    }
    if let Some(saving) = req.is_saving {
        state.host.set_saving(saving).await;
    }
    Json(state.host.status().await)
}
