//! Favorite routes.

use super::api_error;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use starmark_core::{AddOutcome, StarmarkError, ToggleOutcome};
use starmark_types::{FavoriteRecord, FavoriteState, FavoritesPage, MessageRef};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub page_size: Option<usize>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Json<FavoritesPage> {
    Json(
        state
            .favorites
            .list_page(&chat_id, query.page, query.page_size)
            .await,
    )
}

#[derive(Deserialize)]
pub struct MessageRefRequest {
    pub message_ref: MessageRef,
}

/// Favorite a message. Responds 201 with the new favorite, or 200 with the
/// existing one if the message was already favorited.
pub async fn add(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Json(req): Json<MessageRefRequest>,
) -> Result<(StatusCode, Json<FavoriteRecord>), (StatusCode, String)> {
    match state
        .favorites
        .add_favorite(&chat_id, req.message_ref)
        .await
        .map_err(api_error)?
    {
        AddOutcome::Added(record) => {
            info!(target: "starmark::api", "Favorited message {} in {}", record.message_ref, chat_id);
            Ok((StatusCode::CREATED, Json(record)))
        }
        AddOutcome::AlreadyFavorited(id) => state
            .favorites
            .get_favorite(&chat_id, id)
            .await
            .map(|record| (StatusCode::OK, Json(record)))
            .ok_or((StatusCode::NOT_FOUND, "Favorite not found".to_string())),
    }
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub message_ref: MessageRef,
    pub favorited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite: Option<FavoriteRecord>,
}

pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Json(req): Json<MessageRefRequest>,
) -> Result<Json<ToggleResponse>, (StatusCode, String)> {
    let outcome = state
        .favorites
        .toggle_favorite(&chat_id, req.message_ref)
        .await
        .map_err(api_error)?;

    Ok(Json(match outcome {
        ToggleOutcome::Added(record) => ToggleResponse {
            message_ref: record.message_ref.clone(),
            favorited: true,
            favorite: Some(record),
        },
        ToggleOutcome::Removed(message_ref) => ToggleResponse {
            message_ref,
            favorited: false,
            favorite: None,
        },
    }))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path((chat_id, favorite_id)): Path<(String, Uuid)>,
) -> StatusCode {
    if state.favorites.remove_favorite(&chat_id, favorite_id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn remove_by_message(
    State(state): State<Arc<AppState>>,
    Path((chat_id, message_ref)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let message_ref = MessageRef::parse(&message_ref)
        .map_err(|e| api_error(StarmarkError::InvalidMessageRef(e)))?;

    if state
        .favorites
        .remove_favorite_by_message_ref(&chat_id, &message_ref)
        .await
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

#[derive(Deserialize)]
pub struct NoteRequest {
    pub note: String,
}

pub async fn update_note(
    State(state): State<Arc<AppState>>,
    Path((chat_id, favorite_id)): Path<(String, Uuid)>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<FavoriteRecord>, (StatusCode, String)> {
    let updated = state
        .favorites
        .update_note(&chat_id, favorite_id, &req.note)
        .await
        .map_err(api_error)?;
    if !updated {
        return Err((StatusCode::NOT_FOUND, "Favorite not found".to_string()));
    }

    state
        .favorites
        .get_favorite(&chat_id, favorite_id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Favorite not found".to_string()))
}

#[derive(Deserialize)]
pub struct StatesRequest {
    /// References of the messages currently rendered
    pub message_refs: Vec<MessageRef>,
}

/// Favorited flags for rendered messages, used to refresh their icons.
pub async fn states(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Json(req): Json<StatesRequest>,
) -> Json<Vec<FavoriteState>> {
    Json(
        state
            .favorites
            .favorite_states(&chat_id, &req.message_refs)
            .await,
    )
}

#[derive(Serialize)]
pub struct InvalidResponse {
    pub favorite_ids: Vec<Uuid>,
}

pub async fn invalid(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<InvalidResponse>, (StatusCode, String)> {
    let favorite_ids = state
        .favorites
        .find_invalid(&chat_id)
        .await
        .map_err(api_error)?;
    Ok(Json(InvalidResponse { favorite_ids }))
}

#[derive(Serialize)]
pub struct ClearInvalidResponse {
    pub removed: usize,
}

pub async fn clear_invalid(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<ClearInvalidResponse>, (StatusCode, String)> {
    let removed = state
        .favorites
        .clear_invalid(&chat_id)
        .await
        .map_err(api_error)?;
    Ok(Json(ClearInvalidResponse { removed }))
}
