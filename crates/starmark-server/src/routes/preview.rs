//! Preview routes.

use super::api_error;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use starmark_core::PreviewState;
use starmark_types::PreviewReport;
use std::sync::Arc;

#[derive(Serialize)]
pub struct PreviewStatusResponse {
    pub state: PreviewState,
    pub preview_chat_id: Option<String>,
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Json<PreviewStatusResponse> {
    let preview_state = state.favorites.preview_state(&chat_id).await;
    let target = state.favorites.resolve_preview_target(&chat_id).await;
    Json(PreviewStatusResponse {
        state: preview_state,
        preview_chat_id: target.preview_chat_id,
    })
}

/// Show the chat's favorites in its preview chat. The preview chat is
/// active when this returns.
pub async fn open(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<PreviewReport>, (StatusCode, String)> {
    let report = state
        .favorites
        .open_preview(&chat_id)
        .await
        .map_err(api_error)?;
    Ok(Json(report))
}
