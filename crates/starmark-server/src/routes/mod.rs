//! HTTP route handlers.

pub mod chats;
pub mod favorites;
pub mod preview;

use crate::state::AppState;
use axum::{
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use starmark_core::{HostError, StarmarkError};
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Routes mounted under `/api`.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Host chats
        .route("/chats", get(chats::list).post(chats::create))
        .route("/chats/active", get(chats::active))
        .route("/chats/active/status", put(chats::set_status))
        .route("/chats/active/messages", post(chats::append_message))
        .route("/chats/active/messages/{index}", delete(chats::delete_message))
        .route("/chats/{chat_id}", delete(chats::delete))
        .route("/chats/{chat_id}/open", post(chats::open))
        // Favorites
        .route(
            "/chats/{chat_id}/favorites",
            get(favorites::list).post(favorites::add),
        )
        .route("/chats/{chat_id}/favorites/toggle", post(favorites::toggle))
        .route("/chats/{chat_id}/favorites/states", post(favorites::states))
        .route("/chats/{chat_id}/favorites/invalid", get(favorites::invalid))
        .route(
            "/chats/{chat_id}/favorites/clear-invalid",
            post(favorites::clear_invalid),
        )
        .route(
            "/chats/{chat_id}/favorites/by-message/{message_ref}",
            delete(favorites::remove_by_message),
        )
        .route(
            "/chats/{chat_id}/favorites/{favorite_id}",
            delete(favorites::remove),
        )
        .route(
            "/chats/{chat_id}/favorites/{favorite_id}/note",
            put(favorites::update_note),
        )
        // Preview
        .route(
            "/chats/{chat_id}/preview",
            get(preview::status).post(preview::open),
        )
        .route("/health", get(health))
}

/// Map a favorites error to an HTTP response.
pub(crate) fn api_error(e: StarmarkError) -> (StatusCode, String) {
    let status = match &e {
        StarmarkError::InvalidMessageRef(_) => StatusCode::BAD_REQUEST,
        StarmarkError::MessageOutOfRange { .. } | StarmarkError::NothingToPreview(_) => {
            StatusCode::NOT_FOUND
        }
        StarmarkError::ContextMismatch { .. }
        | StarmarkError::NoActiveChat
        | StarmarkError::PreviewInProgress(_) => StatusCode::CONFLICT,
        StarmarkError::HostBusy(_) => StatusCode::SERVICE_UNAVAILABLE,
        StarmarkError::HostOperationFailed { .. } => StatusCode::BAD_GATEWAY,
        StarmarkError::DatabaseError(_) | StarmarkError::IoError(_) | StarmarkError::JsonError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        error!(target: "starmark::api", "Request failed: {}", e);
    } else {
        warn!(target: "starmark::api", "Request rejected: {}", e);
    }
    (status, e.to_string())
}

/// Map a host error to an HTTP response.
pub(crate) fn host_error(e: HostError) -> (StatusCode, String) {
    let status = match &e {
        HostError::ChatNotFound(_) | HostError::MessageNotFound(_) => StatusCode::NOT_FOUND,
        HostError::NoActiveChat => StatusCode::CONFLICT,
        HostError::Other(_) => StatusCode::BAD_GATEWAY,
    };
    warn!(target: "starmark::api", "Host request failed: {}", e);
    (status, e.to_string())
}
