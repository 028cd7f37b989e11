//! Preview and icon-state wire types.

use crate::favorite::MessageRef;
use serde::{Deserialize, Serialize};

/// Where the preview for a chat should be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewTarget {
    /// True when no preview chat is associated yet
    pub is_new: bool,
    /// Associated preview chat; `None` means the caller must create one
    pub preview_chat_id: Option<String>,
}

/// Outcome of opening a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewReport {
    /// Chat the favorites came from
    pub source_chat_id: String,
    /// Chat that now shows the preview
    pub preview_chat_id: String,
    /// Whether the preview chat was created by this request
    pub is_new: bool,
    /// Number of favorited messages copied into the preview
    pub filled: usize,
    /// Favorites whose message could not be found
    pub missing: Vec<MessageRef>,
}

/// Favorited state of one rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteState {
    pub message_ref: MessageRef,
    pub favorited: bool,
}
