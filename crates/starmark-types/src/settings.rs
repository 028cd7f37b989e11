//! Persisted settings document.

use crate::favorite::ChatFavorites;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the favorites subsystem persists, keyed by host chat id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoritesSettings {
    /// Favorites per chat
    #[serde(default)]
    pub chats: BTreeMap<String, ChatFavorites>,
    /// Original chat id -> preview chat id
    #[serde(default)]
    pub preview_associations: BTreeMap<String, String>,
}

impl FavoritesSettings {
    /// Repair derived fields after deserializing.
    pub fn normalize(&mut self) {
        for chat in self.chats.values_mut() {
            chat.normalize();
        }
    }
}
