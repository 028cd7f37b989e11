//! Per-chat favorite collections.
//!
//! The store owns the whole settings document. Every mutation is a
//! synchronous read-modify-write followed by exactly one persistence call.
//!
//! Policy: an empty collection is kept (with its chat metadata) after its last
//! favorite is removed, and preview associations are never removed because
//! the collection became empty.

use crate::persist::SettingsSink;
use starmark_types::{
    ChatFavorites, ChatMessage, ChatMeta, FavoriteRecord, FavoritesPage, FavoritesSettings,
    MessageRef, PreviewTarget, DEFAULT_EXCERPT_CHARS,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Result of an add attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// The message was favorited.
    Added(FavoriteRecord),
    /// The message was already favorited; nothing changed.
    AlreadyFavorited(Uuid),
}

impl AddOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, AddOutcome::Added(_))
    }
}

/// In-memory owner of all favorites and preview associations.
pub struct FavoriteStore {
    settings: FavoritesSettings,
    sink: Arc<dyn SettingsSink>,
    excerpt_chars: usize,
}

impl FavoriteStore {
    /// Create a store over a previously loaded document.
    pub fn new(mut settings: FavoritesSettings, sink: Arc<dyn SettingsSink>) -> Self {
        settings.normalize();
        Self {
            settings,
            sink,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }

    /// Override the excerpt length used for new favorites.
    pub fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }

    /// The whole settings document.
    pub fn settings(&self) -> &FavoritesSettings {
        &self.settings
    }

    fn persist(&self) {
        self.sink.persist(&self.settings);
    }

    fn chat_entry(&mut self, chat_id: &str, meta: &ChatMeta) -> &mut ChatFavorites {
        self.settings
            .chats
            .entry(chat_id.to_string())
            .or_insert_with(|| {
                debug!(target: "starmark::store", "Created favorites for chat {}", chat_id);
                ChatFavorites::new(meta.clone())
            })
    }

    /// Favorite `message`, which sits at `message_ref` in chat `chat_id`.
    pub fn add_favorite(
        &mut self,
        chat_id: &str,
        chat_meta: &ChatMeta,
        message_ref: MessageRef,
        message: &ChatMessage,
    ) -> AddOutcome {
        let excerpt_chars = self.excerpt_chars;
        let chat = self.chat_entry(chat_id, chat_meta);

        if let Some(existing) = chat.find_by_ref(&message_ref) {
            debug!(target: "starmark::store", "Message {} in chat {} already favorited", message_ref, chat_id);
            return AddOutcome::AlreadyFavorited(existing.id);
        }

        let record = FavoriteRecord::capture(message_ref, message, excerpt_chars);
        chat.push(record.clone());
        debug!(target: "starmark::store", "Added favorite {} for message {} in chat {}", record.id, record.message_ref, chat_id);
        self.persist();
        AddOutcome::Added(record)
    }

    /// Remove a favorite by id. Returns whether one was removed.
    pub fn remove_favorite(&mut self, chat_id: &str, favorite_id: Uuid) -> bool {
        let removed = self
            .settings
            .chats
            .get_mut(chat_id)
            .and_then(|chat| chat.remove(favorite_id));

        match removed {
            Some(record) => {
                debug!(target: "starmark::store", "Removed favorite {} (message {}) from chat {}", favorite_id, record.message_ref, chat_id);
                self.persist();
                true
            }
            None => {
                debug!(target: "starmark::store", "Favorite {} not found in chat {}", favorite_id, chat_id);
                false
            }
        }
    }

    /// Remove the favorite pointing at `message_ref`. Returns whether one was removed.
    pub fn remove_favorite_by_message_ref(&mut self, chat_id: &str, message_ref: &MessageRef) -> bool {
        let id = self
            .settings
            .chats
            .get(chat_id)
            .and_then(|chat| chat.find_by_ref(message_ref))
            .map(|record| record.id);

        match id {
            Some(id) => self.remove_favorite(chat_id, id),
            None => {
                debug!(target: "starmark::store", "No favorite for message {} in chat {}", message_ref, chat_id);
                false
            }
        }
    }

    /// Replace a favorite's note. Returns false if the favorite does not exist.
    pub fn update_note(&mut self, chat_id: &str, favorite_id: Uuid, note: &str) -> bool {
        let updated = match self
            .settings
            .chats
            .get_mut(chat_id)
            .and_then(|chat| chat.note_mut(favorite_id))
        {
            Some(slot) => {
                *slot = note.trim().to_string();
                true
            }
            None => false,
        };

        if updated {
            debug!(target: "starmark::store", "Updated note for favorite {} in chat {}", favorite_id, chat_id);
            self.persist();
        } else {
            debug!(target: "starmark::store", "Favorite {} not found for note update in chat {}", favorite_id, chat_id);
        }
        updated
    }

    /// Whether the message at `message_ref` is favorited.
    pub fn is_favorited(&self, chat_id: &str, message_ref: &MessageRef) -> bool {
        self.settings
            .chats
            .get(chat_id)
            .is_some_and(|chat| chat.find_by_ref(message_ref).is_some())
    }

    /// Favorites of a chat, if the chat has been seen before.
    pub fn chat(&self, chat_id: &str) -> Option<&ChatFavorites> {
        self.settings.chats.get(chat_id)
    }

    /// Look up a single favorite.
    pub fn get_favorite(&self, chat_id: &str, favorite_id: Uuid) -> Option<&FavoriteRecord> {
        self.chat(chat_id).and_then(|chat| chat.get(favorite_id))
    }

    /// A favorite's note.
    pub fn get_note(&self, chat_id: &str, favorite_id: Uuid) -> Option<&str> {
        self.get_favorite(chat_id, favorite_id)
            .map(|record| record.note.as_str())
    }

    /// Number of favorites in a chat.
    pub fn count(&self, chat_id: &str) -> usize {
        self.chat(chat_id).map(|chat| chat.count()).unwrap_or(0)
    }

    /// One page of a chat's favorites, most recently favorited first.
    pub fn list_page(&self, chat_id: &str, page: usize, page_size: usize) -> FavoritesPage {
        let page_size = page_size.max(1);
        let mut items: Vec<FavoriteRecord> = self
            .chat(chat_id)
            .map(|chat| chat.items().to_vec())
            .unwrap_or_default();
        // Stable sort keeps insertion order for equal creation times
        items.reverse();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total_count = items.len();
        let total_pages = total_count.div_ceil(page_size);
        let start = page.saturating_mul(page_size).min(total_count);
        let end = start.saturating_add(page_size).min(total_count);

        FavoritesPage {
            items: items[start..end].to_vec(),
            page,
            page_size,
            total_count,
            total_pages,
            has_more: end < total_count,
        }
    }

    /// Where the preview for `chat_id` lives, if it has one.
    pub fn resolve_preview_target(&self, chat_id: &str) -> PreviewTarget {
        let preview_chat_id = self.settings.preview_associations.get(chat_id).cloned();
        PreviewTarget {
            is_new: preview_chat_id.is_none(),
            preview_chat_id,
        }
    }

    /// Associate `chat_id` with its preview chat.
    pub fn record_preview_association(&mut self, chat_id: &str, preview_chat_id: &str) {
        let previous = self
            .settings
            .preview_associations
            .insert(chat_id.to_string(), preview_chat_id.to_string());
        if previous.as_deref() != Some(preview_chat_id) {
            debug!(target: "starmark::store", "Chat {} now previews in {}", chat_id, preview_chat_id);
            self.persist();
        }
    }

    /// Drop the preview association of `chat_id`. Returns whether one existed.
    pub fn forget_preview_association(&mut self, chat_id: &str) -> bool {
        let removed = self.settings.preview_associations.remove(chat_id).is_some();
        if removed {
            debug!(target: "starmark::store", "Forgot preview chat of {}", chat_id);
            self.persist();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemorySink;
    use proptest::prelude::*;
    use starmark_types::ChatOwner;

    const CHAT: &str = "alice - 2025-01-01";

    fn meta() -> ChatMeta {
        ChatMeta {
            name: "Alice".to_string(),
            owner: ChatOwner::private("alice"),
        }
    }

    fn new_store() -> (FavoriteStore, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let store = FavoriteStore::new(FavoritesSettings::default(), sink.clone());
        (store, sink)
    }

    fn add(store: &mut FavoriteStore, index: usize) -> AddOutcome {
        let msg = ChatMessage::character("Alice", format!("message {}", index));
        store.add_favorite(CHAT, &meta(), MessageRef::from_index(index), &msg)
    }

    fn added_id(outcome: AddOutcome) -> Uuid {
        match outcome {
            AddOutcome::Added(record) => record.id,
            other => panic!("expected Added, got {:?}", other),
        }
    }

    #[test]
    fn test_add_favorite_marks_message() {
        let (mut store, sink) = new_store();

        assert_eq!(store.count(CHAT), 0);
        assert!(add(&mut store, 3).is_added());

        assert!(store.is_favorited(CHAT, &MessageRef::from_index(3)));
        assert!(store.is_favorited(CHAT, &MessageRef::parse("03").unwrap()));
        assert_eq!(store.count(CHAT), 1);
        assert_eq!(sink.persist_count(), 1);
        assert_eq!(store.chat(CHAT).unwrap().meta, meta());
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let (mut store, sink) = new_store();

        let first = added_id(add(&mut store, 1));
        let second = add(&mut store, 1);

        assert_eq!(second, AddOutcome::AlreadyFavorited(first));
        assert_eq!(store.count(CHAT), 1);
        assert_eq!(sink.persist_count(), 1);
    }

    #[test]
    fn test_remove_favorite() {
        let (mut store, sink) = new_store();
        let id = added_id(add(&mut store, 2));

        assert!(store.remove_favorite(CHAT, id));
        assert!(!store.is_favorited(CHAT, &MessageRef::from_index(2)));
        assert_eq!(store.count(CHAT), 0);
        assert_eq!(sink.persist_count(), 2);

        // Removing again is a quiet no-op
        assert!(!store.remove_favorite(CHAT, id));
        assert!(!store.remove_favorite(CHAT, id));
        assert_eq!(sink.persist_count(), 2);
    }

    #[test]
    fn test_empty_collection_is_retained() {
        let (mut store, _sink) = new_store();
        let id = added_id(add(&mut store, 0));
        store.record_preview_association(CHAT, "preview-1");

        store.remove_favorite(CHAT, id);

        let chat = store.chat(CHAT).expect("collection kept");
        assert!(chat.is_empty());
        assert_eq!(chat.count(), 0);
        assert_eq!(
            store.resolve_preview_target(CHAT).preview_chat_id.as_deref(),
            Some("preview-1")
        );
    }

    #[test]
    fn test_remove_by_message_ref() {
        let (mut store, _sink) = new_store();
        add(&mut store, 0);
        add(&mut store, 5);

        assert!(store.remove_favorite_by_message_ref(CHAT, &MessageRef::parse("5").unwrap()));
        assert!(!store.remove_favorite_by_message_ref(CHAT, &MessageRef::from_index(5)));
        assert!(store.is_favorited(CHAT, &MessageRef::from_index(0)));
        assert_eq!(store.count(CHAT), 1);
    }

    #[test]
    fn test_operations_on_unknown_chat() {
        let (mut store, sink) = new_store();

        assert!(!store.remove_favorite("nope", Uuid::new_v4()));
        assert!(!store.remove_favorite_by_message_ref("nope", &MessageRef::from_index(0)));
        assert!(!store.update_note("nope", Uuid::new_v4(), "x"));
        assert!(!store.is_favorited("nope", &MessageRef::from_index(0)));
        assert_eq!(store.count("nope"), 0);
        assert_eq!(store.list_page("nope", 0, 10).total_count, 0);
        assert_eq!(sink.persist_count(), 0);
    }

    #[test]
    fn test_update_note_round_trip() {
        let (mut store, _sink) = new_store();
        let id = added_id(add(&mut store, 4));

        assert!(store.update_note(CHAT, id, "x"));
        assert_eq!(store.get_note(CHAT, id), Some("x"));

        assert!(store.update_note(CHAT, id, "  padded note \n"));
        assert_eq!(store.get_note(CHAT, id), Some("padded note"));

        assert!(!store.update_note(CHAT, Uuid::new_v4(), "y"));
    }

    #[test]
    fn test_list_page_newest_first() {
        let (mut store, _sink) = new_store();
        for index in 0..5 {
            add(&mut store, index);
        }

        let first = store.list_page(CHAT, 0, 2);
        assert_eq!(first.total_count, 5);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_more);
        let refs: Vec<&str> = first.items.iter().map(|r| r.message_ref.as_str()).collect();
        assert_eq!(refs, vec!["4", "3"]);

        let last = store.list_page(CHAT, 2, 2);
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].message_ref.as_str(), "0");
        assert!(!last.has_more);

        let beyond = store.list_page(CHAT, 9, 2);
        assert!(beyond.items.is_empty());
        assert!(!beyond.has_more);
    }

    #[test]
    fn test_list_page_huge_page_size() {
        let (mut store, _sink) = new_store();
        add(&mut store, 0);
        add(&mut store, 1);

        let all = store.list_page(CHAT, 0, usize::MAX);
        assert_eq!(all.items.len(), 2);
        assert_eq!(all.total_pages, 1);
        assert!(!all.has_more);

        let second = store.list_page(CHAT, 1, usize::MAX);
        assert!(second.items.is_empty());
        assert_eq!(second.total_count, 2);
        assert!(!second.has_more);
    }

    #[test]
    fn test_preview_association_lifecycle() {
        let (mut store, sink) = new_store();

        let target = store.resolve_preview_target(CHAT);
        assert!(target.is_new);
        assert!(target.preview_chat_id.is_none());

        store.record_preview_association(CHAT, "preview-1");
        store.record_preview_association(CHAT, "preview-1");
        assert_eq!(sink.persist_count(), 1);

        let target = store.resolve_preview_target(CHAT);
        assert!(!target.is_new);
        assert_eq!(target.preview_chat_id.as_deref(), Some("preview-1"));

        assert!(store.forget_preview_association(CHAT));
        assert!(!store.forget_preview_association(CHAT));
        assert!(store.resolve_preview_target(CHAT).is_new);
    }

    #[test]
    fn test_store_normalizes_loaded_document() {
        let json = r#"{
            "chats": {
                "c": {
                    "meta": {"name": "C", "owner": {"kind": "group", "id": "g"}},
                    "items": [],
                    "count": 4
                }
            }
        }"#;
        let settings: FavoritesSettings = serde_json::from_str(json).unwrap();
        let store = FavoriteStore::new(settings, Arc::new(MemorySink::new()));
        assert_eq!(store.count("c"), 0);
    }

    proptest! {
        #[test]
        fn prop_count_matches_items(ops in proptest::collection::vec((any::<bool>(), 0usize..8), 0..40)) {
            let (mut store, _sink) = new_store();
            let mut expected = std::collections::HashSet::new();

            for (is_add, index) in ops {
                if is_add {
                    let outcome = add(&mut store, index);
                    prop_assert_eq!(outcome.is_added(), expected.insert(index));
                } else {
                    let removed = store.remove_favorite_by_message_ref(CHAT, &MessageRef::from_index(index));
                    prop_assert_eq!(removed, expected.remove(&index));
                }

                let count = store.count(CHAT);
                prop_assert_eq!(count, expected.len());
                if let Some(chat) = store.chat(CHAT) {
                    prop_assert_eq!(chat.count(), chat.items().len());
                }
            }
        }
    }
}
