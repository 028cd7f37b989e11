//! Detection and cleanup of favorites whose message is gone.

use crate::store::FavoriteStore;
use crate::{Result, StarmarkError};
use starmark_types::{ChatMessage, MessageRef};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

/// Message references present in a chat, tied to the chat they were read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSnapshot {
    chat_id: String,
    refs: HashSet<MessageRef>,
}

impl LiveSnapshot {
    /// Snapshot from explicit references.
    pub fn new(chat_id: impl Into<String>, refs: impl IntoIterator<Item = MessageRef>) -> Self {
        Self {
            chat_id: chat_id.into(),
            refs: refs.into_iter().collect(),
        }
    }

    /// Snapshot of a message list; every position is a live reference.
    pub fn from_messages(chat_id: impl Into<String>, messages: &[ChatMessage]) -> Self {
        Self::new(chat_id, (0..messages.len()).map(MessageRef::from_index))
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn contains(&self, message_ref: &MessageRef) -> bool {
        self.refs.contains(message_ref)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Favorites of `chat_id` whose reference is absent from `live`, in insertion order.
pub fn find_invalid(store: &FavoriteStore, chat_id: &str, live: &LiveSnapshot) -> Vec<Uuid> {
    store
        .chat(chat_id)
        .map(|chat| {
            chat.items()
                .iter()
                .filter(|record| !live.contains(&record.message_ref))
                .map(|record| record.id)
                .collect()
        })
        .unwrap_or_default()
}

/// Remove every invalid favorite of `chat_id`. Returns how many were removed.
///
/// Fails with [`StarmarkError::ContextMismatch`] without touching the store if
/// `live` was read from a different chat.
pub fn clear_invalid(store: &mut FavoriteStore, chat_id: &str, live: &LiveSnapshot) -> Result<usize> {
    if live.chat_id() != chat_id {
        return Err(StarmarkError::ContextMismatch {
            expected: chat_id.to_string(),
            actual: Some(live.chat_id().to_string()),
        });
    }

    let invalid = find_invalid(store, chat_id, live);
    if invalid.is_empty() {
        debug!(target: "starmark::validity", "No invalid favorites in chat {}", chat_id);
        return Ok(0);
    }

    let removed = invalid
        .into_iter()
        .filter(|id| store.remove_favorite(chat_id, *id))
        .count();
    info!(target: "starmark::validity", "Removed {} invalid favorites from chat {}", removed, chat_id);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemorySink;
    use crate::store::AddOutcome;
    use starmark_types::{ChatMeta, ChatOwner, FavoritesSettings};
    use std::sync::Arc;

    const CHAT: &str = "chat-1";

    fn store_with(indices: &[usize]) -> (FavoriteStore, Vec<Uuid>) {
        let mut store = FavoriteStore::new(FavoritesSettings::default(), Arc::new(MemorySink::new()));
        let meta = ChatMeta {
            name: "Chat".to_string(),
            owner: ChatOwner::private("bob"),
        };
        let ids = indices
            .iter()
            .map(|&index| {
                let msg = ChatMessage::user("Bob", format!("m{}", index));
                match store.add_favorite(CHAT, &meta, MessageRef::from_index(index), &msg) {
                    AddOutcome::Added(record) => record.id,
                    AddOutcome::AlreadyFavorited(id) => id,
                }
            })
            .collect();
        (store, ids)
    }

    fn refs(indices: &[usize]) -> Vec<MessageRef> {
        indices.iter().copied().map(MessageRef::from_index).collect()
    }

    #[test]
    fn test_find_invalid_flags_missing_refs() {
        let (store, ids) = store_with(&[0, 1, 2]);
        let live = LiveSnapshot::new(CHAT, refs(&[0, 2]));

        assert_eq!(find_invalid(&store, CHAT, &live), vec![ids[1]]);
        // Pure: nothing removed
        assert_eq!(store.count(CHAT), 3);
    }

    #[test]
    fn test_find_invalid_uses_canonical_refs() {
        let (store, _ids) = store_with(&[1]);
        let live = LiveSnapshot::new(CHAT, vec![MessageRef::parse("01").unwrap()]);
        assert!(find_invalid(&store, CHAT, &live).is_empty());
    }

    #[test]
    fn test_find_invalid_unknown_chat() {
        let (store, _ids) = store_with(&[0]);
        let live = LiveSnapshot::new("other", refs(&[]));
        assert!(find_invalid(&store, "other", &live).is_empty());
    }

    #[test]
    fn test_clear_invalid_removes_and_counts() {
        let (mut store, ids) = store_with(&[0, 3, 7]);
        let messages: Vec<ChatMessage> = (0..4).map(|i| ChatMessage::user("Bob", format!("m{}", i))).collect();
        let live = LiveSnapshot::from_messages(CHAT, &messages);

        assert_eq!(clear_invalid(&mut store, CHAT, &live).unwrap(), 1);
        assert_eq!(store.count(CHAT), 2);
        assert!(store.get_favorite(CHAT, ids[2]).is_none());

        assert_eq!(clear_invalid(&mut store, CHAT, &live).unwrap(), 0);
    }

    #[test]
    fn test_clear_invalid_rejects_mismatched_snapshot() {
        let (mut store, _ids) = store_with(&[0, 1]);
        let live = LiveSnapshot::new("some-other-chat", refs(&[]));

        let err = clear_invalid(&mut store, CHAT, &live).unwrap_err();
        assert!(matches!(err, StarmarkError::ContextMismatch { .. }));
        assert_eq!(store.count(CHAT), 2);
    }

    #[test]
    fn test_shifted_index_hazard() {
        // Favorite message 1 of [0, 1, 2], then delete it: the list shifts and
        // the old message 2 now sits at position 1.
        let (store, ids) = store_with(&[1]);
        let live_after_delete = LiveSnapshot::new(CHAT, refs(&[0, 1]));

        // Position 1 still resolves, so the stale favorite is not detected and
        // now silently denotes a different message.
        assert!(find_invalid(&store, CHAT, &live_after_delete).is_empty());

        // Once the list is short enough the favorite is flagged.
        let live_after_second_delete = LiveSnapshot::new(CHAT, refs(&[0]));
        assert_eq!(find_invalid(&store, CHAT, &live_after_second_delete), vec![ids[0]]);
    }
}
