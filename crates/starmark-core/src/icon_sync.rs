//! Favorited state for rendered messages.

use crate::store::FavoriteStore;
use starmark_types::{FavoriteState, MessageRef};

/// Favorited flag for each rendered message, in the order given.
///
/// Always read from the store; callers must not keep the result past a
/// single render.
pub fn favorite_states<'a, I>(store: &FavoriteStore, chat_id: &str, rendered: I) -> Vec<FavoriteState>
where
    I: IntoIterator<Item = &'a MessageRef>,
{
    rendered
        .into_iter()
        .map(|message_ref| FavoriteState {
            message_ref: message_ref.clone(),
            favorited: store.is_favorited(chat_id, message_ref),
        })
        .collect()
}
