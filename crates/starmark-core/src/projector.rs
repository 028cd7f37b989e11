//! Projection of a chat's favorites into preview messages.

use starmark_types::{ChatFavorites, ChatMessage, MessageRef};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Messages to replay in a preview chat, in chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewBuild {
    /// Owned copies of the favorited messages
    pub messages: Vec<ChatMessage>,
    /// Favorites whose position no longer exists in the live list
    pub missing: Vec<MessageRef>,
}

impl PreviewBuild {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Options controlling how copies are prepared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionOptions {
    /// Append each favorite's note to its copy's text
    pub annotate_notes: bool,
}

/// Copy the favorited messages out of `live`.
///
/// Copies carry their source position in `original_index` and are ordered by
/// timestamp, falling back to position when timestamps are equal or when any
/// copy lacks one.
/// Favorite order plays no part.
pub fn build_preview(
    favorites: &ChatFavorites,
    live: &[ChatMessage],
    options: ProjectionOptions,
) -> PreviewBuild {
    let mut build = PreviewBuild::default();

    for record in favorites.items() {
        let index = record.message_ref.index();
        let Some(source) = live.get(index) else {
            warn!(
                target: "starmark::preview",
                "Favorite {} points at message {} but the chat has {} messages",
                record.id,
                record.message_ref,
                live.len()
            );
            build.missing.push(record.message_ref.clone());
            continue;
        };

        let mut copy = source.clone();
        copy.original_index = Some(index);
        if options.annotate_notes && !record.note.is_empty() {
            copy.text = annotate(&copy.text, &record.note);
        }
        build.messages.push(copy);
    }

    if build.messages.iter().all(|m| m.timestamp.is_some()) {
        build.messages.sort_by(chronological);
    } else {
        build.messages.sort_by_key(|m| m.original_index);
    }
    debug!(
        target: "starmark::preview",
        "Projected {} favorites ({} missing)",
        build.messages.len(),
        build.missing.len()
    );
    build
}

fn chronological(a: &ChatMessage, b: &ChatMessage) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.original_index.cmp(&b.original_index))
}

fn annotate(text: &str, note: &str) -> String {
    format!("{}\n\n> Note: {}", text, note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use starmark_types::{ChatMeta, ChatOwner, FavoriteRecord};

    fn live_chat(len: usize) -> Vec<ChatMessage> {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        (0..len)
            .map(|i| {
                ChatMessage::character("Bot", format!("message {}", i))
                    .with_timestamp(Some(base + Duration::minutes(i as i64)))
            })
            .collect()
    }

    fn favorites_for(live: &[ChatMessage], indices: &[usize]) -> ChatFavorites {
        let mut chat = ChatFavorites::new(ChatMeta {
            name: "Bot".to_string(),
            owner: ChatOwner::private("bot"),
        });
        for &index in indices {
            let source = live
                .get(index)
                .cloned()
                .unwrap_or_else(|| ChatMessage::character("Bot", "gone"));
            chat.push(FavoriteRecord::capture(MessageRef::from_index(index), &source, 100));
        }
        chat
    }

    fn texts(build: &PreviewBuild) -> Vec<&str> {
        build.messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn test_empty_favorites_project_nothing() {
        let live = live_chat(3);
        let build = build_preview(&favorites_for(&live, &[]), &live, ProjectionOptions::default());
        assert!(build.is_empty());
        assert!(build.missing.is_empty());
    }

    #[test]
    fn test_preview_is_chronological_not_click_order() {
        let live = live_chat(3);
        let favorites = favorites_for(&live, &[2, 0]);

        let build = build_preview(&favorites, &live, ProjectionOptions::default());

        assert_eq!(texts(&build), vec!["message 0", "message 2"]);
        assert_eq!(build.messages[0].original_index, Some(0));
        assert_eq!(build.messages[1].original_index, Some(2));
    }

    #[test]
    fn test_equal_timestamps_fall_back_to_position() {
        let same = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let live: Vec<ChatMessage> = (0..4)
            .map(|i| ChatMessage::user("A", format!("m{}", i)).with_timestamp(Some(same)))
            .collect();
        let favorites = favorites_for(&live, &[3, 1, 2, 0]);

        let build = build_preview(&favorites, &live, ProjectionOptions::default());

        assert_eq!(texts(&build), vec!["m0", "m1", "m2", "m3"]);
    }

    #[test]
    fn test_orders_by_timestamp_before_position() {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        // Position order disagrees with time order
        let live = vec![
            ChatMessage::user("A", "t2").with_timestamp(Some(base + Duration::seconds(20))),
            ChatMessage::user("A", "t0").with_timestamp(Some(base)),
            ChatMessage::user("A", "t1").with_timestamp(Some(base + Duration::seconds(10))),
        ];
        let favorites = favorites_for(&live, &[0, 2, 1]);

        let build = build_preview(&favorites, &live, ProjectionOptions::default());
        assert_eq!(texts(&build), vec!["t0", "t1", "t2"]);
    }

    #[test]
    fn test_falls_back_to_position_without_timestamps() {
        let live: Vec<ChatMessage> = (0..4)
            .map(|i| ChatMessage::user("A", format!("m{}", i)).with_timestamp(None))
            .collect();
        let favorites = favorites_for(&live, &[3, 1, 2]);

        let build = build_preview(&favorites, &live, ProjectionOptions::default());
        assert_eq!(texts(&build), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_missing_messages_are_skipped() {
        let live = live_chat(2);
        let favorites = favorites_for(&live, &[1, 5]);

        let build = build_preview(&favorites, &live, ProjectionOptions::default());
        assert_eq!(texts(&build), vec!["message 1"]);
        assert_eq!(build.missing, vec![MessageRef::from_index(5)]);
    }

    #[test]
    fn test_copies_do_not_alias_source() {
        let live = live_chat(2);
        let favorites = favorites_for(&live, &[0]);

        let mut build = build_preview(&favorites, &live, ProjectionOptions::default());
        build.messages[0].text.push_str(" (edited)");
        build.messages[0]
            .extra
            .insert("flag".to_string(), serde_json::json!(true));

        assert_eq!(live[0].text, "message 0");
        assert!(live[0].extra.is_empty());
        assert!(live[0].original_index.is_none());
    }

    #[test]
    fn test_notes_are_appended_when_enabled() {
        let live = live_chat(1);
        let mut favorites = favorites_for(&live, &[0]);
        let id = favorites.items()[0].id;
        if let Some(note) = favorites.note_mut(id) {
            *note = "remember this".to_string();
        }

        let plain = build_preview(&favorites, &live, ProjectionOptions::default());
        assert_eq!(plain.messages[0].text, "message 0");

        let annotated = build_preview(&favorites, &live, ProjectionOptions { annotate_notes: true });
        assert!(annotated.messages[0].text.starts_with("message 0"));
        assert!(annotated.messages[0].text.ends_with("Note: remember this"));
        assert_eq!(live[0].text, "message 0");
    }
}
