//! Favorite records and per-chat favorite collections.

use crate::chat::{ChatMessage, ChatMeta, ChatRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Default number of characters kept in a favorite's excerpt.
pub const DEFAULT_EXCERPT_CHARS: usize = 100;

/// Error returned when a value cannot be read as a message position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid message reference: {0:?}")]
pub struct InvalidMessageRef(pub String);

/// Reference to a message by its position in the owning chat.
///
/// Stored in canonical decimal form so that `"1"`, `" 1"`, `"01"` and `1`
/// all compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMessageRef", into = "String")]
pub struct MessageRef(String);

impl MessageRef {
    /// Reference the message at `index`.
    pub fn from_index(index: usize) -> Self {
        Self(index.to_string())
    }

    /// Parse a numeric string into its canonical form.
    pub fn parse(raw: &str) -> Result<Self, InvalidMessageRef> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidMessageRef(raw.to_string()));
        }
        trimmed
            .parse::<usize>()
            .map(Self::from_index)
            .map_err(|_| InvalidMessageRef(raw.to_string()))
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Positional index this reference denotes.
    pub fn index(&self) -> usize {
        // Canonical form is validated at construction.
        self.0.parse().unwrap_or(usize::MAX)
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MessageRef {
    type Err = InvalidMessageRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<usize> for MessageRef {
    fn from(index: usize) -> Self {
        Self::from_index(index)
    }
}

impl From<MessageRef> for String {
    fn from(value: MessageRef) -> Self {
        value.0
    }
}

/// Wire form accepted for message references: a number or a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMessageRef {
    Number(i64),
    Text(String),
}

impl TryFrom<RawMessageRef> for MessageRef {
    type Error = InvalidMessageRef;

    fn try_from(raw: RawMessageRef) -> Result<Self, Self::Error> {
        match raw {
            RawMessageRef::Number(n) if n >= 0 => Ok(Self(n.to_string())),
            RawMessageRef::Number(n) => Err(InvalidMessageRef(n.to_string())),
            RawMessageRef::Text(s) => Self::parse(&s),
        }
    }
}

/// A favorited message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    /// Unique identifier, stable for the record's lifetime
    pub id: Uuid,
    /// Position of the favorited message at capture time
    pub message_ref: MessageRef,
    /// Sender name captured from the message
    pub sender: String,
    /// Sender role captured from the message
    pub role: ChatRole,
    /// Send time of the message, if the host recorded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Avatar reference captured from the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Leading part of the message text
    pub excerpt: String,
    /// User note
    #[serde(default)]
    pub note: String,
    /// When the message was favorited
    pub created_at: DateTime<Utc>,
}

impl FavoriteRecord {
    /// Capture a favorite from a host message.
    pub fn capture(message_ref: MessageRef, message: &ChatMessage, excerpt_chars: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_ref,
            sender: message.sender.clone(),
            role: message.role,
            timestamp: message.timestamp,
            avatar: message.avatar.clone(),
            excerpt: excerpt(&message.text, excerpt_chars),
            note: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// Truncate `text` to `max_chars` characters, marking truncation with `...`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Favorites of a single chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFavorites {
    /// Chat metadata captured when the chat was first seen
    pub meta: ChatMeta,
    /// Favorites in the order they were made
    #[serde(default)]
    items: Vec<FavoriteRecord>,
    /// Always equal to `items.len()`
    #[serde(default)]
    count: usize,
}

impl ChatFavorites {
    /// Create an empty collection.
    pub fn new(meta: ChatMeta) -> Self {
        Self {
            meta,
            items: Vec::new(),
            count: 0,
        }
    }

    /// Favorites in insertion order.
    pub fn items(&self) -> &[FavoriteRecord] {
        &self.items
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a favorite by id.
    pub fn get(&self, id: Uuid) -> Option<&FavoriteRecord> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Find a favorite by the message it points at.
    pub fn find_by_ref(&self, message_ref: &MessageRef) -> Option<&FavoriteRecord> {
        self.items.iter().find(|item| &item.message_ref == message_ref)
    }

    /// Append a record. Returns false if the message is already favorited.
    pub fn push(&mut self, record: FavoriteRecord) -> bool {
        if self.find_by_ref(&record.message_ref).is_some()
            || self.get(record.id).is_some()
        {
            return false;
        }
        self.items.push(record);
        self.count = self.items.len();
        true
    }

    /// Remove a favorite by id.
    pub fn remove(&mut self, id: Uuid) -> Option<FavoriteRecord> {
        let pos = self.items.iter().position(|item| item.id == id)?;
        let removed = self.items.remove(pos);
        self.count = self.items.len();
        Some(removed)
    }

    /// Mutable access to a single record's note.
    pub fn note_mut(&mut self, id: Uuid) -> Option<&mut String> {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .map(|item| &mut item.note)
    }

    /// Recompute the derived count, e.g. after loading a hand-edited document.
    pub fn normalize(&mut self) {
        self.count = self.items.len();
    }
}

/// One page of favorites, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoritesPage {
    pub items: Vec<FavoriteRecord>,
    /// Zero-based page number
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub total_pages: usize,
    pub has_more: bool,
}
