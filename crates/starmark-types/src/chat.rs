//! Host chat types.
//!
//! These types describe the chats owned by the host application. The favorites
//! subsystem only reads them, except when it fills a preview chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single message in a host chat.
///
/// Messages carry no stable identifier of their own; their position in the
/// chat's message list is the only reference the host exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name of the sender
    pub sender: String,
    /// Who sent this message
    pub role: ChatRole,
    /// When the message was sent, if the host recorded it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Message text content
    pub text: String,
    /// Avatar reference, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Position of the source message, set on copies placed in a preview chat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_index: Option<usize>,
    /// Host-specific fields carried through copies untouched
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Role of the message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Character,
    System,
}

impl ChatMessage {
    /// Create a message with the current time as its timestamp.
    pub fn new(sender: impl Into<String>, role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            role,
            timestamp: Some(Utc::now()),
            text: text.into(),
            avatar: None,
            original_index: None,
            extra: Map::new(),
        }
    }

    /// Create a user message.
    pub fn user(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(sender, ChatRole::User, text)
    }

    /// Create a character message.
    pub fn character(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(sender, ChatRole::Character, text)
    }

    /// Create a system notice.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new("System", ChatRole::System, text)
    }

    /// Builder-style timestamp override.
    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Whether a chat belongs to a single character or to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Private,
    Group,
}

/// The character or group a chat belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatOwner {
    pub kind: OwnerKind,
    pub id: String,
}

impl ChatOwner {
    pub fn private(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Private,
            id: id.into(),
        }
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Group,
            id: id.into(),
        }
    }
}

/// Chat metadata snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMeta {
    /// Display name of the chat
    pub name: String,
    /// Owning character or group
    pub owner: ChatOwner,
}

/// Identity of the chat currently open in the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveChat {
    pub chat_id: String,
    pub meta: ChatMeta,
}

/// Host status flags that block preview and edit operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus {
    /// A reply is being generated
    pub is_generating: bool,
    /// The active chat is being saved
    pub is_saving: bool,
}
