//! Capabilities the favorites subsystem needs from the chat host.

use async_trait::async_trait;
use starmark_types::{ActiveChat, ChatMessage, ChatOwner, HostStatus};
use thiserror::Error;

/// Failure reported by a host call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("No chat is open")]
    NoActiveChat,

    #[error("Message {0} not found")]
    MessageNotFound(usize),

    #[error("{0}")]
    Other(String),
}

/// The chat application hosting the favorites subsystem.
///
/// The host owns chats, their message lists and the notion of the active
/// chat. State-changing calls may complete before the host has finished
/// propagating their effects; callers settle after them (see [`crate::Settle`]).
#[async_trait]
pub trait ChatHost: Send + Sync {
    /// The chat currently open, if any.
    async fn active_chat(&self) -> Option<ActiveChat>;

    /// Messages of the active chat, in order. Position is the message reference.
    async fn active_messages(&self) -> Result<Vec<ChatMessage>, HostError>;

    /// Create a chat for the active chat's owner and switch to it.
    async fn create_new_chat(&self) -> Result<(), HostError>;

    /// Remove every message from the active chat.
    async fn clear_active_chat(&self) -> Result<(), HostError>;

    /// Change the display name of the active chat.
    async fn rename_active_chat(&self, name: &str) -> Result<(), HostError>;

    /// Open another chat of the given owner.
    async fn switch_to_chat(&self, owner: &ChatOwner, chat_id: &str) -> Result<(), HostError>;

    /// Append a message to the active chat. `force_index` is the position the
    /// message should be displayed under, when it differs from its real one.
    async fn append_message(
        &self,
        message: ChatMessage,
        force_index: Option<usize>,
    ) -> Result<(), HostError>;

    /// Append a system notice to the active chat.
    async fn send_system_message(&self, text: &str) -> Result<(), HostError>;

    /// Whether a chat with this id still exists.
    async fn chat_exists(&self, chat_id: &str) -> bool;

    /// Generation/saving flags.
    async fn status(&self) -> HostStatus;
}
