//! In-process chat host backed by JSONL chat files.
//!
//! Each chat lives in `<dir>/<chat id>.jsonl`: the first line is the chat
//! header, every following line one message. Without a directory the host
//! keeps chats in memory only.

use crate::host::{ChatHost, HostError};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use starmark_types::{ActiveChat, ChatMessage, ChatMeta, ChatOwner, HostStatus};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// First line of a chat file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatHeader {
    chat_id: String,
    meta: ChatMeta,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredChat {
    header: ChatHeader,
    messages: Vec<ChatMessage>,
}

impl StoredChat {
    fn to_jsonl(&self) -> std::result::Result<String, serde_json::Error> {
        let mut out = serde_json::to_string(&self.header)?;
        out.push('\n');
        for message in &self.messages {
            out.push_str(&serde_json::to_string(message)?);
            out.push('\n');
        }
        Ok(out)
    }

    fn from_jsonl(content: &str) -> std::result::Result<Option<Self>, serde_json::Error> {
        let mut lines = content.lines().filter(|line| !line.trim().is_empty());
        let Some(first) = lines.next() else {
            return Ok(None);
        };
        let header: ChatHeader = serde_json::from_str(first)?;
        let messages = lines
            .map(serde_json::from_str)
            .collect::<std::result::Result<Vec<ChatMessage>, _>>()?;
        Ok(Some(Self { header, messages }))
    }
}

/// Listing entry for a stored chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_id: String,
    pub meta: ChatMeta,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// File name for a chat id. Characters outside a safe set are written as
/// `%XX` escapes of their UTF-8 bytes, and `%` itself is escaped, so distinct
/// ids never share a file.
fn file_stem(chat_id: &str) -> String {
    let mut stem = String::with_capacity(chat_id.len());
    for c in chat_id.chars() {
        if c.is_alphanumeric() || "-_@. ()".contains(c) {
            stem.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                stem.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    stem
}

#[derive(Default)]
struct HostState {
    chats: BTreeMap<String, StoredChat>,
    active: Option<String>,
    status: HostStatus,
}

impl HostState {
    fn active_chat_mut(&mut self) -> std::result::Result<&mut StoredChat, HostError> {
        let id = self.active.clone().ok_or(HostError::NoActiveChat)?;
        self.chats.get_mut(&id).ok_or(HostError::ChatNotFound(id))
    }

    fn unique_id(&self, base: &str) -> String {
        if !self.chats.contains_key(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{} ({})", base, n))
            .find(|candidate| !self.chats.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

/// A minimal chat application the favorites subsystem can run against.
pub struct LocalChatHost {
    state: RwLock<HostState>,
    chats_dir: Option<PathBuf>,
}

impl Default for LocalChatHost {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChatHost {
    /// Host that keeps chats in memory only.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HostState::default()),
            chats_dir: None,
        }
    }

    /// Load every chat file from `dir`, creating the directory if needed.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let mut state = HostState::default();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(target: "starmark::host", "Skipping unreadable chat file {}: {}", path.display(), e);
                    continue;
                }
            };
            match StoredChat::from_jsonl(&content) {
                Ok(Some(chat)) => {
                    state.chats.insert(chat.header.chat_id.clone(), chat);
                }
                Ok(None) => debug!(target: "starmark::host", "Skipping empty chat file {}", path.display()),
                Err(e) => warn!(target: "starmark::host", "Skipping malformed chat file {}: {}", path.display(), e),
            }
        }

        info!(target: "starmark::host", "Loaded {} chats from {}", state.chats.len(), dir.display());
        Ok(Self {
            state: RwLock::new(state),
            chats_dir: Some(dir.to_path_buf()),
        })
    }

    fn chat_path(&self, chat_id: &str) -> Option<PathBuf> {
        self.chats_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.jsonl", file_stem(chat_id))))
    }

    /// Write a chat file. Callers hold the state write guard so that files are
    /// written in the same order as the mutations they reflect.
    async fn write_chat(&self, chat: &StoredChat) -> std::result::Result<(), HostError> {
        let Some(path) = self.chat_path(&chat.header.chat_id) else {
            return Ok(());
        };
        let content = chat.to_jsonl().map_err(|e| HostError::Other(e.to_string()))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| HostError::Other(format!("failed to write {}: {}", path.display(), e)))
    }

    async fn remove_chat_file(&self, chat_id: &str) -> std::result::Result<(), HostError> {
        let Some(path) = self.chat_path(chat_id) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HostError::Other(e.to_string())),
        }
    }

    /// Apply `mutate` to the active chat and write the result to disk before
    /// releasing the state lock.
    async fn update_active<T>(
        &self,
        mutate: impl FnOnce(&mut StoredChat) -> std::result::Result<T, HostError>,
    ) -> std::result::Result<T, HostError> {
        let mut state = self.state.write().await;
        let chat = state.active_chat_mut()?;
        let value = mutate(chat)?;
        self.write_chat(chat).await?;
        Ok(value)
    }

    /// Create a chat and make it active. Returns its id.
    pub async fn start_chat(&self, meta: ChatMeta) -> std::result::Result<String, HostError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let base = format!("{} - {}", meta.name, now.format("%Y-%m-%d@%Hh%Mm%Ss%3fms"));
        let chat_id = state.unique_id(&base);
        let chat = StoredChat {
            header: ChatHeader {
                chat_id: chat_id.clone(),
                meta,
                created_at: now,
            },
            messages: Vec::new(),
        };
        self.write_chat(&chat).await?;
        state.chats.insert(chat_id.clone(), chat);
        state.active = Some(chat_id.clone());
        info!(target: "starmark::host", "Started chat {}", chat_id);
        Ok(chat_id)
    }

    /// All chats, oldest first.
    pub async fn list_chats(&self) -> Vec<ChatSummary> {
        let state = self.state.read().await;
        let mut chats: Vec<ChatSummary> = state
            .chats
            .values()
            .map(|chat| ChatSummary {
                chat_id: chat.header.chat_id.clone(),
                meta: chat.header.meta.clone(),
                message_count: chat.messages.len(),
                created_at: chat.header.created_at,
                is_active: state.active.as_deref() == Some(chat.header.chat_id.as_str()),
            })
            .collect();
        chats.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        chats
    }

    /// Open a chat regardless of owner.
    pub async fn open_chat(&self, chat_id: &str) -> std::result::Result<(), HostError> {
        let mut state = self.state.write().await;
        if !state.chats.contains_key(chat_id) {
            return Err(HostError::ChatNotFound(chat_id.to_string()));
        }
        state.active = Some(chat_id.to_string());
        debug!(target: "starmark::host", "Opened chat {}", chat_id);
        Ok(())
    }

    /// Append a message to the active chat. Returns its position.
    pub async fn push_message(&self, message: ChatMessage) -> std::result::Result<usize, HostError> {
        self.update_active(|chat| {
            chat.messages.push(message);
            Ok(chat.messages.len() - 1)
        })
        .await
    }

    /// Delete the message at `index` from the active chat. Later messages shift down.
    pub async fn delete_message(&self, index: usize) -> std::result::Result<ChatMessage, HostError> {
        let removed = self
            .update_active(|chat| {
                if index >= chat.messages.len() {
                    return Err(HostError::MessageNotFound(index));
                }
                Ok(chat.messages.remove(index))
            })
            .await?;
        debug!(target: "starmark::host", "Deleted message {} from active chat", index);
        Ok(removed)
    }

    /// Delete a chat. Closes it if it was active.
    pub async fn delete_chat(&self, chat_id: &str) -> std::result::Result<(), HostError> {
        let mut state = self.state.write().await;
        if state.chats.remove(chat_id).is_none() {
            return Err(HostError::ChatNotFound(chat_id.to_string()));
        }
        if state.active.as_deref() == Some(chat_id) {
            state.active = None;
        }
        self.remove_chat_file(chat_id).await?;
        info!(target: "starmark::host", "Deleted chat {}", chat_id);
        Ok(())
    }

    pub async fn set_generating(&self, generating: bool) {
        self.state.write().await.status.is_generating = generating;
    }

    pub async fn set_saving(&self, saving: bool) {
        self.state.write().await.status.is_saving = saving;
    }
}

#[async_trait]
impl ChatHost for LocalChatHost {
    async fn active_chat(&self) -> Option<ActiveChat> {
        let state = self.state.read().await;
        let id = state.active.as_ref()?;
        state.chats.get(id).map(|chat| ActiveChat {
            chat_id: chat.header.chat_id.clone(),
            meta: chat.header.meta.clone(),
        })
    }

    async fn active_messages(&self) -> std::result::Result<Vec<ChatMessage>, HostError> {
        let state = self.state.read().await;
        let id = state.active.as_ref().ok_or(HostError::NoActiveChat)?;
        state
            .chats
            .get(id)
            .map(|chat| chat.messages.clone())
            .ok_or_else(|| HostError::ChatNotFound(id.clone()))
    }

    async fn create_new_chat(&self) -> std::result::Result<(), HostError> {
        let meta = self
            .active_chat()
            .await
            .map(|active| active.meta)
            .ok_or(HostError::NoActiveChat)?;
        self.start_chat(meta).await.map(|_| ())
    }

    async fn clear_active_chat(&self) -> std::result::Result<(), HostError> {
        self.update_active(|chat| {
            chat.messages.clear();
            Ok(())
        })
        .await
    }

    async fn rename_active_chat(&self, name: &str) -> std::result::Result<(), HostError> {
        self.update_active(|chat| {
            chat.header.meta.name = name.to_string();
            Ok(())
        })
        .await
    }

    async fn switch_to_chat(&self, owner: &ChatOwner, chat_id: &str) -> std::result::Result<(), HostError> {
        let mut state = self.state.write().await;
        let chat = state
            .chats
            .get(chat_id)
            .ok_or_else(|| HostError::ChatNotFound(chat_id.to_string()))?;
        if &chat.header.meta.owner != owner {
            return Err(HostError::Other(format!(
                "chat {} does not belong to {}",
                chat_id, owner.id
            )));
        }
        state.active = Some(chat_id.to_string());
        debug!(target: "starmark::host", "Switched to chat {}", chat_id);
        Ok(())
    }

    async fn append_message(
        &self,
        mut message: ChatMessage,
        force_index: Option<usize>,
    ) -> std::result::Result<(), HostError> {
        // No renderer here: the display position is only recorded on the message.
        if message.original_index.is_none() {
            message.original_index = force_index;
        }
        self.push_message(message).await.map(|_| ())
    }

    async fn send_system_message(&self, text: &str) -> std::result::Result<(), HostError> {
        self.push_message(ChatMessage::system(text)).await.map(|_| ())
    }

    async fn chat_exists(&self, chat_id: &str) -> bool {
        self.state.read().await.chats.contains_key(chat_id)
    }

    async fn status(&self) -> HostStatus {
        self.state.read().await.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starmark_types::ChatRole;
    use tempfile::tempdir;

    fn meta(name: &str) -> ChatMeta {
        ChatMeta {
            name: name.to_string(),
            owner: ChatOwner::private(name.to_lowercase()),
        }
    }

    #[tokio::test]
    async fn test_start_chat_becomes_active() {
        let host = LocalChatHost::new();
        assert!(host.active_chat().await.is_none());

        let id = host.start_chat(meta("Alice")).await.unwrap();
        let active = host.active_chat().await.unwrap();
        assert_eq!(active.chat_id, id);
        assert_eq!(active.meta.name, "Alice");
        assert!(host.chat_exists(&id).await);
    }

    #[tokio::test]
    async fn test_chat_ids_are_unique() {
        let host = LocalChatHost::new();
        let a = host.start_chat(meta("Alice")).await.unwrap();
        let b = host.start_chat(meta("Alice")).await.unwrap();
        let c = host.start_chat(meta("Alice")).await.unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(host.list_chats().await.len(), 3);
    }

    #[tokio::test]
    async fn test_messages_and_deletion_shift_positions() {
        let host = LocalChatHost::new();
        host.start_chat(meta("Alice")).await.unwrap();

        for i in 0..3 {
            let index = host.push_message(ChatMessage::user("Me", format!("m{}", i))).await.unwrap();
            assert_eq!(index, i);
        }

        let removed = host.delete_message(1).await.unwrap();
        assert_eq!(removed.text, "m1");

        let messages = host.active_messages().await.unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m0", "m2"]);

        assert_eq!(host.delete_message(5).await.unwrap_err(), HostError::MessageNotFound(5));
    }

    #[tokio::test]
    async fn test_create_new_chat_keeps_owner() {
        let host = LocalChatHost::new();
        let original = host.start_chat(meta("Alice")).await.unwrap();

        host.create_new_chat().await.unwrap();
        let active = host.active_chat().await.unwrap();
        assert_ne!(active.chat_id, original);
        assert_eq!(active.meta.owner, ChatOwner::private("alice"));

        host.rename_active_chat("Renamed").await.unwrap();
        assert_eq!(host.active_chat().await.unwrap().meta.name, "Renamed");
    }

    #[tokio::test]
    async fn test_switch_checks_owner() {
        let host = LocalChatHost::new();
        let alice = host.start_chat(meta("Alice")).await.unwrap();
        host.start_chat(meta("Bob")).await.unwrap();

        let err = host
            .switch_to_chat(&ChatOwner::private("bob"), &alice)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Other(_)));

        host.switch_to_chat(&ChatOwner::private("alice"), &alice).await.unwrap();
        assert_eq!(host.active_chat().await.unwrap().chat_id, alice);

        let err = host
            .switch_to_chat(&ChatOwner::private("alice"), "missing")
            .await
            .unwrap_err();
        assert_eq!(err, HostError::ChatNotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_append_records_forced_index() {
        let host = LocalChatHost::new();
        host.start_chat(meta("Alice")).await.unwrap();

        host.append_message(ChatMessage::user("Me", "copy"), Some(7)).await.unwrap();
        host.send_system_message("notice").await.unwrap();

        let messages = host.active_messages().await.unwrap();
        assert_eq!(messages[0].original_index, Some(7));
        assert_eq!(messages[1].role, ChatRole::System);

        host.clear_active_chat().await.unwrap();
        assert!(host.active_messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_operations_without_active_chat() {
        let host = LocalChatHost::new();
        assert_eq!(host.active_messages().await.unwrap_err(), HostError::NoActiveChat);
        assert_eq!(host.create_new_chat().await.unwrap_err(), HostError::NoActiveChat);
        assert_eq!(host.clear_active_chat().await.unwrap_err(), HostError::NoActiveChat);
    }

    #[tokio::test]
    async fn test_delete_active_chat_closes_it() {
        let host = LocalChatHost::new();
        let id = host.start_chat(meta("Alice")).await.unwrap();
        host.delete_chat(&id).await.unwrap();

        assert!(host.active_chat().await.is_none());
        assert!(!host.chat_exists(&id).await);
        assert!(host.delete_chat(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_status_flags() {
        let host = LocalChatHost::new();
        assert_eq!(host.status().await, HostStatus::default());

        host.set_generating(true).await;
        host.set_saving(true).await;
        let status = host.status().await;
        assert!(status.is_generating);
        assert!(status.is_saving);
    }

    #[tokio::test]
    async fn test_chats_persist_to_directory() {
        let dir = tempdir().unwrap();
        let id = {
            let host = LocalChatHost::open(dir.path()).await.unwrap();
            let id = host.start_chat(meta("Alice")).await.unwrap();
            host.push_message(ChatMessage::user("Me", "hello")).await.unwrap();
            host.push_message(ChatMessage::character("Alice", "hi")).await.unwrap();
            id
        };

        // Unrelated files are ignored
        std::fs::write(dir.path().join("notes.txt"), "not a chat").unwrap();

        let host = LocalChatHost::open(dir.path()).await.unwrap();
        let chats = host.list_chats().await;
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].chat_id, id);
        assert_eq!(chats[0].message_count, 2);
        assert!(!chats[0].is_active);

        host.open_chat(&id).await.unwrap();
        let messages = host.active_messages().await.unwrap();
        assert_eq!(messages[1].text, "hi");

        host.delete_chat(&id).await.unwrap();
        let host = LocalChatHost::open(dir.path()).await.unwrap();
        assert!(host.list_chats().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pushes_all_reach_disk() {
        let dir = tempdir().unwrap();
        let host = std::sync::Arc::new(LocalChatHost::open(dir.path()).await.unwrap());
        let id = host.start_chat(meta("Alice")).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let host = host.clone();
                tokio::spawn(async move { host.push_message(ChatMessage::user("Me", format!("m{}", i))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = LocalChatHost::open(dir.path()).await.unwrap();
        reopened.open_chat(&id).await.unwrap();
        assert_eq!(reopened.active_messages().await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_unreadable_chat_file_is_skipped() {
        let dir = tempdir().unwrap();
        let id = {
            let host = LocalChatHost::open(dir.path()).await.unwrap();
            host.start_chat(meta("Alice")).await.unwrap()
        };
        std::fs::write(dir.path().join("broken.jsonl"), [0xff, 0xfe, 0x00, b'\n']).unwrap();
        std::fs::write(dir.path().join("garbage.jsonl"), "{not json\n").unwrap();

        let host = LocalChatHost::open(dir.path()).await.unwrap();
        let chats = host.list_chats().await;
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].chat_id, id);
    }

    #[test]
    fn test_file_stems_do_not_collide() {
        assert_eq!(file_stem("Alice - 2025-01-01@10h00m00s000ms"), "Alice - 2025-01-01@10h00m00s000ms");
        assert_ne!(file_stem("a/b chat"), file_stem("a_b chat"));
        assert_ne!(file_stem("a/b chat"), file_stem("a%2Fb chat"));
        assert_eq!(file_stem("<Preview>"), "%3CPreview%3E");
    }

    #[tokio::test]
    async fn test_similar_ids_keep_separate_files() {
        let dir = tempdir().unwrap();
        {
            let host = LocalChatHost::open(dir.path()).await.unwrap();
            host.start_chat(meta("a/b")).await.unwrap();
            host.push_message(ChatMessage::user("Me", "slash")).await.unwrap();
            host.start_chat(meta("a_b")).await.unwrap();
            host.push_message(ChatMessage::user("Me", "underscore")).await.unwrap();
        }

        let host = LocalChatHost::open(dir.path()).await.unwrap();
        let chats = host.list_chats().await;
        assert_eq!(chats.len(), 2);
        assert!(chats.iter().all(|chat| chat.message_count == 1));
    }
}
