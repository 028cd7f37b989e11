//! Favorites service tying the store to a chat host.
//!
//! Every operation that reads the live message list first checks that the
//! host's active chat is the chat being operated on. Host calls in the
//! preview flow are awaited one at a time, with a settle after each
//! state-changing call.

use crate::host::ChatHost;
use crate::persist::SettingsSink;
use crate::projector::{self, PreviewBuild, ProjectionOptions};
use crate::settle::{HostOp, Settle, SettleConfig};
use crate::store::{AddOutcome, FavoriteStore};
use crate::validity::{self, LiveSnapshot};
use crate::{BusyReason, Result, StarmarkError};
use serde::{Deserialize, Serialize};
use starmark_types::{
    ActiveChat, ChatMessage, FavoriteRecord, FavoriteState, FavoritesPage, FavoritesSettings,
    MessageRef, PreviewReport, PreviewTarget, DEFAULT_EXCERPT_CHARS,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for the favorites service.
#[derive(Debug, Clone, Deserialize)]
pub struct FavoritesConfig {
    /// Favorites per page when the caller does not ask for a size
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Characters of message text kept in a favorite's excerpt
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    /// Name given to newly created preview chats
    #[serde(default = "default_preview_chat_name")]
    pub preview_chat_name: String,
    /// Append notes to the preview copies of favorited messages
    #[serde(default = "default_annotate_notes")]
    pub annotate_notes: bool,
    /// System notice closing a filled preview
    #[serde(default = "default_preview_notice")]
    pub preview_notice: String,
    /// System notice shown when no favorite could be resolved
    #[serde(default = "default_empty_preview_notice")]
    pub empty_preview_notice: String,
    /// Quiet period before settings are written
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,
    #[serde(default)]
    pub settle: SettleConfig,
}

fn default_page_size() -> usize {
    10
}

fn default_excerpt_chars() -> usize {
    DEFAULT_EXCERPT_CHARS
}

fn default_preview_chat_name() -> String {
    "<Favorites Preview>".to_string()
}

fn default_annotate_notes() -> bool {
    true
}

fn default_preview_notice() -> String {
    "This is a preview of the favorited messages. It is not saved automatically and is only for viewing favorites.".to_string()
}

fn default_empty_preview_notice() -> String {
    "There are no valid favorited messages to preview. They may have been deleted, or the chat history has changed.".to_string()
}

fn default_persist_debounce_ms() -> u64 {
    1000
}

impl Default for FavoritesConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            excerpt_chars: default_excerpt_chars(),
            preview_chat_name: default_preview_chat_name(),
            annotate_notes: default_annotate_notes(),
            preview_notice: default_preview_notice(),
            empty_preview_notice: default_empty_preview_notice(),
            persist_debounce_ms: default_persist_debounce_ms(),
            settle: SettleConfig::default(),
        }
    }
}

/// Preview lifecycle of one source chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewState {
    NoPreview,
    CreatingPreview,
    PreviewReady,
    RefillingPreview,
}

/// Result of toggling a message.
#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    Added(FavoriteRecord),
    Removed(MessageRef),
}

/// Resets the preview state when a preview attempt ends, however it ends.
struct PreviewGuard<'a> {
    states: &'a Mutex<HashMap<String, PreviewState>>,
    chat_id: String,
    /// Whether a verified preview chat is associated with the source chat
    associated: bool,
}

impl Drop for PreviewGuard<'_> {
    fn drop(&mut self) {
        let state = if self.associated {
            PreviewState::PreviewReady
        } else {
            PreviewState::NoPreview
        };
        lock(self.states).insert(self.chat_id.clone(), state);
    }
}

fn message_at<'a>(messages: &'a [ChatMessage], message_ref: &MessageRef) -> Result<&'a ChatMessage> {
    let index = message_ref.index();
    messages.get(index).ok_or(StarmarkError::MessageOutOfRange {
        index,
        len: messages.len(),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Favorites operations for UI handlers.
pub struct FavoritesService<H: ChatHost> {
    store: RwLock<FavoriteStore>,
    host: Arc<H>,
    settle: Arc<dyn Settle>,
    config: FavoritesConfig,
    previews: Mutex<HashMap<String, PreviewState>>,
}

impl<H: ChatHost> FavoritesService<H> {
    /// Create a service over a previously loaded settings document.
    pub fn new(
        host: Arc<H>,
        settings: FavoritesSettings,
        sink: Arc<dyn SettingsSink>,
        settle: Arc<dyn Settle>,
        config: FavoritesConfig,
    ) -> Self {
        let store = FavoriteStore::new(settings, sink).with_excerpt_chars(config.excerpt_chars);
        Self {
            store: RwLock::new(store),
            host,
            settle,
            config,
            previews: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn config(&self) -> &FavoritesConfig {
        &self.config
    }

    /// Copy of the current settings document.
    pub async fn settings(&self) -> FavoritesSettings {
        self.store.read().await.settings().clone()
    }

    /// Fail if the host is generating or saving.
    async fn ensure_idle(&self) -> Result<()> {
        let status = self.host.status().await;
        if status.is_generating {
            return Err(StarmarkError::HostBusy(BusyReason::Generating));
        }
        if status.is_saving {
            return Err(StarmarkError::HostBusy(BusyReason::Saving));
        }
        Ok(())
    }

    /// The host's active chat, which must be `chat_id`.
    async fn require_active(&self, chat_id: &str) -> Result<ActiveChat> {
        match self.host.active_chat().await {
            Some(active) if active.chat_id == chat_id => Ok(active),
            None => Err(StarmarkError::NoActiveChat),
            other => {
                let actual = other.map(|active| active.chat_id);
                warn!(
                    target: "starmark::api",
                    "Refusing to read chat {} while {} is active",
                    chat_id,
                    actual.as_deref().unwrap_or("no chat")
                );
                Err(StarmarkError::ContextMismatch {
                    expected: chat_id.to_string(),
                    actual,
                })
            }
        }
    }

    /// Messages of `chat_id`, which must be the active chat.
    async fn live_messages(&self, chat_id: &str) -> Result<(ActiveChat, Vec<ChatMessage>)> {
        let active = self.require_active(chat_id).await?;
        let messages = self
            .host
            .active_messages()
            .await
            .map_err(|e| StarmarkError::host("read messages", e))?;
        Ok((active, messages))
    }

    /// Snapshot of the live references of `chat_id`.
    pub async fn live_snapshot(&self, chat_id: &str) -> Result<LiveSnapshot> {
        let (_, messages) = self.live_messages(chat_id).await?;
        Ok(LiveSnapshot::from_messages(chat_id, &messages))
    }

    /// Favorite the message at `message_ref` of the active chat `chat_id`.
    pub async fn add_favorite(&self, chat_id: &str, message_ref: MessageRef) -> Result<AddOutcome> {
        let (active, messages) = self.live_messages(chat_id).await?;
        let message = message_at(&messages, &message_ref)?;

        let outcome = self
            .store
            .write()
            .await
            .add_favorite(chat_id, &active.meta, message_ref, message);
        Ok(outcome)
    }

    /// Favorite the message if it is not favorited yet, otherwise unfavorite it.
    pub async fn toggle_favorite(&self, chat_id: &str, message_ref: MessageRef) -> Result<ToggleOutcome> {
        if self
            .store
            .write()
            .await
            .remove_favorite_by_message_ref(chat_id, &message_ref)
        {
            return Ok(ToggleOutcome::Removed(message_ref));
        }

        let (active, messages) = self.live_messages(chat_id).await?;
        let message = message_at(&messages, &message_ref)?;

        let mut store = self.store.write().await;
        match store.add_favorite(chat_id, &active.meta, message_ref.clone(), message) {
            AddOutcome::Added(record) => Ok(ToggleOutcome::Added(record)),
            // Favorited by another caller while the messages were read
            AddOutcome::AlreadyFavorited(id) => store
                .get_favorite(chat_id, id)
                .cloned()
                .map_or(Ok(ToggleOutcome::Removed(message_ref)), |record| {
                    Ok(ToggleOutcome::Added(record))
                }),
        }
    }

    pub async fn remove_favorite(&self, chat_id: &str, favorite_id: Uuid) -> bool {
        self.store.write().await.remove_favorite(chat_id, favorite_id)
    }

    pub async fn remove_favorite_by_message_ref(&self, chat_id: &str, message_ref: &MessageRef) -> bool {
        self.store
            .write()
            .await
            .remove_favorite_by_message_ref(chat_id, message_ref)
    }

    /// Replace a favorite's note. Refused while the host is busy.
    pub async fn update_note(&self, chat_id: &str, favorite_id: Uuid, note: &str) -> Result<bool> {
        self.ensure_idle().await?;
        Ok(self.store.write().await.update_note(chat_id, favorite_id, note))
    }

    pub async fn get_favorite(&self, chat_id: &str, favorite_id: Uuid) -> Option<FavoriteRecord> {
        self.store
            .read()
            .await
            .get_favorite(chat_id, favorite_id)
            .cloned()
    }

    pub async fn is_favorited(&self, chat_id: &str, message_ref: &MessageRef) -> bool {
        self.store.read().await.is_favorited(chat_id, message_ref)
    }

    pub async fn count(&self, chat_id: &str) -> usize {
        self.store.read().await.count(chat_id)
    }

    /// Favorited flags for the rendered messages of a chat.
    pub async fn favorite_states(&self, chat_id: &str, rendered: &[MessageRef]) -> Vec<FavoriteState> {
        let store = self.store.read().await;
        crate::icon_sync::favorite_states(&store, chat_id, rendered)
    }

    /// One page of favorites, newest first.
    pub async fn list_page(&self, chat_id: &str, page: usize, page_size: Option<usize>) -> FavoritesPage {
        let page_size = page_size.unwrap_or(self.config.page_size);
        self.store.read().await.list_page(chat_id, page, page_size)
    }

    /// Favorites of `chat_id` whose message no longer exists.
    pub async fn find_invalid(&self, chat_id: &str) -> Result<Vec<Uuid>> {
        let live = self.live_snapshot(chat_id).await?;
        let store = self.store.read().await;
        Ok(validity::find_invalid(&store, chat_id, &live))
    }

    /// Remove the favorites of `chat_id` whose message no longer exists.
    pub async fn clear_invalid(&self, chat_id: &str) -> Result<usize> {
        let live = self.live_snapshot(chat_id).await?;
        let mut store = self.store.write().await;
        validity::clear_invalid(&mut store, chat_id, &live)
    }

    pub async fn resolve_preview_target(&self, chat_id: &str) -> PreviewTarget {
        self.store.read().await.resolve_preview_target(chat_id)
    }

    pub async fn record_preview_association(&self, chat_id: &str, preview_chat_id: &str) {
        self.store
            .write()
            .await
            .record_preview_association(chat_id, preview_chat_id);
    }

    /// Preview lifecycle state of `chat_id`.
    pub async fn preview_state(&self, chat_id: &str) -> PreviewState {
        let tracked = lock(&self.previews).get(chat_id).copied();
        if let Some(state) = tracked {
            return state;
        }
        if self.resolve_preview_target(chat_id).await.preview_chat_id.is_some() {
            PreviewState::PreviewReady
        } else {
            PreviewState::NoPreview
        }
    }

    /// Project the favorites of the active chat `chat_id` without touching the host.
    pub async fn build_preview(&self, chat_id: &str) -> Result<PreviewBuild> {
        let (_, messages) = self.live_messages(chat_id).await?;
        let store = self.store.read().await;
        let build = match store.chat(chat_id) {
            Some(favorites) => projector::build_preview(favorites, &messages, self.projection_options()),
            None => PreviewBuild::default(),
        };
        Ok(build)
    }

    fn projection_options(&self) -> ProjectionOptions {
        ProjectionOptions {
            annotate_notes: self.config.annotate_notes,
        }
    }

    /// Show the favorites of `chat_id` in its preview chat, creating the
    /// preview chat on first use. Leaves the preview chat active.
    pub async fn open_preview(&self, chat_id: &str) -> Result<PreviewReport> {
        self.ensure_idle().await?;
        let target = self.resolve_preview_target(chat_id).await;
        let mut guard = self.begin_preview(chat_id, !target.is_new)?;

        let (active, messages) = self.live_messages(chat_id).await?;
        let favorites = self
            .store
            .read()
            .await
            .chat(chat_id)
            .filter(|chat| !chat.is_empty())
            .cloned()
            .ok_or_else(|| StarmarkError::NothingToPreview(chat_id.to_string()))?;
        let build = projector::build_preview(&favorites, &messages, self.projection_options());

        let (preview_chat_id, is_new) = match target.preview_chat_id {
            Some(existing) if self.host.chat_exists(&existing).await => {
                info!(target: "starmark::preview", "Switching to preview chat {} of {}", existing, chat_id);
                self.host
                    .switch_to_chat(&active.meta.owner, &existing)
                    .await
                    .map_err(|e| StarmarkError::host("switch chat", e))?;
                self.settle.settle(HostOp::SwitchChat).await;
                self.verify_active("switch chat", &existing).await?;
                (existing, false)
            }
            stale => {
                if let Some(gone) = stale {
                    warn!(target: "starmark::preview", "Preview chat {} of {} no longer exists, recreating", gone, chat_id);
                    self.store.write().await.forget_preview_association(chat_id);
                    guard.associated = false;
                }
                let created = self.create_preview_chat(chat_id).await?;
                self.store
                    .write()
                    .await
                    .record_preview_association(chat_id, &created);
                guard.associated = true;
                (created, true)
            }
        };

        let filled = build.messages.len();
        let missing = build.missing.clone();
        self.fill_preview(build).await?;

        info!(
            target: "starmark::preview",
            "Preview of {} ready in {} ({} messages, {} missing)",
            chat_id,
            preview_chat_id,
            filled,
            missing.len()
        );
        Ok(PreviewReport {
            source_chat_id: chat_id.to_string(),
            preview_chat_id,
            is_new,
            filled,
            missing,
        })
    }

    fn begin_preview(&self, chat_id: &str, associated: bool) -> Result<PreviewGuard<'_>> {
        let mut states = lock(&self.previews);
        if matches!(
            states.get(chat_id),
            Some(PreviewState::CreatingPreview | PreviewState::RefillingPreview)
        ) {
            return Err(StarmarkError::PreviewInProgress(chat_id.to_string()));
        }
        let state = if associated {
            PreviewState::RefillingPreview
        } else {
            PreviewState::CreatingPreview
        };
        states.insert(chat_id.to_string(), state);
        Ok(PreviewGuard {
            states: &self.previews,
            chat_id: chat_id.to_string(),
            associated,
        })
    }

    /// Create, verify and name a new preview chat. Returns its id.
    async fn create_preview_chat(&self, source_chat_id: &str) -> Result<String> {
        info!(target: "starmark::preview", "Creating preview chat for {}", source_chat_id);
        self.host
            .create_new_chat()
            .await
            .map_err(|e| StarmarkError::host("create chat", e))?;
        self.settle.settle(HostOp::CreateChat).await;

        let created = match self.host.active_chat().await {
            Some(active) if active.chat_id != source_chat_id => active.chat_id,
            other => {
                return Err(StarmarkError::HostOperationFailed {
                    operation: "create chat",
                    reason: format!(
                        "active chat is still {}",
                        other.map(|a| a.chat_id).as_deref().unwrap_or("none")
                    ),
                });
            }
        };

        self.host
            .rename_active_chat(&self.config.preview_chat_name)
            .await
            .map_err(|e| StarmarkError::host("rename chat", e))?;
        self.verify_active("rename chat", &created).await?;
        debug!(target: "starmark::preview", "Created preview chat {}", created);
        Ok(created)
    }

    /// Check that `expected` is the host's active chat after `operation`.
    async fn verify_active(&self, operation: &'static str, expected: &str) -> Result<()> {
        let actual = self.host.active_chat().await.map(|active| active.chat_id);
        if actual.as_deref() == Some(expected) {
            return Ok(());
        }
        warn!(
            target: "starmark::preview",
            "Host did not converge after {}: expected {}, active {}",
            operation,
            expected,
            actual.as_deref().unwrap_or("none")
        );
        Err(StarmarkError::HostOperationFailed {
            operation,
            reason: format!(
                "expected active chat {}, found {}",
                expected,
                actual.as_deref().unwrap_or("none")
            ),
        })
    }

    /// Replace the active chat's messages with the projected copies.
    async fn fill_preview(&self, build: PreviewBuild) -> Result<()> {
        self.host
            .clear_active_chat()
            .await
            .map_err(|e| StarmarkError::host("clear chat", e))?;
        self.settle.settle(HostOp::ClearChat).await;

        if build.is_empty() {
            return self
                .host
                .send_system_message(&self.config.empty_preview_notice)
                .await
                .map_err(|e| StarmarkError::host("append message", e));
        }

        for message in build.messages {
            let force_index = message.original_index;
            self.host
                .append_message(message, force_index)
                .await
                .map_err(|e| StarmarkError::host("append message", e))?;
            self.settle.settle(HostOp::AppendMessage).await;
        }

        self.host
            .send_system_message(&self.config.preview_notice)
            .await
            .map_err(|e| StarmarkError::host("append message", e))
    }
}
