//! Shared application state.

use crate::config::Config;
use starmark_core::{
    DebouncedPersister, FavoritesService, FixedDelaySettle, LocalChatHost, SettingsStore,
};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
pub struct AppState {
    pub host: Arc<LocalChatHost>,
    pub favorites: FavoritesService<LocalChatHost>,
    pub persister: Arc<DebouncedPersister>,
    pub config: Config,
}

impl AppState {
    /// Open the settings database and chat directory. Must run inside a tokio runtime.
    pub async fn new(config: Config) -> starmark_core::Result<Self> {
        let store = Arc::new(SettingsStore::open(&config.db_path)?);
        let settings = store.load()?.unwrap_or_default();

        let host = Arc::new(match &config.chats_dir {
            Some(dir) => LocalChatHost::open(dir).await?,
            None => LocalChatHost::new(),
        });

        let persister = Arc::new(DebouncedPersister::spawn(
            store,
            Duration::from_millis(config.favorites.persist_debounce_ms),
        ));
        let favorites = FavoritesService::new(
            host.clone(),
            settings,
            persister.clone(),
            Arc::new(FixedDelaySettle::new(config.favorites.settle)),
            config.favorites.clone(),
        );

        Ok(Self {
            host,
            favorites,
            persister,
            config,
        })
    }
}
