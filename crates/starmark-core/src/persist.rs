//! Fire-and-forget persistence of the settings document.

use crate::{Result, SettingsStore};
use starmark_types::FavoritesSettings;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Receives the full settings document after every mutation.
///
/// Implementations must not block; the call happens while the store is
/// being mutated.
pub trait SettingsSink: Send + Sync {
    fn persist(&self, settings: &FavoritesSettings);
}

/// Writes the latest document to a [`SettingsStore`] after a quiet period.
///
/// Bursts of mutations collapse into a single write of the newest snapshot.
pub struct DebouncedPersister {
    tx: watch::Sender<Option<FavoritesSettings>>,
    store: Arc<SettingsStore>,
}

impl DebouncedPersister {
    /// Start the background writer. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<SettingsStore>, delay: Duration) -> Self {
        let (tx, mut rx) = watch::channel::<Option<FavoritesSettings>>(None);
        let writer_store = store.clone();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                tokio::time::sleep(delay).await;
                let latest = rx.borrow_and_update().clone();
                if let Some(settings) = latest {
                    match writer_store.save(&settings) {
                        Ok(()) => debug!(target: "starmark::persist", "Saved settings ({} chats)", settings.chats.len()),
                        Err(e) => warn!(target: "starmark::persist", "Failed to save settings: {}", e),
                    }
                }
            }
            debug!(target: "starmark::persist", "Settings writer stopped");
        });

        Self { tx, store }
    }

    /// Write the most recent snapshot immediately.
    pub fn flush(&self) -> Result<()> {
        let latest = self.tx.borrow().clone();
        if let Some(settings) = latest {
            self.store.save(&settings)?;
        }
        Ok(())
    }
}

impl SettingsSink for DebouncedPersister {
    fn persist(&self, settings: &FavoritesSettings) {
        self.tx.send_replace(Some(settings.clone()));
    }
}

/// Keeps snapshots in memory. Used when no durable storage is configured.
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<FavoritesSettings>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persist calls received.
    pub fn persist_count(&self) -> usize {
        self.saved.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Most recent snapshot.
    pub fn last(&self) -> Option<FavoritesSettings> {
        self.saved.lock().ok().and_then(|s| s.last().cloned())
    }
}

impl SettingsSink for MemorySink {
    fn persist(&self, settings: &FavoritesSettings) {
        if let Ok(mut saved) = self.saved.lock() {
            saved.push(settings.clone());
        }
    }
}
