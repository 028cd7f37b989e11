//! Chat favorites for Starmark: storage, validity checks and previews.

mod db;
mod error;
mod host;
mod icon_sync;
mod local_host;
mod persist;
mod projector;
mod service;
mod settle;
mod store;
mod validity;

pub use db::{SettingsStore, PLUGIN_NAME};
pub use error::{BusyReason, StarmarkError};
pub use host::{ChatHost, HostError};
pub use icon_sync::favorite_states;
pub use local_host::{ChatSummary, LocalChatHost};
pub use persist::{DebouncedPersister, MemorySink, SettingsSink};
pub use projector::{build_preview, PreviewBuild, ProjectionOptions};
pub use service::{FavoritesConfig, FavoritesService, PreviewState, ToggleOutcome};
pub use settle::{FixedDelaySettle, HostOp, NoSettle, Settle, SettleConfig};
pub use store::{AddOutcome, FavoriteStore};
pub use validity::{clear_invalid, find_invalid, LiveSnapshot};

/// Result type for Starmark operations.
pub type Result<T> = std::result::Result<T, StarmarkError>;
