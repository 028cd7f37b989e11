//! SQLite persistence for the favorites settings document.

use crate::Result;
use rusqlite::{params, Connection, OptionalExtension};
use starmark_types::FavoritesSettings;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Key under which the favorites document is stored.
pub const PLUGIN_NAME: &str = "starmark-favorites";

/// SQLite-based settings store.
///
/// Each plugin owns one JSON document, replaced wholesale on every save.
pub struct SettingsStore {
    conn: Mutex<Connection>,
}

impl SettingsStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS plugin_settings (
                plugin TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Load the favorites document, if one was saved before.
    pub fn load(&self) -> Result<Option<FavoritesSettings>> {
        let conn = self.conn();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM plugin_settings WHERE plugin = ?1",
                params![PLUGIN_NAME],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(json) => {
                let mut settings: FavoritesSettings = serde_json::from_str(&json)?;
                settings.normalize();
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    /// Replace the stored favorites document.
    pub fn save(&self, settings: &FavoritesSettings) -> Result<()> {
        let payload = serde_json::to_string(settings)?;
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO plugin_settings (plugin, payload, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(plugin) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![PLUGIN_NAME, payload, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
