//! Key-value store trait and its SQLite and in-memory implementations.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::error::StoreError;

/// String-oriented durable key-value store.
///
/// The store may be shared with unrelated application keys; callers own
/// their own key prefixes.
pub trait KeyValueStore: Send + Sync {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

  /// Write `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<(), StoreError>;

  /// All keys starting with `prefix`, in lexical order.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

  /// Remove every key starting with `prefix`, returning how many were removed.
  fn remove_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
    let keys = self.keys_with_prefix(prefix)?;
    for key in &keys {
      self.remove(key)?;
    }
    Ok(keys.len())
  }
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    entries.remove(key);
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
    let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(
      entries
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, _)| key.clone())
        .collect(),
    )
  }
}

/// SQLite-backed store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the key-value table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStore {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    tracing::debug!(path = %path.display(), "opened local store");
    Self::with_connection(conn)
  }

  /// Open a throwaway store that lives only as long as the connection.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(STORE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Default database location, e.g. `~/.local/share/promptlib/store.db`.
  pub fn default_path() -> Option<PathBuf> {
    let data_dir = dirs::data_dir().or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))?;
    Some(data_dir.join("promptlib").join("store.db"))
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    let value = conn
      .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
        row.get(0)
      })
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    conn.execute(
      "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    // substr comparison sidesteps LIKE wildcard escaping
    let mut stmt =
      conn.prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")?;
    let keys = stmt
      .query_map(params![prefix], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(keys)
  }

  fn remove_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    let removed = conn.execute(
      "DELETE FROM kv WHERE substr(key, 1, length(?1)) = ?1",
      params![prefix],
    )?;
    Ok(removed)
  }
}
