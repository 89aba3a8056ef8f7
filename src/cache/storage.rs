//! Cache store backends: SQLite for persistence, memory for ephemeral runs.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{CacheStorage, CachedEntry};
use crate::worker::types::Response;

/// SQLite-backed cache storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the store database, creating it if needed.
  ///
  /// Uses the default location under the user data directory unless an
  /// explicit path is given.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open store database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Open an in-memory database. Used by tests.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory store database: {}", e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offshell").join("stores.db"))
  }

  /// Run database migrations for the store tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the store tables.
const STORE_SCHEMA: &str = r#"
-- Named stores
CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One entry per request URL per store (serialized response)
CREATE TABLE IF NOT EXISTS entries (
    store_name TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    request_url TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store_name, request_hash),
    FOREIGN KEY (store_name) REFERENCES stores(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_store ON entries(store_name);
"#;

impl CacheStorage for SqliteStorage {
  fn get(&self, store: &str, url: &str) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT data, cached_at FROM entries
         WHERE store_name = ? AND request_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare entry query: {}", e))?;

    let row: Option<(Vec<u8>, String)> = stmt
      .query_row(params![store, request_hash(url)], |row| {
        Ok((row.get(0)?, row.get(1)?))
      })
      .ok();

    match row {
      Some((data, cached_at_str)) => {
        let response: Response = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize cached response: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedEntry {
          response,
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, store: &str, url: &str, response: &Response) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data = serde_json::to_vec(response)
      .map_err(|e| eyre!("Failed to serialize response: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO stores (name) VALUES (?)",
        params![store],
      )
      .map_err(|e| eyre!("Failed to create store {}: {}", store, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (store_name, request_hash, request_url, data, cached_at)
         VALUES (?, ?, ?, ?, datetime('now'))",
        params![store, request_hash(url), url, data],
      )
      .map_err(|e| eyre!("Failed to store entry for {}: {}", url, e))?;

    Ok(())
  }

  fn put_all(&self, store: &str, entries: &[(String, Response)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO stores (name) VALUES (?)",
      params![store],
    )
    .map_err(|e| eyre!("Failed to create store {}: {}", store, e))?;

    for (url, response) in entries {
      let data = serde_json::to_vec(response)
        .map_err(|e| eyre!("Failed to serialize response: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO entries (store_name, request_hash, request_url, data, cached_at)
         VALUES (?, ?, ?, ?, datetime('now'))",
        params![store, request_hash(url), url, data],
      )
      .map_err(|e| eyre!("Failed to store entry for {}: {}", url, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM stores ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare store query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM entries WHERE store_name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", store, e))?;

    conn
      .execute("DELETE FROM stores WHERE name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;

    Ok(())
  }

  fn entry_count(&self, store: &str) -> Result<u64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: u64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE store_name = ?",
        params![store],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", store, e))?;

    Ok(count)
  }
}

/// Stable fixed-length entry key for a request URL.
fn request_hash(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

/// In-memory cache storage. Used by tests and `--ephemeral` runs.
#[derive(Default)]
pub struct MemoryStorage {
  stores: Mutex<HashMap<String, HashMap<String, CachedEntry>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, store: &str, url: &str) -> Result<Option<CachedEntry>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(stores.get(store).and_then(|s| s.get(url)).cloned())
  }

  fn put(&self, store: &str, url: &str, response: &Response) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    stores.entry(store.to_string()).or_default().insert(
      url.to_string(),
      CachedEntry {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );

    Ok(())
  }

  fn put_all(&self, store: &str, entries: &[(String, Response)]) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let target = stores.entry(store.to_string()).or_default();
    for (url, response) in entries {
      target.insert(
        url.clone(),
        CachedEntry {
          response: response.clone(),
          cached_at: Utc::now(),
        },
      );
    }

    Ok(())
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut names: Vec<String> = stores.keys().cloned().collect();
    names.sort();
    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    stores.remove(store);
    Ok(())
  }

  fn entry_count(&self, store: &str) -> Result<u64> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(stores.get(store).map(|s| s.len() as u64).unwrap_or(0))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(body: &[u8]) -> Response {
    Response {
      status: 200,
      content_type: Some("text/html".to_string()),
      body: body.to_vec(),
    }
  }

  #[test]
  fn sqlite_roundtrips_an_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let original = response(b"<html>shell</html>");

    storage
      .put("app-static-v1", "https://pledge.example/", &original)
      .unwrap();

    let entry = storage
      .get("app-static-v1", "https://pledge.example/")
      .unwrap()
      .unwrap();
    assert_eq!(entry.response, original);
  }

  #[test]
  fn sqlite_put_overwrites_by_url() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let url = "https://pledge.example/index.html";

    storage.put("app-static-v1", url, &response(b"old")).unwrap();
    storage.put("app-static-v1", url, &response(b"new")).unwrap();

    assert_eq!(storage.entry_count("app-static-v1").unwrap(), 1);
    let entry = storage.get("app-static-v1", url).unwrap().unwrap();
    assert_eq!(entry.response.body, b"new");
  }

  #[test]
  fn sqlite_put_all_seeds_every_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let entries = vec![
      ("https://pledge.example/".to_string(), response(b"root")),
      (
        "https://pledge.example/index.html".to_string(),
        response(b"index"),
      ),
    ];

    storage.put_all("app-static-v1", &entries).unwrap();

    assert_eq!(storage.store_names().unwrap(), vec!["app-static-v1"]);
    assert_eq!(storage.entry_count("app-static-v1").unwrap(), 2);
  }

  #[test]
  fn sqlite_delete_store_removes_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put("app-static-v0", "https://pledge.example/", &response(b"old"))
      .unwrap();
    storage
      .put("app-static-v1", "https://pledge.example/", &response(b"new"))
      .unwrap();

    storage.delete_store("app-static-v0").unwrap();

    assert_eq!(storage.store_names().unwrap(), vec!["app-static-v1"]);
    assert!(storage
      .get("app-static-v0", "https://pledge.example/")
      .unwrap()
      .is_none());
  }

  #[test]
  fn missing_store_is_a_miss() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert!(storage
      .get("app-v1", "https://pledge.example/api/pledges")
      .unwrap()
      .is_none());
    assert_eq!(storage.entry_count("app-v1").unwrap(), 0);
  }

  #[test]
  fn memory_storage_matches_sqlite_semantics() {
    let storage = MemoryStorage::new();
    let url = "https://pledge.example/api/pledges";

    storage.put("app-v1", url, &response(b"one")).unwrap();
    storage.put("app-v1", url, &response(b"two")).unwrap();

    assert_eq!(storage.entry_count("app-v1").unwrap(), 1);
    assert_eq!(
      storage.get("app-v1", url).unwrap().unwrap().response.body,
      b"two"
    );

    storage.delete_store("app-v1").unwrap();
    assert!(storage.store_names().unwrap().is_empty());
  }
}
