//! Core trait and types for the named cache stores.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::worker::types::Response;

/// A single cached response.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  /// The stored response
  pub response: Response,
  /// When the response was cached
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache store backends.
///
/// A backend holds any number of named stores, each mapping a request URL to
/// one response. A put overwrites any existing entry for the same URL, so a
/// store never holds two entries for one URL. Stores are created lazily by
/// the first write that names them.
pub trait CacheStorage: Send + Sync {
  /// Look up a cached response by request URL.
  fn get(&self, store: &str, url: &str) -> Result<Option<CachedEntry>>;

  /// Store a response, creating the store if it does not exist yet.
  fn put(&self, store: &str, url: &str, response: &Response) -> Result<()>;

  /// Store several responses in one step, creating the store if needed.
  ///
  /// Either every entry is written or none are.
  fn put_all(&self, store: &str, entries: &[(String, Response)]) -> Result<()>;

  /// Names of all stores currently present.
  fn store_names(&self) -> Result<Vec<String>>;

  /// Delete a store and all of its entries.
  fn delete_store(&self, store: &str) -> Result<()>;

  /// Number of entries in a store (zero if the store does not exist).
  fn entry_count(&self, store: &str) -> Result<u64>;
}
