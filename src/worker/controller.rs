//! Lifecycle controller for the offline cache.
//!
//! Drives the install/activate/fetch state machine the host hands us events
//! for: seed the shell at install, sweep superseded stores at activation,
//! and route every fetch through a caching strategy.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStorage;

use super::fetcher::NetworkFetcher;
use super::manifest::{CacheNames, ShellManifest};
use super::strategy::{classify, Route};
use super::types::{Destination, FetchOutcome, Request, Response, ResponseSource};

/// Lifecycle phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Loaded but not yet installed
  New,
  /// Shell assets seeded into the static store
  Installed,
  /// Controlling fetches; superseded stores swept
  Active,
}

/// One row of store inspection output.
#[derive(Debug, Serialize)]
pub struct StoreSummary {
  pub name: String,
  pub entries: u64,
  /// Whether the store belongs to the current version
  pub current: bool,
}

/// The offline cache controller.
///
/// Generic over storage and network access so the strategy logic can be
/// exercised against in-memory fakes.
pub struct OfflineController<S, N> {
  storage: Arc<S>,
  fetcher: Arc<N>,
  origin: Url,
  names: CacheNames,
  manifest: ShellManifest,
  phase: Mutex<Phase>,
  skip_waiting: AtomicBool,
}

impl<S, N> OfflineController<S, N>
where
  S: CacheStorage + 'static,
  N: NetworkFetcher,
{
  pub fn new(
    storage: S,
    fetcher: N,
    origin: Url,
    names: CacheNames,
    manifest: ShellManifest,
  ) -> Self {
    Self {
      storage: Arc::new(storage),
      fetcher: Arc::new(fetcher),
      origin,
      names,
      manifest,
      phase: Mutex::new(Phase::New),
      skip_waiting: AtomicBool::new(false),
    }
  }

  pub fn phase(&self) -> Phase {
    self.phase.lock().map(|p| *p).unwrap_or(Phase::New)
  }

  /// Whether the controller has asked to activate without the usual wait.
  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  /// Seed the static store with every shell asset.
  ///
  /// All-or-nothing: if any manifest fetch fails, the install fails and the
  /// static store for this version is never written.
  pub async fn on_install(&self) -> Result<()> {
    info!(store = %self.names.static_store, "installing shell assets");

    let mut fetches = Vec::new();
    for path in self.manifest.paths() {
      let url = self
        .origin
        .join(path)
        .map_err(|e| eyre!("Invalid shell path {}: {}", path, e))?;
      let request = Request::get(url, Destination::from_path(path));

      fetches.push(async move {
        let response = self.fetcher.fetch(&request).await?;
        Ok::<(String, Response), color_eyre::Report>((request.url.to_string(), response))
      });
    }

    let entries = try_join_all(fetches)
      .await
      .map_err(|e| eyre!("Install aborted, shell asset unavailable: {}", e))?;

    self.storage.put_all(&self.names.static_store, &entries)?;
    self.set_phase(Phase::Installed)?;
    self.skip_waiting.store(true, Ordering::SeqCst);

    info!(assets = entries.len(), "shell install complete");
    Ok(())
  }

  /// Delete stores left behind by superseded versions, then take control.
  ///
  /// Deletions are independent: one failing store never blocks the rest.
  pub async fn on_activate(&self) -> Result<()> {
    for name in self.storage.store_names()? {
      if self.names.is_current(&name) {
        continue;
      }

      debug!(store = %name, "deleting superseded cache store");
      if let Err(err) = self.storage.delete_store(&name) {
        warn!(store = %name, "failed to delete superseded store: {}", err);
      }
    }

    self.set_phase(Phase::Active)?;
    Ok(())
  }

  /// Route one request, producing the response the page should see.
  pub async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome> {
    match classify(request, &self.origin) {
      Route::Passthrough => Ok(FetchOutcome::Passthrough),
      Route::CacheFirst => self.cache_first(request).await,
      Route::NetworkFirst => self.network_first(request).await,
    }
  }

  /// Background-sync hook. No-op placeholder.
  #[allow(dead_code)]
  pub fn on_sync(&self, tag: &str) {
    debug!(tag, "ignoring background sync event");
  }

  /// Summaries of all stores, current ones flagged.
  pub fn store_summaries(&self) -> Result<Vec<StoreSummary>> {
    let mut summaries = Vec::new();
    for name in self.storage.store_names()? {
      summaries.push(StoreSummary {
        entries: self.storage.entry_count(&name)?,
        current: self.names.is_current(&name),
        name,
      });
    }

    Ok(summaries)
  }

  /// Serve from the static store; on a miss fetch and cache; offline with no
  /// cached copy yields the fixed 503 response. A hit is never revalidated.
  async fn cache_first(&self, request: &Request) -> Result<FetchOutcome> {
    let url = request.url.as_str();

    if let Some(entry) = self.storage.get(&self.names.static_store, url)? {
      debug!(url = %request.url, cached_at = %entry.cached_at, "serving shell asset from cache");
      return Ok(FetchOutcome::Served {
        response: entry.response,
        source: ResponseSource::Cache,
      });
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.storage.put(&self.names.static_store, url, &response)?;
        Ok(FetchOutcome::Served {
          response,
          source: ResponseSource::Network,
        })
      }
      Err(err) => {
        warn!(url = %request.url, "offline with no cached copy: {}", err);
        Ok(FetchOutcome::Served {
          response: Response::offline(),
          source: ResponseSource::OfflineFallback,
        })
      }
    }
  }

  /// Try the network; successful GET responses are copied into the dynamic
  /// store without blocking the caller. On failure fall back to the dynamic
  /// store, or surface the error when nothing is cached.
  async fn network_first(&self, request: &Request) -> Result<FetchOutcome> {
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if request.is_get() {
          // The caller gets the live response; the store gets its own copy.
          let copy = response.clone();
          let storage = Arc::clone(&self.storage);
          let store = self.names.dynamic_store.clone();
          let url = request.url.to_string();

          tokio::spawn(async move {
            if let Err(err) = storage.put(&store, &url, &copy) {
              warn!(store = %store, url = %url, "failed to cache response: {}", err);
            }
          });
        }

        Ok(FetchOutcome::Served {
          response,
          source: ResponseSource::Network,
        })
      }
      Err(err) => {
        // Only GET responses are ever cached, so only a GET can match.
        let cached = if request.is_get() {
          self.storage.get(&self.names.dynamic_store, request.url.as_str())?
        } else {
          None
        };

        match cached {
          Some(entry) => {
            debug!(url = %request.url, cached_at = %entry.cached_at, "network failed, serving cached copy");
            Ok(FetchOutcome::Served {
              response: entry.response,
              source: ResponseSource::Cache,
            })
          }
          // No cached copy: the failure belongs to the caller.
          None => Err(err),
        }
      }
    }
  }

  fn set_phase(&self, phase: Phase) -> Result<()> {
    let mut current = self
      .phase
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *current = phase;
    Ok(())
  }

  #[cfg(test)]
  fn storage(&self) -> &S {
    &self.storage
  }
}
