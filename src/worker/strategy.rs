//! Per-request routing decisions.
//!
//! Cross-origin traffic is never intercepted. Same-origin GET requests for
//! shell-like resources go cache-first; everything else (notably API calls)
//! goes network-first.

use url::Url;

use super::types::{Destination, Request};

/// Caching strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Serve from the static store, touching the network only on a miss
  CacheFirst,
  /// Try the network first, falling back to the dynamic store
  NetworkFirst,
  /// Cross-origin - leave the request alone
  Passthrough,
}

/// Path suffixes routed cache-first regardless of destination.
const STATIC_SUFFIXES: &[&str] = &[".json", ".svg", ".ico"];

/// Decide the route for a request against the controller's origin.
pub fn classify(request: &Request, origin: &Url) -> Route {
  if request.url.origin() != origin.origin() {
    return Route::Passthrough;
  }

  if request.is_get()
    && (is_static_destination(request.destination) || has_static_suffix(request.url.path()))
  {
    return Route::CacheFirst;
  }

  Route::NetworkFirst
}

fn is_static_destination(destination: Destination) -> bool {
  matches!(
    destination,
    Destination::Document | Destination::Script | Destination::Style | Destination::Image
  )
}

fn has_static_suffix(path: &str) -> bool {
  STATIC_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}
