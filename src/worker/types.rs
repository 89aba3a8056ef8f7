use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use url::Url;

pub use reqwest::Method;

/// Body of the synthetic response served when a shell asset is unreachable.
pub const OFFLINE_BODY: &str = "Offline - Resource not available";

/// Resource kind a request is fetching, as reported by the page runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Destination {
  Document,
  Script,
  Style,
  Image,
  /// API calls and anything else without a specific kind
  Empty,
}

impl Destination {
  /// Infer a destination from a path, for hosts that don't carry one
  /// (the page runtime normally supplies it with the request).
  pub fn from_path(path: &str) -> Self {
    let name = path.rsplit('/').next().unwrap_or("");
    if name.is_empty() {
      // "/" or a trailing slash resolves to the root document
      return Destination::Document;
    }

    match name.rsplit_once('.').map(|(_, ext)| ext) {
      Some("html") | Some("htm") => Destination::Document,
      Some("js") | Some("mjs") => Destination::Script,
      Some("css") => Destination::Style,
      Some("png") | Some("jpg") | Some("jpeg") | Some("gif") | Some("webp") => Destination::Image,
      _ => Destination::Empty,
    }
  }
}

/// A request routed through the controller.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
}

impl Request {
  /// Build a GET request for the given URL.
  pub fn get(url: Url, destination: Destination) -> Self {
    Self {
      method: Method::GET,
      url,
      destination,
    }
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }
}

/// A response, either live from the network or replayed from a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl Response {
  /// The fixed offline response served when a cache-first request has no
  /// cached copy and the network is unreachable.
  pub fn offline() -> Self {
    Self {
      status: 503,
      content_type: Some("text/plain".to_string()),
      body: OFFLINE_BODY.as_bytes().to_vec(),
    }
  }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Live from the network
  Network,
  /// Replayed from a cache store
  Cache,
  /// Synthesized because the network failed and nothing was cached
  OfflineFallback,
}

impl std::fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      ResponseSource::Network => "network",
      ResponseSource::Cache => "cache",
      ResponseSource::OfflineFallback => "offline-fallback",
    };
    write!(f, "{}", label)
  }
}

/// Result of routing one request through the controller.
#[derive(Debug)]
pub enum FetchOutcome {
  /// The controller produced a response
  Served {
    response: Response,
    source: ResponseSource,
  },
  /// Cross-origin request - not intercepted, the host fetches it itself
  Passthrough,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn root_path_is_a_document() {
    assert_eq!(Destination::from_path("/"), Destination::Document);
    assert_eq!(Destination::from_path("/app/"), Destination::Document);
  }

  #[test]
  fn known_extensions_map_to_kinds() {
    assert_eq!(Destination::from_path("/index.html"), Destination::Document);
    assert_eq!(Destination::from_path("/assets/index.js"), Destination::Script);
    assert_eq!(Destination::from_path("/assets/style.css"), Destination::Style);
    assert_eq!(
      Destination::from_path("/icons/icon-192x192.png"),
      Destination::Image
    );
  }

  #[test]
  fn unknown_paths_have_no_kind() {
    assert_eq!(Destination::from_path("/api/pledges"), Destination::Empty);
    assert_eq!(Destination::from_path("/manifest.json"), Destination::Empty);
  }

  #[test]
  fn offline_response_matches_contract() {
    let response = Response::offline();
    assert_eq!(response.status, 503);
    assert_eq!(response.content_type.as_deref(), Some("text/plain"));
    assert_eq!(response.body, b"Offline - Resource not available");
  }
}
