//! The offline cache controller: lifecycle, routing strategies, shell
//! manifest, and network access.
//!
//! The controller mirrors the three lifecycle events a hosting page runtime
//! delivers - install, activate, fetch - as methods over injected storage
//! and network abstractions, so every strategy is testable without a
//! browser or a live server.

mod controller;
mod fetcher;
mod manifest;
mod strategy;
pub mod types;

pub use controller::{OfflineController, Phase, StoreSummary};
pub use fetcher::{HttpFetcher, NetworkFetcher};
pub use manifest::{CacheNames, ShellManifest};
pub use types::{Destination, FetchOutcome, Request, Response, ResponseSource};
