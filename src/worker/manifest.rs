//! Versioned cache naming and the install-time shell manifest.

use color_eyre::{eyre::eyre, Result};

/// Names of the two stores managed by the controller.
///
/// Both names embed the version tag. Bumping the tag is the only way to
/// invalidate previously stored entries: old-named stores become unreachable
/// and are swept on the next activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  /// Store seeded with shell assets at install time
  pub static_store: String,
  /// Store populated opportunistically by the network-first path
  pub dynamic_store: String,
}

impl CacheNames {
  /// Derive both store names from the app name and version tag.
  pub fn new(app: &str, version: &str) -> Self {
    Self {
      static_store: format!("{}-static-{}", app, version),
      dynamic_store: format!("{}-{}", app, version),
    }
  }

  /// Whether a store name belongs to the current deployment.
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_store || name == self.dynamic_store
  }
}

/// The fixed list of same-origin paths seeded into the static store.
#[derive(Debug, Clone)]
pub struct ShellManifest {
  paths: Vec<String>,
}

impl ShellManifest {
  /// Build a manifest, validating that every entry is an absolute path.
  pub fn new(paths: Vec<String>) -> Result<Self> {
    for path in &paths {
      if !path.starts_with('/') {
        return Err(eyre!(
          "Shell manifest entries must be absolute paths, got: {}",
          path
        ));
      }
    }

    Ok(Self { paths })
  }

  pub fn paths(&self) -> &[String] {
    &self.paths
  }
}
