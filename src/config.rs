use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::worker::{CacheNames, ShellManifest};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the controller treats as its own; everything else passes through
  pub origin: String,
  /// App name used as the cache-name prefix
  #[serde(default = "default_app")]
  pub app: String,
  /// Version tag embedded in both cache names.
  /// Bump it on every deploy that changes cached assets.
  #[serde(default = "default_version")]
  pub version: String,
  /// Shell asset paths seeded at install time
  #[serde(default = "default_shell")]
  pub shell: Vec<String>,
  /// Override for the store database location
  pub store_path: Option<PathBuf>,
}

fn default_app() -> String {
  "offshell".to_string()
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_shell() -> Vec<String> {
  [
    "/",
    "/index.html",
    "/assets/index.js",
    "/manifest.json",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
    "/favicon.ico",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offshell.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offshell/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/offshell/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offshell.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offshell").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// The configured origin as a parsed URL.
  pub fn origin_url(&self) -> Result<Url> {
    let url =
      Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))?;

    if url.cannot_be_a_base() || url.host_str().is_none() {
      return Err(eyre!(
        "Origin must be an absolute http(s) URL: {}",
        self.origin
      ));
    }

    Ok(url)
  }

  /// Cache store names for the configured app and version.
  pub fn cache_names(&self) -> CacheNames {
    CacheNames::new(&self.app, &self.version)
  }

  /// The validated shell manifest.
  pub fn shell_manifest(&self) -> Result<ShellManifest> {
    ShellManifest::new(self.shell.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minimal_config_gets_defaults() {
    let config = Config::parse("origin: https://pledge.example\n").unwrap();

    assert_eq!(config.app, "offshell");
    assert_eq!(config.version, "v1");
    assert!(config.shell.contains(&"/index.html".to_string()));
    assert!(config.store_path.is_none());
  }

  #[test]
  fn full_config_overrides_defaults() {
    let yaml = "\
origin: https://pledge.example
app: pledge
version: v3
shell:
  - /
  - /index.html
store_path: /tmp/stores.db
";
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.cache_names().static_store, "pledge-static-v3");
    assert_eq!(config.cache_names().dynamic_store, "pledge-v3");
    assert_eq!(config.shell_manifest().unwrap().paths().len(), 2);
  }

  #[test]
  fn bad_origin_is_rejected() {
    let config = Config::parse("origin: not a url\n").unwrap();
    assert!(config.origin_url().is_err());
  }
}
