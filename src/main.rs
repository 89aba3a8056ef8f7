mod cache;
mod config;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use url::Url;

use cache::{CacheStorage, MemoryStorage, SqliteStorage};
use config::Config;
use worker::types::Method;
use worker::{
  Destination, FetchOutcome, HttpFetcher, NetworkFetcher, OfflineController, Request,
};

#[derive(Parser, Debug)]
#[command(name = "offshell")]
#[command(about = "Offline shell cache controller for PWA-style web apps")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offshell/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep caches in memory for this run instead of the store database
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Seed the static store with the shell manifest, then activate
  Install {
    /// Seed only; skip the activation sweep afterwards
    #[arg(long)]
    no_activate: bool,
  },
  /// Delete cache stores left behind by superseded versions
  Activate,
  /// Route a request through the controller and print the response body
  Fetch {
    /// URL, or an absolute path resolved against the configured origin
    url: String,

    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Resource kind; inferred from the path when omitted
    #[arg(short, long, value_enum)]
    kind: Option<Destination>,
  },
  /// Show cache stores and entry counts
  Status {
    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  init_tracing();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  if args.ephemeral {
    run(MemoryStorage::new(), &config, args.command).await
  } else {
    run(
      SqliteStorage::open(config.store_path.as_deref())?,
      &config,
      args.command,
    )
    .await
  }
}

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

async fn run<S: CacheStorage + 'static>(storage: S, config: &Config, command: Command) -> Result<()> {
  let origin = config.origin_url()?;
  let names = config.cache_names();
  let fetcher = HttpFetcher::new()?;
  let controller = OfflineController::new(
    storage,
    fetcher.clone(),
    origin.clone(),
    names.clone(),
    config.shell_manifest()?,
  );

  match command {
    Command::Install { no_activate } => {
      controller.on_install().await?;
      println!(
        "Installed {} shell assets into {}",
        config.shell.len(),
        names.static_store
      );

      // The controller skips its waiting period; honor that unless told not to
      if !no_activate && controller.skip_waiting_requested() {
        controller.on_activate().await?;
        println!("Activated {}", names.dynamic_store);
      }
      tracing::debug!(phase = ?controller.phase(), "lifecycle complete");
    }
    Command::Activate => {
      controller.on_activate().await?;
      println!(
        "Active stores: {} / {}",
        names.static_store, names.dynamic_store
      );
    }
    Command::Fetch { url, method, kind } => {
      let request = build_request(&origin, &url, &method, kind)?;

      match controller.on_fetch(&request).await? {
        FetchOutcome::Served { response, source } => {
          eprintln!("{} {} ({})", response.status, request.url, source);
          std::io::stdout().write_all(&response.body)?;
        }
        FetchOutcome::Passthrough => {
          // Cross-origin: not intercepted, fetch it like any other client
          let response = fetcher.fetch(&request).await?;
          eprintln!("{} {} (passthrough)", response.status, request.url);
          std::io::stdout().write_all(&response.body)?;
        }
      }
    }
    Command::Status { json } => {
      let summaries = controller.store_summaries()?;

      if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
      } else if summaries.is_empty() {
        println!("No cache stores");
      } else {
        println!("{:<40} {:>8}  CURRENT", "STORE", "ENTRIES");
        for summary in summaries {
          println!(
            "{:<40} {:>8}  {}",
            summary.name,
            summary.entries,
            if summary.current { "yes" } else { "" }
          );
        }
      }
    }
  }

  Ok(())
}

fn build_request(
  origin: &Url,
  url: &str,
  method: &str,
  kind: Option<Destination>,
) -> Result<Request> {
  let url = if url.starts_with('/') {
    origin
      .join(url)
      .map_err(|e| eyre!("Invalid path {}: {}", url, e))?
  } else {
    Url::parse(url).map_err(|e| eyre!("Invalid URL {}: {}", url, e))?
  };

  let method = Method::from_bytes(method.to_uppercase().as_bytes())
    .map_err(|_| eyre!("Invalid HTTP method: {}", method))?;

  let destination = kind.unwrap_or_else(|| Destination::from_path(url.path()));

  Ok(Request {
    method,
    url,
    destination,
  })
}
