//! Network access behind a trait so routing logic can be tested without I/O.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};

use super::types::{Request, Response};

/// Trait for performing network fetches.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
  /// Fetch a request from the network.
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// reqwest-backed fetcher used by the CLI host.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Fetch failed for {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .map(String::from);

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", request.url, e))?
      .to_vec();

    Ok(Response {
      status,
      content_type,
      body,
    })
  }
}
