//! HTTP access for the data sources.
//!
//! Sources talk to an [`HttpClient`] so that credentials and headers can be
//! layered on as decorators ([`auth::UrlParam`], [`auth::Header`]) without the
//! source parsers knowing about them.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use tracing::debug;

/// GETs `url`, treating any non-success status as an error.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes> {
    let req = reqwest::Request::new(
        reqwest::Method::GET,
        url.parse().with_context(|| format!("invalid URL '{url}'"))?,
    );

    let resp = client
        .execute(req)
        .await
        .with_context(|| format!("GET {url} failed"))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("GET {} returned status {}: {}", url, status, body.trim());
    }

    let bytes = resp.bytes().await?;
    debug!(url, bytes = bytes.len(), "Downloaded");
    Ok(bytes)
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Loads a source from a local file path or fetches it over HTTP.
#[tracing::instrument(skip(client))]
pub async fn load_source<C: HttpClient>(client: &C, location: &str) -> Result<Bytes> {
    if is_remote(location) {
        fetch_bytes(client, location).await
    } else {
        let bytes =
            std::fs::read(location).with_context(|| format!("reading '{location}'"))?;
        Ok(Bytes::from(bytes))
    }
}
