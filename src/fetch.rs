//! HTTP fetcher adapter (C2): a narrow capability for fetching one URL.

use std::time::Duration;

use async_trait::async_trait;
use owo_colors::OwoColorize;
use reqwest::Client;

use crate::error::{Res, ResExt};

/// Default per-request timeout, per spec.md §4.C2.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(7);

/// Single-URL GET, abstracted so the crawl engine never depends on a
/// concrete HTTP client. Replaceable by a test double.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Res<(u16, String)>;
}

pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Res<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Res<(u16, String)> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {}", url.bright_blue().italic()))?;

        let status = resp.status().as_u16();

        let text = resp.text().await.with_context(|| {
            format!("Failed to read response body for URL: {}", url.bright_blue().italic())
        })?;

        Ok((status, text))
    }
}
