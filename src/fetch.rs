use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use tracing::debug;

use crate::model::{AssetsResponse, RemoteCoin};

pub const DEFAULT_ASSETS_URL: &str = "https://api.coincap.io/v2/assets";

/// Anything that can hand the ingestion loop a fresh listing of coins.
#[async_trait]
pub trait CoinSource: Send + Sync {
    async fn fetch_coins(&self) -> Result<Vec<RemoteCoin>>;
}

pub struct CoinCapClient {
    client: reqwest::Client,
    assets_url: String,
}

impl CoinCapClient {
    pub fn new(assets_url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("coinstats/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self {
            client,
            assets_url: assets_url.into(),
        })
    }
}

#[async_trait]
impl CoinSource for CoinCapClient {
    async fn fetch_coins(&self) -> Result<Vec<RemoteCoin>> {
        debug!("GET {}", self.assets_url);

        let body = self
            .client
            .get(&self.assets_url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.assets_url))?
            .error_for_status()?
            .text()
            .await?;

        parse_assets(&body)
    }
}

pub fn parse_assets(body: &str) -> Result<Vec<RemoteCoin>> {
    let resp: AssetsResponse =
        serde_json::from_str(body).context("failed to decode assets response")?;
    Ok(resp.data)
}
