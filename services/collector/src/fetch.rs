//! HTTP retrieval of the listing page and the dataset itself.
//!
//! Every failure here is recoverable: the caller matches on [`FetchOutcome`]
//! and substitutes synthetic data instead of propagating an error.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Desktop browser user agent; the upstream rejects obvious bots.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Bytes inspected when deciding whether a body is an HTML page
const SNIFF_LEN: usize = 200;

const HTML_MARKERS: &[&[u8]] = &[b"<!doctype html", b"<html"];

#[derive(Debug, Error)]
pub enum FetchFailure {
    /// Timeout, DNS, TLS or connection error.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid content: unexpected status {0}")]
    InvalidStatus(StatusCode),

    /// The upstream sometimes answers 200 with an HTML error page.
    #[error("invalid content: body is an HTML page, not CSV")]
    HtmlBody,

    #[error("invalid content: body is empty")]
    EmptyBody,
}

#[derive(Debug)]
pub enum FetchOutcome {
    RealData(Vec<u8>),
    Failed(FetchFailure),
}

pub struct DatasetFetcher {
    client: Client,
}

impl DatasetFetcher {
    /// Build a client that looks like a browser arriving from `referer`.
    ///
    /// Certificate validation is disabled: the upstream has served an
    /// incomplete chain for years. This client is only ever pointed at that
    /// one site.
    pub fn new(referer: &Url, timeout: Duration) -> Result<Self> {
        warn!(
            host = referer.host_str().unwrap_or_default(),
            "TLS certificate validation disabled for upstream"
        );

        let client = browser_client(referer, timeout)?
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    /// Fetch the listing page as text.
    pub async fn fetch_page(&self, url: &Url) -> Result<String, FetchFailure> {
        info!(%url, "fetching listing page");
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchFailure::InvalidStatus(status));
        }
        Ok(resp.text().await?)
    }

    /// Single attempt at downloading the dataset. Never errors; failures come
    /// back as [`FetchOutcome::Failed`].
    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        info!(%url, "downloading dataset");
        match self.try_fetch(url).await {
            Ok(bytes) => {
                info!(bytes = bytes.len(), "dataset downloaded");
                FetchOutcome::RealData(bytes)
            }
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    async fn try_fetch(&self, url: &Url) -> Result<Vec<u8>, FetchFailure> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchFailure::InvalidStatus(status));
        }
        let bytes = resp.bytes().await?;
        classify_body(&bytes)?;
        Ok(bytes.to_vec())
    }
}

fn browser_client(referer: &Url, timeout: Duration) -> Result<ClientBuilder> {
    let mut headers = HeaderMap::new();
    headers.insert(
        REFERER,
        HeaderValue::from_str(referer.as_str()).context("Referer is not a valid header value")?,
    );

    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .danger_accept_invalid_certs(true))
}

/// Reject bodies that are blank or plainly an HTML document.
pub fn classify_body(body: &[u8]) -> Result<(), FetchFailure> {
    if body.iter().all(u8::is_ascii_whitespace) {
        Err(FetchFailure::EmptyBody)
    } else if looks_like_html(body) {
        Err(FetchFailure::HtmlBody)
    } else {
        Ok(())
    }
}

pub fn looks_like_html(body: &[u8]) -> bool {
    let head = body[..body.len().min(SNIFF_LEN)].to_ascii_lowercase();
    HTML_MARKERS
        .iter()
        .any(|marker| head.windows(marker.len()).any(|w| w == *marker))
}
