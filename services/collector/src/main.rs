//! Collector Service - Downloads the quarterly housing-loan default-rate CSV
//!
//! Responsibilities:
//! - Find the dataset link on the public listing page
//! - Download the CSV with browser-like headers (single attempt, no retries)
//! - Fall back to a synthetic dataset when the real one is unavailable
//! - Store the result as the CSV snapshot read by the parser
//!
//! Usage:
//!   # Real data, falling back to synthetic on any failure:
//!   cargo run --bin collector
//!
//!   # Skip the network entirely, reproducible synthetic data:
//!   cargo run --bin collector -- --offline --seed 7

mod fetch;
mod links;
mod synthetic;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use fetch::{DatasetFetcher, FetchOutcome};
use links::{LinkResolution, LinkResolver};

const DEFAULT_PAGE_URL: &str = "https://pip.moi.gov.tw/Publicize/Info/E3030";
const DEFAULT_TARGET_LABEL: &str = "本季購置住宅貸款違約率";
const SNAPSHOT_FILE: &str = "housing_loan_default_rate.csv";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Parser, Debug)]
#[command(name = "collector", about = "Collects the housing-loan default-rate dataset")]
struct Args {
    /// Listing page that links to the dataset (overrides SOURCE_PAGE_URL)
    #[arg(long)]
    page_url: Option<String>,

    /// Label searched for in link titles (overrides TARGET_LABEL)
    #[arg(long)]
    target_label: Option<String>,

    /// Output root (overrides DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Skip the network and write synthetic data
    #[arg(long, default_value = "false")]
    offline: bool,

    /// Seed for the synthetic generator
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone)]
struct Config {
    page_url: Url,
    target_label: String,
    data_dir: PathBuf,
    timeout: Duration,
}

impl Config {
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let page_url = lookup("SOURCE_PAGE_URL").unwrap_or_else(|| DEFAULT_PAGE_URL.to_string());
        Ok(Self {
            page_url: Url::parse(&page_url).context("SOURCE_PAGE_URL is not a valid URL")?,
            target_label: lookup("TARGET_LABEL").unwrap_or_else(|| DEFAULT_TARGET_LABEL.to_string()),
            data_dir: PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "./data".to_string())),
            timeout: Duration::from_secs(
                lookup("HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .filter(|&secs: &u64| secs > 0)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        })
    }

    /// Command-line flags win over the environment.
    fn with_args(mut self, args: &Args) -> Result<Self> {
        if let Some(url) = &args.page_url {
            self.page_url = Url::parse(url).context("--page-url is not a valid URL")?;
        }
        if let Some(label) = &args.target_label {
            self.target_label = label.clone();
        }
        if let Some(dir) = &args.data_dir {
            self.data_dir = dir.clone();
        }
        Ok(self)
    }

    fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("csv").join(SNAPSHOT_FILE)
    }
}

/// Where the snapshot bytes came from
#[derive(Debug)]
enum SnapshotOrigin {
    Downloaded(Url),
    Synthetic { rows: usize },
}

/// Listing page -> dataset link -> dataset bytes.
///
/// Returns `None` whenever real data cannot be had; every failure on the way
/// is logged and absorbed here.
async fn download_real(config: &Config) -> Option<(Url, Vec<u8>)> {
    let fetcher = match DatasetFetcher::new(&config.page_url, config.timeout) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "could not set up HTTP client");
            return None;
        }
    };

    let html = match fetcher.fetch_page(&config.page_url).await {
        Ok(html) => html,
        Err(e) => {
            warn!(error = %e, "could not fetch listing page");
            return None;
        }
    };

    let resolver = match LinkResolver::new(config.target_label.as_str()) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "could not build link resolver");
            return None;
        }
    };

    info!(label = resolver.target_label(), "searching for CSV link");
    let csv_url = match resolver.resolve(&html, &config.page_url) {
        LinkResolution::Found { url, title } => {
            info!(%url, %title, "found CSV link");
            url
        }
        LinkResolution::NotFound { labels } => {
            warn!(label = resolver.target_label(), "could not find the CSV link");
            for label in &labels {
                info!("  candidate: {}", label);
            }
            return None;
        }
    };

    match fetcher.fetch(&csv_url).await {
        FetchOutcome::RealData(bytes) => Some((csv_url, bytes)),
        FetchOutcome::Failed(reason) => {
            warn!(error = %reason, "download failed");
            None
        }
    }
}

fn synthetic_snapshot(seed: Option<u64>) -> Result<(Vec<u8>, usize)> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let records = synthetic::generate(&mut rng);
    let bytes = synthetic::to_csv_bytes(&records)?;
    Ok((bytes, records.len()))
}

/// Overwrite the snapshot; returns its content hash.
async fn save_snapshot(path: &Path, bytes: &[u8]) -> Result<String> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?.with_args(&args)?;

    info!("=== Housing Loan Default Rate Collector ===");
    info!(page = %config.page_url, data_dir = %config.data_dir.display(), "configuration");

    let real = if args.offline {
        info!("offline mode - skipping network");
        None
    } else {
        download_real(&config).await
    };

    let (bytes, origin) = match real {
        Some((url, bytes)) => (bytes, SnapshotOrigin::Downloaded(url)),
        None => {
            warn!("could not download real data; generating SAMPLE data for demonstration");
            let (bytes, rows) = synthetic_snapshot(args.seed)?;
            (bytes, SnapshotOrigin::Synthetic { rows })
        }
    };

    let path = config.snapshot_path();
    let content_hash = save_snapshot(&path, &bytes).await?;

    info!(path = %path.display(), bytes = bytes.len(), hash = %content_hash, "snapshot saved");
    match &origin {
        SnapshotOrigin::Downloaded(url) => info!(%url, "snapshot holds real data"),
        SnapshotOrigin::Synthetic { rows } => warn!(rows, "snapshot holds synthetic data"),
    }

    println!("\n=== Collection Complete ===");
    println!(
        "Ready for parsing: cargo run --bin parser -- --snapshot {}",
        path.display()
    );

    Ok(())
}
