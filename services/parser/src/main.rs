//! Parser Service - Turns the collector's CSV snapshot into the six-city chart
//!
//! Responsibilities:
//! - Decode the snapshot (UTF-8, Big5 or UTF-16)
//! - Identify the time, region and rate columns
//! - Normalize city names and rates, keep the six special municipalities
//! - Pivot into a chronologically ordered period × city table
//! - Render the stacked SVG chart (and optionally print the table as JSON)
//!
//! Same snapshot = same table = same chart.
//!
//! Usage:
//!   cargo run --bin parser
//!   cargo run --bin parser -- --snapshot data/csv/housing_loan_default_rate.csv --json

mod chart;
mod error;
mod loader;
mod normalize;
mod period;
mod reshape;
mod schema;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chart::ChartLayout;
use error::PipelineError;
use normalize::{Municipalities, Normalizer};
use reshape::{ReshapedTable, Reshaper};

const SNAPSHOT_FILE: &str = "housing_loan_default_rate.csv";
const CHART_FILE: &str = "six_cities_default_rate.svg";
const PREVIEW_ROWS: usize = 5;

#[derive(Parser, Debug)]
#[command(name = "parser", about = "Builds the six-city default-rate table and chart")]
struct Args {
    /// CSV snapshot to read (default: <DATA_DIR>/csv/housing_loan_default_rate.csv)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// SVG output path (default: <DATA_DIR>/svg/six_cities_default_rate.svg)
    #[arg(long)]
    chart: Option<PathBuf>,

    /// Output root (overrides DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Print the reshaped table to stdout as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone)]
struct Config {
    snapshot_path: PathBuf,
    chart_path: PathBuf,
}

impl Config {
    fn from_env(args: &Args) -> Self {
        Self::resolve(std::env::var("DATA_DIR").ok(), args)
    }

    /// Explicit paths beat `--data-dir`, which beats `DATA_DIR`.
    fn resolve(env_data_dir: Option<String>, args: &Args) -> Self {
        let data_dir = args
            .data_dir
            .clone()
            .or_else(|| env_data_dir.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("./data"));

        Self {
            snapshot_path: args
                .snapshot
                .clone()
                .unwrap_or_else(|| data_dir.join("csv").join(SNAPSHOT_FILE)),
            chart_path: args
                .chart
                .clone()
                .unwrap_or_else(|| data_dir.join("svg").join(CHART_FILE)),
        }
    }
}

/// Snapshot bytes -> reshaped table. Deterministic.
fn run_pipeline(bytes: &[u8], cities: &Municipalities) -> Result<ReshapedTable, PipelineError> {
    let table = loader::load(bytes)?;
    let mapping = schema::identify(&table.headers)?;
    let records = Normalizer::new(cities).normalize(&table, &mapping)?;
    Ok(Reshaper::new(cities).reshape(&records))
}

fn log_preview(table: &ReshapedTable) {
    info!(
        periods = table.periods().len(),
        cities = ?table.cities(),
        "reshaped table"
    );
    for period in table.periods().iter().take(PREVIEW_ROWS) {
        let cells: Vec<String> = table
            .cities()
            .iter()
            .map(|city| {
                table
                    .value(*period, city)
                    .map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
            })
            .collect();
        info!("  {:>6} | {}", period.to_string(), cells.join(" | "));
    }
    if table.periods().len() > PREVIEW_ROWS {
        info!("  ... and {} more", table.periods().len() - PREVIEW_ROWS);
    }
}

fn write_chart(table: &ReshapedTable, path: &Path) -> Result<()> {
    let svg = chart::render_svg(table, &ChartLayout::default()).context("Failed to render chart")?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    fs::write(path, svg).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout is reserved for --json
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    let config = Config::from_env(&args);

    info!("=== Housing Loan Default Rate Parser ===");
    info!(snapshot = %config.snapshot_path.display(), "reading snapshot");

    let bytes = fs::read(&config.snapshot_path).with_context(|| {
        format!(
            "Failed to read snapshot {} (run the collector first)",
            config.snapshot_path.display()
        )
    })?;
    info!(bytes = bytes.len(), "snapshot loaded");

    let cities = Municipalities::six_special();
    let table = run_pipeline(&bytes, &cities)
        .inspect_err(|e| error!(error = %e, "pipeline stopped"))
        .context("Failed to build the six-city table")?;

    log_preview(&table);

    write_chart(&table, &config.chart_path)?;
    info!(path = %config.chart_path.display(), "saved chart");

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&table.export()).context("Failed to encode table")?
        );
    }

    eprintln!("\n=== Parsing Complete ===");
    eprintln!(
        "Periods: {} ({} .. {})",
        table.periods().len(),
        table.periods().first().map(ToString::to_string).unwrap_or_default(),
        table.periods().last().map(ToString::to_string).unwrap_or_default()
    );
    eprintln!("Cities: {}", table.cities().join(", "));

    Ok(())
}

// =============================================================================
// TESTS - whole pipeline, bytes in, table out
// =============================================================================
