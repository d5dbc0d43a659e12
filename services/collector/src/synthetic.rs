//! Synthetic stand-in for the real dataset.
//!
//! Only used when the upstream cannot be reached or serves something other
//! than CSV. The schema matches the real feed; values follow three regimes
//! along the time axis: a pre-crisis baseline, the 2008-2010 crisis spike
//! (ROC years 97-99, peaking in 98), and a slow post-crisis decay toward a low
//! floor.

use anyhow::{anyhow, Result};
use rand::Rng;
use serde::Serialize;
use std::ops::RangeInclusive;

pub const SYNTHETIC_CITIES: [&str; 6] = ["臺北市", "新北市", "桃園市", "臺中市", "臺南市", "高雄市"];

/// ROC calendar years covered
const YEARS: RangeInclusive<u32> = 95..=115;
const CRISIS_YEARS: RangeInclusive<u32> = 97..=99;
const CRISIS_PEAK_YEAR: u32 = 98;

const RATE_FLOOR: f64 = 0.01;
const CITY_NOISE: f64 = 0.02;

const UTF8_SIGNATURE: &[u8] = b"\xEF\xBB\xBF";

/// One row in the real feed's column layout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntheticRecord {
    #[serde(rename = "季別")]
    pub period: String,
    #[serde(rename = "縣市別")]
    pub region: String,
    #[serde(rename = "購置住宅貸款違約率")]
    pub rate: String,
}

/// Period-wide rate before the per-city modifier.
fn base_rate<R: Rng>(year: u32, rng: &mut R) -> f64 {
    if CRISIS_YEARS.contains(&year) {
        if year == CRISIS_PEAK_YEAR {
            1.3 + rng.gen_range(-0.1..=0.2)
        } else {
            0.8 + rng.gen_range(-0.1..=0.1)
        }
    } else if year < *CRISIS_YEARS.start() {
        0.6 + rng.gen_range(-0.1..=0.1)
    } else {
        let decay = f64::from(YEARS.end().saturating_sub(year)) / 20.0 * 0.1;
        0.08 + decay + rng.gen_range(-0.02..=0.03)
    }
}

fn city_modifier(city: &str) -> f64 {
    match city {
        "臺北市" => 1.4,
        "桃園市" => 0.7,
        "臺中市" | "臺南市" | "高雄市" => 0.9,
        _ => 1.0,
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One record per (year, quarter, city).
pub fn generate<R: Rng>(rng: &mut R) -> Vec<SyntheticRecord> {
    let periods = YEARS.clone().count() * 4;
    let mut records = Vec::with_capacity(periods * SYNTHETIC_CITIES.len());

    for year in YEARS {
        for quarter in 1..=4 {
            let base = base_rate(year, rng);
            for city in SYNTHETIC_CITIES {
                let noisy = base * city_modifier(city) + rng.gen_range(-CITY_NOISE..=CITY_NOISE);
                let rate = round_cents(noisy).max(RATE_FLOOR);
                records.push(SyntheticRecord {
                    period: format!("{year}Q{quarter}"),
                    region: city.to_string(),
                    rate: format!("{rate}%"),
                });
            }
        }
    }

    records
}

/// Serialize as CSV with a UTF-8 signature, like a spreadsheet export.
pub fn to_csv_bytes(records: &[SyntheticRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(UTF8_SIGNATURE.to_vec());
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush synthetic CSV: {}", e.error()))
}
