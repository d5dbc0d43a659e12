//! Raw rows -> normalized (period, city, rate) records.
//!
//! Total over malformed input: rows with an unknown region, an unparseable
//! rate or an unparseable period are dropped and counted, never fatal on their
//! own.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::loader::RawTable;
use crate::period::PeriodKey;
use crate::schema::ColumnMapping;

/// The six special municipalities, in chart order.
pub const SIX_SPECIAL_MUNICIPALITIES: [&str; 6] =
    ["臺北市", "新北市", "桃園市", "臺中市", "臺南市", "高雄市"];

/// Simplified-form spellings seen in the feed
const CITY_ALIASES: [(&str, &str); 3] = [
    ("台北市", "臺北市"),
    ("台中市", "臺中市"),
    ("台南市", "臺南市"),
];

/// Reference data shared by the normalizer and the reshaper.
#[derive(Debug, Clone)]
pub struct Municipalities {
    targets: Vec<String>,
    aliases: HashMap<String, String>,
}

impl Municipalities {
    pub fn new<T, A, B>(targets: T, aliases: impl IntoIterator<Item = (A, B)>) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            aliases: aliases
                .into_iter()
                .map(|(alias, canonical)| (alias.into(), canonical.into()))
                .collect(),
        }
    }

    pub fn six_special() -> Self {
        Self::new(SIX_SPECIAL_MUNICIPALITIES, CITY_ALIASES)
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Trimmed, alias-resolved spelling.
    pub fn canonical<'a>(&'a self, raw: &'a str) -> &'a str {
        let trimmed = raw.trim();
        self.aliases
            .get(trimmed)
            .map(String::as_str)
            .unwrap_or(trimmed)
    }

    /// Chart position of a canonical city name.
    pub fn position(&self, city: &str) -> Option<usize> {
        self.targets.iter().position(|t| t == city)
    }
}

impl Default for Municipalities {
    fn default() -> Self {
        Self::six_special()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub period: PeriodKey,
    pub region: String,
    pub rate: f64,
}

/// `"1.23%"` -> 1.23. Negative, non-finite and non-numeric values are `None`.
pub fn parse_rate(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let value: f64 = number.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

pub struct Normalizer<'a> {
    cities: &'a Municipalities,
}

impl<'a> Normalizer<'a> {
    pub fn new(cities: &'a Municipalities) -> Self {
        Self { cities }
    }

    pub fn normalize(
        &self,
        table: &RawTable,
        mapping: &ColumnMapping,
    ) -> Result<Vec<NormalizedRecord>, PipelineError> {
        let mut out = Vec::new();
        let mut unmatched: Vec<String> = Vec::new();
        let mut in_scope = 0;
        let mut bad_rate = 0;
        let mut bad_period = 0;

        for record in &table.records {
            let raw_region = record.get(mapping.region.index).unwrap_or("").trim();
            let region = self.cities.canonical(raw_region);

            if self.cities.position(region).is_none() {
                if !unmatched.iter().any(|r| r == raw_region) {
                    unmatched.push(raw_region.to_string());
                }
                continue;
            }
            in_scope += 1;

            let raw_rate = record.get(mapping.rate.index).unwrap_or("");
            let Some(rate) = parse_rate(raw_rate) else {
                debug!(region, rate = raw_rate, "dropping non-numeric rate");
                bad_rate += 1;
                continue;
            };

            let raw_period = record.get(mapping.time.index).unwrap_or("");
            let Ok(period) = raw_period.parse::<PeriodKey>() else {
                debug!(region, period = raw_period, "dropping unrecognised period");
                bad_period += 1;
                continue;
            };

            out.push(NormalizedRecord {
                period,
                region: region.to_string(),
                rate,
            });
        }

        if in_scope == 0 {
            warn!(regions = ?unmatched, "no data found for the six cities; check region names");
            return Err(PipelineError::EmptyAfterFilter { unmatched });
        }

        if bad_rate > 0 || bad_period > 0 {
            warn!(bad_rate, bad_period, "dropped malformed rows");
        }
        if out.is_empty() {
            return Err(PipelineError::NoUsableRates {
                candidates: in_scope,
            });
        }

        info!(
            encoding = table.encoding,
            kept = out.len(),
            excluded_regions = unmatched.len(),
            "normalized records"
        );
        Ok(out)
    }
}
