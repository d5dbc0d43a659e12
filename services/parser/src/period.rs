//! Quarter keys as published, e.g. `97Q1`.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// `97Q1`, `97 q 1`, `97年第1季`
static PERIOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,4})\s*(?:[Qq]|年\s*第?)\s*([1-4])\s*季?\s*$").expect("Invalid regex")
});

/// A calendar quarter. Years are ROC years as published (97 = 2008).
///
/// Ordering is on (year, quarter), never on the rendered label: `"100Q1"`
/// sorts before `"97Q1"` as a string but after it here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodKey {
    year: u32,
    quarter: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised period label {0:?}")]
pub struct PeriodParseError(String);

impl PeriodKey {
    pub fn new(year: u32, quarter: u8) -> Option<Self> {
        (1..=4).contains(&quarter).then_some(Self { year, quarter })
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for PeriodKey {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PeriodParseError(s.to_string());
        let caps = PERIOD_RE.captures(s).ok_or_else(err)?;
        let year = caps[1].parse().map_err(|_| err())?;
        let quarter = caps[2].parse().map_err(|_| err())?;
        PeriodKey::new(year, quarter).ok_or_else(err)
    }
}

impl Serialize for PeriodKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
