//! Fatal pipeline errors.
//!
//! Recoverable conditions never show up here: an unresolvable schema falls
//! back to column positions, and malformed rows are dropped where they are
//! found.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no candidate encoding could decode the snapshot (tried {})", .tried.join(", "))]
    EncodingExhausted { tried: Vec<&'static str> },

    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("table has {found} column(s); need at least 3 (time, region, rate)")]
    TooFewColumns { found: usize },

    /// Carries the distinct region values seen, to spot upstream renames.
    #[error("no rows for the six municipalities; regions in data: {}", .unmatched.join(", "))]
    EmptyAfterFilter { unmatched: Vec<String> },

    #[error("none of the {candidates} municipality rows had a usable rate and period")]
    NoUsableRates { candidates: usize },
}
