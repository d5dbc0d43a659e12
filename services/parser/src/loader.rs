//! Snapshot bytes -> raw table.
//!
//! The upstream has shipped the same dataset as UTF-8 (with and without a
//! signature), Big5, and UTF-16 spreadsheet exports. Each candidate decodes
//! strictly; the first one that succeeds wins. There is no lossy fallback.

use encoding_rs::{Encoding, BIG5, UTF_16BE, UTF_16LE, UTF_8};
use std::borrow::Cow;
use tracing::{info, warn};

use crate::error::PipelineError;

const UTF8_SIGNATURE: &[u8] = b"\xEF\xBB\xBF";

struct Candidate {
    name: &'static str,
    decode: fn(&[u8]) -> Option<Cow<'_, str>>,
}

/// Tried in this order.
const CANDIDATES: &[Candidate] = &[
    Candidate {
        name: "UTF-8",
        decode: decode_utf8,
    },
    // WHATWG Big5 covers the cp950 repertoire as well
    Candidate {
        name: "Big5",
        decode: decode_big5,
    },
    Candidate {
        name: "UTF-16",
        decode: decode_utf16,
    },
];

fn decode_utf8(bytes: &[u8]) -> Option<Cow<'_, str>> {
    let body = bytes.strip_prefix(UTF8_SIGNATURE).unwrap_or(bytes);
    UTF_8.decode_without_bom_handling_and_without_replacement(body)
}

fn decode_big5(bytes: &[u8]) -> Option<Cow<'_, str>> {
    BIG5.decode_without_bom_handling_and_without_replacement(bytes)
}

/// Only accepted with a byte-order mark; without one any even-length input
/// would "decode".
fn decode_utf16(bytes: &[u8]) -> Option<Cow<'_, str>> {
    let (encoding, bom_len) = Encoding::for_bom(bytes)?;
    if encoding != UTF_16LE && encoding != UTF_16BE {
        return None;
    }
    encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
}

/// Decode with the first candidate encoding that accepts the bytes.
pub fn decode_text(bytes: &[u8]) -> Result<(Cow<'_, str>, &'static str), PipelineError> {
    for candidate in CANDIDATES {
        if let Some(text) = (candidate.decode)(bytes) {
            return Ok((text, candidate.name));
        }
    }
    Err(PipelineError::EncodingExhausted {
        tried: CANDIDATES.iter().map(|c| c.name).collect(),
    })
}

/// Rows as read, aligned with `headers`; no schema assumed yet.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<csv::StringRecord>,
    pub encoding: &'static str,
}

pub fn load(bytes: &[u8]) -> Result<RawTable, PipelineError> {
    let (text, encoding) = decode_text(bytes)?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    let mut skipped = 0;
    for (line_idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                // +2: 1-indexed, plus the header line
                warn!("skipping line {} due to error: {}", line_idx + 2, e);
                skipped += 1;
            }
        }
    }

    info!(encoding, columns = ?headers, rows = records.len(), skipped, "loaded snapshot");

    Ok(RawTable {
        headers,
        records,
        encoding,
    })
}
