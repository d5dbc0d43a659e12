//! Column role detection.
//!
//! The real feed and the synthetic stand-in name their columns differently,
//! so roles are found by label markers instead of exact names. When any role
//! stays unresolved the first three columns are taken as time, region, rate.

use tracing::info;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Time,
    Region,
    Rate,
}

/// Checked in this order for every label; the first role that matches
/// claims the label. ASCII markers match case-insensitively.
const ROLE_MARKERS: &[(Role, &[&str])] = &[
    (Role::Time, &["季", "year", "quarter", "period"]),
    (Role::Region, &["縣市", "city", "region"]),
    (Role::Rate, &["率", "rate", "%"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    Heuristic,
    Positional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub time: Column,
    pub region: Column,
    pub rate: Column,
    pub source: MappingSource,
}

pub fn classify(label: &str) -> Option<Role> {
    let lowered = label.to_lowercase();
    ROLE_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lowered.contains(m)))
        .map(|(role, _)| *role)
}

pub fn identify(headers: &[String]) -> Result<ColumnMapping, PipelineError> {
    if headers.len() < 3 {
        return Err(PipelineError::TooFewColumns {
            found: headers.len(),
        });
    }

    let column = |index: usize| Column {
        index,
        label: headers[index].clone(),
    };

    let (mut time, mut region, mut rate) = (None, None, None);
    for (idx, label) in headers.iter().enumerate() {
        let slot = match classify(label) {
            Some(Role::Time) => &mut time,
            Some(Role::Region) => &mut region,
            Some(Role::Rate) => &mut rate,
            None => continue,
        };
        if slot.is_none() {
            *slot = Some(idx);
        }
    }

    let mapping = match (time, region, rate) {
        (Some(t), Some(g), Some(r)) => ColumnMapping {
            time: column(t),
            region: column(g),
            rate: column(r),
            source: MappingSource::Heuristic,
        },
        _ => ColumnMapping {
            time: column(0),
            region: column(1),
            rate: column(2),
            source: MappingSource::Positional,
        },
    };

    info!(
        time = %mapping.time.label,
        region = %mapping.region.label,
        rate = %mapping.rate.label,
        source = ?mapping.source,
        "mapped columns"
    );

    Ok(mapping)
}
