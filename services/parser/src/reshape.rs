//! Normalized records -> period × city matrix.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::normalize::{Municipalities, NormalizedRecord};
use crate::period::PeriodKey;

/// Rows are periods in chronological order; columns are the cities that
/// actually appear, in municipality order. Cells may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ReshapedTable {
    periods: Vec<PeriodKey>,
    cities: Vec<String>,
    /// Row-major, `values[period][city]`
    values: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Serialize)]
pub struct SeriesExport<'a> {
    pub city: &'a str,
    pub rates: Vec<Option<f64>>,
}

#[derive(Debug, Serialize)]
pub struct TableExport<'a> {
    pub periods: &'a [PeriodKey],
    pub series: Vec<SeriesExport<'a>>,
}

impl ReshapedTable {
    pub fn periods(&self) -> &[PeriodKey] {
        &self.periods
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    pub fn value(&self, period: PeriodKey, city: &str) -> Option<f64> {
        let row = self.periods.binary_search(&period).ok()?;
        let col = self.cities.iter().position(|c| c == city)?;
        self.values[row][col]
    }

    /// One city's rates along the period axis.
    pub fn series(&self, city: &str) -> Option<Vec<Option<f64>>> {
        let col = self.cities.iter().position(|c| c == city)?;
        Some(self.values.iter().map(|row| row[col]).collect())
    }

    pub fn export(&self) -> TableExport<'_> {
        TableExport {
            periods: &self.periods,
            series: self
                .cities
                .iter()
                .enumerate()
                .map(|(col, city)| SeriesExport {
                    city,
                    rates: self.values.iter().map(|row| row[col]).collect(),
                })
                .collect(),
        }
    }
}

pub struct Reshaper<'a> {
    cities: &'a Municipalities,
}

impl<'a> Reshaper<'a> {
    pub fn new(cities: &'a Municipalities) -> Self {
        Self { cities }
    }

    /// Pivot records into the matrix. A (period, city) pair seen more than
    /// once is averaged.
    pub fn reshape(&self, records: &[NormalizedRecord]) -> ReshapedTable {
        // BTreeMap keys give the chronological row order for free
        let mut cells: BTreeMap<PeriodKey, BTreeMap<usize, (f64, u32)>> = BTreeMap::new();
        for record in records {
            let Some(col) = self.cities.position(&record.region) else {
                continue;
            };
            let cell = cells
                .entry(record.period)
                .or_default()
                .entry(col)
                .or_insert((0.0, 0));
            cell.0 += record.rate;
            cell.1 += 1;
        }

        let columns: Vec<usize> = cells
            .values()
            .flat_map(|row| row.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let values = cells
            .values()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| row.get(col).map(|(sum, n)| sum / f64::from(*n)))
                    .collect()
            })
            .collect();

        ReshapedTable {
            periods: cells.keys().copied().collect(),
            cities: columns
                .iter()
                .map(|&col| self.cities.targets()[col].clone())
                .collect(),
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(period: &str, region: &str, rate: f64) -> NormalizedRecord {
        NormalizedRecord {
            period: period.parse().unwrap(),
            region: region.to_string(),
            rate,
        }
    }

    fn reshape(records: &[NormalizedRecord]) -> ReshapedTable {
        let cities = Municipalities::six_special();
        Reshaper::new(&cities).reshape(records)
    }

    fn labels(table: &ReshapedTable) -> Vec<String> {
        table.periods().iter().map(ToString::to_string).collect()
    }

    // -------------------------------------------------------------------------
    // ROW ORDER
    // -------------------------------------------------------------------------

    #[test]
    fn test_rows_sorted_chronologically() {
        let table = reshape(&[
            rec("97Q1", "臺北市", 1.0),
            rec("97Q2", "臺北市", 1.1),
            rec("96Q4", "臺北市", 0.9),
            rec("98Q1", "臺北市", 1.4),
        ]);
        assert_eq!(labels(&table), vec!["96Q4", "97Q1", "97Q2", "98Q1"]);
        assert_eq!(table.series("臺北市").unwrap(), vec![Some(0.9), Some(1.0), Some(1.1), Some(1.4)]);
    }

    #[test]
    fn test_three_digit_year_sorts_last() {
        let table = reshape(&[
            rec("100Q1", "新北市", 0.2),
            rec("99Q4", "新北市", 0.3),
            rec("97Q1", "新北市", 0.9),
        ]);
        assert_eq!(labels(&table), vec!["97Q1", "99Q4", "100Q1"]);
    }

    // -------------------------------------------------------------------------
    // COLUMNS
    // -------------------------------------------------------------------------

    #[test]
    fn test_only_present_cities_in_municipality_order() {
        let table = reshape(&[
            rec("97Q1", "高雄市", 0.5),
            rec("97Q1", "臺北市", 1.2),
            rec("97Q1", "桃園市", 0.4),
        ]);
        assert_eq!(table.cities(), ["臺北市", "桃園市", "高雄市"]);
    }

    #[test]
    fn test_sparse_cells_are_missing() {
        let table = reshape(&[rec("97Q1", "臺北市", 1.2), rec("97Q2", "新北市", 0.9)]);
        assert_eq!(table.value("97Q1".parse().unwrap(), "新北市"), None);
        assert_eq!(table.value("97Q2".parse().unwrap(), "新北市"), Some(0.9));
        assert_eq!(table.series("臺北市").unwrap(), vec![Some(1.2), None]);
    }

    #[test]
    fn test_duplicates_are_averaged() {
        let table = reshape(&[
            rec("97Q1", "臺北市", 1.0),
            rec("97Q1", "臺北市", 2.0),
            rec("97Q1", "臺北市", 3.0),
        ]);
        assert_eq!(table.periods().len(), 1);
        let value = table.value("97Q1".parse().unwrap(), "臺北市").unwrap();
        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_region_ignored() {
        let table = reshape(&[rec("97Q1", "基隆市", 0.7)]);
        assert!(table.periods().is_empty());
        assert!(table.cities().is_empty());
    }

    #[test]
    fn test_arrival_order_irrelevant() {
        let a = vec![rec("98Q1", "臺中市", 1.0), rec("97Q1", "臺南市", 0.5)];
        let b: Vec<_> = a.iter().rev().cloned().collect();
        assert_eq!(reshape(&a), reshape(&b));
    }

    // -------------------------------------------------------------------------
    // EXPORT
    // -------------------------------------------------------------------------

    #[test]
    fn test_export_json_shape() {
        let table = reshape(&[rec("97Q1", "臺北市", 1.2), rec("97Q2", "新北市", 0.9)]);
        let json = serde_json::to_value(table.export()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "periods": ["97Q1", "97Q2"],
                "series": [
                    { "city": "臺北市", "rates": [1.2, null] },
                    { "city": "新北市", "rates": [null, 0.9] }
                ]
            })
        );
    }
}
