//! Stacked per-city line chart as SVG.
//!
//! One panel per city, all sharing the period axis. Only the bottom panel
//! carries x labels, thinned out once there are too many periods to read.

use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::{self, Write};

use crate::reshape::ReshapedTable;

pub const TITLE: &str =
    "Quarterly Housing Loan Default Rate - Six Special Municipalities (六都購置住宅貸款違約率)";
pub const Y_LABEL: &str = "Default Rate (%)";
pub const X_LABEL: &str = "Quarter";

/// Above this many periods x labels are thinned
const LABEL_CLUTTER_THRESHOLD: usize = 20;
/// Roughly how many labels remain after thinning
const THINNED_LABELS: usize = 15;
const Y_TICKS: usize = 4;

const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

const FONT_FAMILY: &str = "'Microsoft JhengHei', 'Noto Sans CJK TC', sans-serif";

#[derive(Debug, Clone)]
pub struct ChartLayout {
    pub width: f64,
    pub panel_height: f64,
    pub panel_gap: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
}

impl Default for ChartLayout {
    fn default() -> Self {
        Self {
            width: 1200.0,
            panel_height: 240.0,
            panel_gap: 50.0,
            margin_top: 80.0,
            margin_bottom: 100.0,
            margin_left: 90.0,
            margin_right: 40.0,
        }
    }
}

/// Label every `step`-th period.
pub fn label_step(periods: usize) -> usize {
    if periods > LABEL_CLUTTER_THRESHOLD {
        (periods / THINNED_LABELS).max(1)
    } else {
        1
    }
}

pub fn render_svg(table: &ReshapedTable, layout: &ChartLayout) -> Result<String, fmt::Error> {
    let panels = table.cities().len();
    let periods = table.periods().len();
    let height = layout.margin_top
        + panels as f64 * layout.panel_height
        + panels.saturating_sub(1) as f64 * layout.panel_gap
        + layout.margin_bottom;
    let plot_width = layout.width - layout.margin_left - layout.margin_right;

    let x_at = |i: usize| -> f64 {
        if periods <= 1 {
            layout.margin_left + plot_width / 2.0
        } else {
            layout.margin_left + plot_width * i as f64 / (periods - 1) as f64
        }
    };
    let step = label_step(periods);

    let mut svg = String::new();
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="{FONT_FAMILY}">"#,
        w = layout.width,
        h = height
    )?;
    writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
    writeln!(
        svg,
        r#"<text class="title" x="{}" y="40" text-anchor="middle" font-size="20" font-weight="bold">{}</text>"#,
        layout.width / 2.0,
        encode_text(TITLE)
    )?;

    for (panel, city) in table.cities().iter().enumerate() {
        let top = layout.margin_top + panel as f64 * (layout.panel_height + layout.panel_gap);
        let bottom = top + layout.panel_height;
        let color = PALETTE[panel % PALETTE.len()];
        let series = table.series(city).unwrap_or_default();

        let max = series.iter().flatten().copied().fold(0.0_f64, f64::max);
        let y_max = if max > 0.0 { max * 1.15 } else { 1.0 };
        let y_at = |v: f64| bottom - v / y_max * layout.panel_height;

        writeln!(svg, r#"<g class="panel" data-city="{}">"#, encode_double_quoted_attribute(city))?;
        writeln!(
            svg,
            r##"<rect x="{}" y="{top}" width="{plot_width}" height="{}" fill="none" stroke="#333"/>"##,
            layout.margin_left, layout.panel_height
        )?;
        writeln!(
            svg,
            r#"<text class="panel-title" x="{}" y="{}" font-size="14" font-weight="bold">{}</text>"#,
            layout.margin_left,
            top - 8.0,
            encode_text(city)
        )?;

        // y grid and labels
        for tick in 0..=Y_TICKS {
            let value = y_max * tick as f64 / Y_TICKS as f64;
            let y = y_at(value);
            writeln!(
                svg,
                r##"<line x1="{}" y1="{y:.1}" x2="{}" y2="{y:.1}" stroke="#ccc" stroke-dasharray="4 3"/>"##,
                layout.margin_left,
                layout.margin_left + plot_width
            )?;
            writeln!(
                svg,
                r#"<text x="{}" y="{:.1}" text-anchor="end" font-size="10">{value:.2}</text>"#,
                layout.margin_left - 6.0,
                y + 3.0
            )?;
        }
        writeln!(
            svg,
            r#"<text class="y-label" x="{x}" y="{y}" transform="rotate(-90 {x} {y})" text-anchor="middle" font-size="11">{}</text>"#,
            encode_text(Y_LABEL),
            x = layout.margin_left - 55.0,
            y = top + layout.panel_height / 2.0
        )?;

        // x grid at labelled periods
        for i in (0..periods).step_by(step) {
            let x = x_at(i);
            writeln!(
                svg,
                r##"<line x1="{x:.1}" y1="{top}" x2="{x:.1}" y2="{bottom}" stroke="#ccc" stroke-dasharray="4 3"/>"##
            )?;
        }

        // line segments break at missing values
        let mut segment: Vec<String> = Vec::new();
        for (i, value) in series.iter().enumerate() {
            match value {
                Some(v) => segment.push(format!("{:.1},{:.1}", x_at(i), y_at(*v))),
                None => write_segment(&mut svg, &mut segment, color)?,
            }
        }
        write_segment(&mut svg, &mut segment, color)?;

        for (i, value) in series.iter().enumerate() {
            if let Some(v) = value {
                writeln!(
                    svg,
                    r#"<circle cx="{:.1}" cy="{:.1}" r="3" fill="{color}"/>"#,
                    x_at(i),
                    y_at(*v)
                )?;
            }
        }

        // legend
        let legend_x = layout.margin_left + plot_width - 110.0;
        writeln!(
            svg,
            r#"<line x1="{legend_x}" y1="{y}" x2="{}" y2="{y}" stroke="{color}" stroke-width="2"/>"#,
            legend_x + 20.0,
            y = top + 16.0
        )?;
        writeln!(
            svg,
            r#"<text x="{}" y="{}" font-size="11">{}</text>"#,
            legend_x + 26.0,
            top + 20.0,
            encode_text(city)
        )?;

        if panel + 1 == panels {
            for i in (0..periods).step_by(step) {
                let x = x_at(i);
                let y = bottom + 16.0;
                writeln!(
                    svg,
                    r#"<text class="x-tick" x="{x:.1}" y="{y:.1}" transform="rotate(-45 {x:.1} {y:.1})" text-anchor="end" font-size="9">{}</text>"#,
                    table.periods()[i]
                )?;
            }
            writeln!(
                svg,
                r#"<text class="x-label" x="{}" y="{}" text-anchor="middle" font-size="12">{}</text>"#,
                layout.margin_left + plot_width / 2.0,
                bottom + 75.0,
                encode_text(X_LABEL)
            )?;
        }

        writeln!(svg, "</g>")?;
    }

    writeln!(svg, "</svg>")?;
    Ok(svg)
}

fn write_segment(svg: &mut String, points: &mut Vec<String>, color: &str) -> fmt::Result {
    if !points.is_empty() {
        writeln!(
            svg,
            r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="1.5"/>"#,
            points.join(" ")
        )?;
        points.clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{Municipalities, NormalizedRecord};
    use crate::period::PeriodKey;
    use crate::reshape::Reshaper;

    fn table_for(cities: &[&str], years: std::ops::Range<u32>) -> ReshapedTable {
        let mut records = Vec::new();
        for year in years {
            for quarter in 1..=4 {
                for (i, city) in cities.iter().enumerate() {
                    records.push(NormalizedRecord {
                        period: PeriodKey::new(year, quarter).unwrap(),
                        region: city.to_string(),
                        rate: 0.1 * (i + 1) as f64,
                    });
                }
            }
        }
        let municipalities = Municipalities::six_special();
        Reshaper::new(&municipalities).reshape(&records)
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_label_step() {
        assert_eq!(label_step(8), 1);
        assert_eq!(label_step(20), 1);
        assert_eq!(label_step(21), 1);
        assert_eq!(label_step(84), 5);
    }

    #[test]
    fn test_one_panel_per_city_with_titles() {
        let cities = ["臺北市", "新北市", "桃園市", "臺中市", "臺南市", "高雄市"];
        let table = table_for(&cities, 97..99);
        let svg = render_svg(&table, &ChartLayout::default()).unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(count(&svg, r#"class="panel""#), 6);
        assert_eq!(count(&svg, r#"class="y-label""#), 6);
        assert_eq!(count(&svg, r#"class="panel-title""#), 6);
        for city in cities {
            assert!(svg.contains(&format!(r#"data-city="{city}""#)));
        }
        assert!(svg.contains("六都購置住宅貸款違約率"));
    }

    #[test]
    fn test_every_period_labelled_when_few() {
        let table = table_for(&["臺北市"], 97..100);
        let svg = render_svg(&table, &ChartLayout::default()).unwrap();
        assert_eq!(count(&svg, r#"class="x-tick""#), 12);
        assert_eq!(count(&svg, r#"class="x-label""#), 1);
    }

    #[test]
    fn test_labels_thinned_when_many() {
        // 21 years = 84 periods, every 5th labelled
        let table = table_for(&["臺北市", "高雄市"], 95..116);
        let svg = render_svg(&table, &ChartLayout::default()).unwrap();
        assert_eq!(count(&svg, r#"class="x-tick""#), 17);
        assert!(svg.contains(">95Q1</text>"));
        assert!(svg.contains(">96Q2</text>"));
        assert!(!svg.contains(">95Q2</text>"));
    }

    #[test]
    fn test_missing_value_splits_line() {
        let municipalities = Municipalities::six_special();
        let rec = |p: &str, rate| NormalizedRecord {
            period: p.parse().unwrap(),
            region: "臺北市".to_string(),
            rate,
        };
        let mut records = vec![rec("97Q1", 1.0), rec("97Q2", 1.1), rec("97Q4", 1.2), rec("98Q1", 1.3)];
        // 97Q3 exists only for another city
        records.push(NormalizedRecord {
            period: "97Q3".parse().unwrap(),
            region: "新北市".to_string(),
            rate: 0.5,
        });
        let table = Reshaper::new(&municipalities).reshape(&records);
        let svg = render_svg(&table, &ChartLayout::default()).unwrap();

        let taipei = svg.split(r#"data-city="新北市""#).next().unwrap();
        assert_eq!(count(taipei, "<polyline"), 2);
        assert_eq!(count(taipei, "<circle"), 4);
    }

    #[test]
    fn test_city_names_are_escaped() {
        let city = r#"A&B "<C>""#;
        let municipalities = Municipalities::new([city], Vec::<(String, String)>::new());
        let records = vec![NormalizedRecord {
            period: "97Q1".parse().unwrap(),
            region: city.to_string(),
            rate: 1.0,
        }];
        let table = Reshaper::new(&municipalities).reshape(&records);
        let svg = render_svg(&table, &ChartLayout::default()).unwrap();

        assert!(svg.contains(r#"data-city="A&amp;B &quot;&lt;C&gt;&quot;""#));
        assert!(svg.contains(r#">A&amp;B "&lt;C&gt;"</text>"#));
        assert!(!svg.contains("<C>"));
    }
}
