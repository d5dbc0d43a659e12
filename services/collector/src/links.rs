//! Dataset link discovery on the listing page.
//!
//! Every download on the listing page is an anchor whose `title` carries a
//! descriptive label ("本季購置住宅貸款違約率 (CSV)" and so on). We take the first
//! anchor whose decoded title contains the target label and resolve its href
//! against the page URL.

use anyhow::{anyhow, Result};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Upper bound on labels reported back when nothing matches
const MAX_REPORTED_LABELS: usize = 10;

/// An anchor with both an href and a title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
    pub href: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResolution {
    Found { url: Url, title: String },
    /// No title matched; carries the first few labels seen on the page.
    NotFound { labels: Vec<String> },
}

pub struct LinkResolver {
    selector: Selector,
    target_label: String,
}

impl LinkResolver {
    pub fn new(target_label: impl Into<String>) -> Result<Self> {
        let selector = Selector::parse("a[href][title]")
            .map_err(|e| anyhow!("invalid anchor selector: {e}"))?;
        Ok(Self {
            selector,
            target_label: target_label.into(),
        })
    }

    pub fn target_label(&self) -> &str {
        &self.target_label
    }

    /// Collect every anchor carrying both attributes, in document order.
    ///
    /// The HTML parser hands back attribute values with entities already
    /// decoded, so `&quot;` and `&amp;` arrive as plain characters. Markup that
    /// is not a well-formed anchor simply produces no candidate.
    pub fn candidates(&self, html: &str) -> Vec<LinkCandidate> {
        let document = Html::parse_document(html);
        document
            .select(&self.selector)
            .filter_map(|elem| {
                let value = elem.value();
                Some(LinkCandidate {
                    href: value.attr("href")?.trim().to_string(),
                    title: value.attr("title")?.trim().to_string(),
                })
            })
            .collect()
    }

    pub fn resolve(&self, html: &str, base: &Url) -> LinkResolution {
        let candidates = self.candidates(html);

        for candidate in &candidates {
            if !candidate.title.contains(&self.target_label) {
                continue;
            }
            match base.join(&candidate.href) {
                Ok(url) => {
                    return LinkResolution::Found {
                        url,
                        title: candidate.title.clone(),
                    }
                }
                Err(e) => debug!(href = %candidate.href, error = %e, "skipping unresolvable href"),
            }
        }

        LinkResolution::NotFound {
            labels: candidates
                .into_iter()
                .take(MAX_REPORTED_LABELS)
                .map(|c| c.title)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = "本季購置住宅貸款違約率";

    fn base() -> Url {
        Url::parse("https://pip.moi.gov.tw/Publicize/Info/E3030").unwrap()
    }

    fn resolver() -> LinkResolver {
        LinkResolver::new(TARGET).unwrap()
    }

    // -------------------------------------------------------------------------
    // MATCHING
    // -------------------------------------------------------------------------

    #[test]
    fn test_resolve_relative_href_with_trailing_title_text() {
        let html = r#"<html><body>
            <a href="/x/y.csv" title="本季購置住宅貸款違約率 Q1">download</a>
        </body></html>"#;

        match resolver().resolve(html, &base()) {
            LinkResolution::Found { url, title } => {
                assert_eq!(url.as_str(), "https://pip.moi.gov.tw/x/y.csv");
                assert_eq!(title, "本季購置住宅貸款違約率 Q1");
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_absolute_href() {
        let html = r#"<a href="https://data.example.org/rate.csv" title="下載 本季購置住宅貸款違約率">x</a>"#;

        match resolver().resolve(html, &base()) {
            LinkResolution::Found { url, .. } => {
                assert_eq!(url.as_str(), "https://data.example.org/rate.csv")
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_path_relative_href() {
        let html = r#"<a href="Download?id=3" title="本季購置住宅貸款違約率">x</a>"#;

        match resolver().resolve(html, &base()) {
            LinkResolution::Found { url, .. } => {
                assert_eq!(url.as_str(), "https://pip.moi.gov.tw/Publicize/Info/Download?id=3")
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let html = r#"
            <a href="/first.csv" title="本季購置住宅貸款違約率 (CSV)">a</a>
            <a href="/second.csv" title="本季購置住宅貸款違約率 (XML)">b</a>
        "#;

        match resolver().resolve(html, &base()) {
            LinkResolution::Found { url, .. } => assert!(url.as_str().ends_with("/first.csv")),
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_attribute_order_does_not_matter() {
        let html = r#"<a class="cmd-link" title="本季購置住宅貸款違約率" href="/z.csv">z</a>"#;
        assert!(matches!(
            resolver().resolve(html, &base()),
            LinkResolution::Found { .. }
        ));
    }

    // -------------------------------------------------------------------------
    // ENTITY DECODING
    // -------------------------------------------------------------------------

    #[test]
    fn test_entity_encoded_quotes_in_title() {
        let html = r#"<a href="/q.csv" title="&quot;本季購置住宅貸款違約率&quot; &#x28;CSV&#x29;">q</a>"#;

        match resolver().resolve(html, &base()) {
            LinkResolution::Found { title, .. } => {
                assert_eq!(title, "\"本季購置住宅貸款違約率\" (CSV)")
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_entity_encoded_ampersand_in_href() {
        let html = r#"<a href="/Download?a=1&amp;b=2" title="本季購置住宅貸款違約率">q</a>"#;

        match resolver().resolve(html, &base()) {
            LinkResolution::Found { url, .. } => {
                assert_eq!(url.query(), Some("a=1&b=2"))
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_entities_in_title_match_target() {
        // 本季 written as numeric character references
        let html = r#"<a href="/n.csv" title="&#26412;&#23395;購置住宅貸款違約率">n</a>"#;
        assert!(matches!(
            resolver().resolve(html, &base()),
            LinkResolution::Found { .. }
        ));
    }

    // -------------------------------------------------------------------------
    // NOT FOUND
    // -------------------------------------------------------------------------

    #[test]
    fn test_not_found_reports_at_most_ten_labels() {
        let html: String = (0..12)
            .map(|i| format!(r#"<a href="/f{i}.csv" title="其他資料 {i}">f</a>"#))
            .collect();

        match resolver().resolve(&html, &base()) {
            LinkResolution::NotFound { labels } => {
                assert_eq!(labels.len(), 10);
                assert_eq!(labels[0], "其他資料 0");
                assert_eq!(labels[9], "其他資料 9");
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found_on_page_without_anchors() {
        let result = resolver().resolve("<html><body><p>維護中</p></body></html>", &base());
        assert_eq!(result, LinkResolution::NotFound { labels: vec![] });
    }

    #[test]
    fn test_anchor_without_title_is_skipped() {
        let html = r#"<a href="/no-title.csv">本季購置住宅貸款違約率</a>"#;
        assert!(matches!(
            resolver().resolve(html, &base()),
            LinkResolution::NotFound { .. }
        ));
    }

    #[test]
    fn test_malformed_markup_is_not_an_error() {
        let html = r#"<a href="/broken.csv title=<<>> <div><a title="本季購置住宅貸款違約率" href="/ok.csv">ok</a>"#;
        // Whatever the parser recovers, it must not panic.
        let _ = resolver().resolve(html, &base());
    }

    #[test]
    fn test_candidates_trim_whitespace() {
        let html = r#"<a href="  /t.csv " title="  標籤  ">t</a>"#;
        let candidates = resolver().candidates(html);
        assert_eq!(
            candidates,
            vec![LinkCandidate {
                href: "/t.csv".to_string(),
                title: "標籤".to_string()
            }]
        );
    }
}
