use std::collections::HashSet;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::{Fetched, PageFetcher, SourceAdapter};
use crate::error::{ParseAnomaly, SourceError};
use crate::normalize::{collapse_whitespace, normalize_url, resolve_link};
use crate::types::TenderRecord;

/// Broad scan of every link on a listing page.
///
/// Works on sites whose markup changes often: each anchor with text becomes
/// a candidate and relevance filtering happens downstream.
pub struct AnchorScanAdapter {
    id: String,
    name: String,
    url: Url,
    link_pattern: Option<Regex>,
    fetcher: PageFetcher,
}

impl AnchorScanAdapter {
    pub fn new(
        id: &str,
        name: &str,
        url: &str,
        link_pattern: Option<&str>,
        fetcher: PageFetcher,
    ) -> Result<Self, SourceError> {
        let url = Url::parse(url)
            .map_err(|e| SourceError::Config(format!("{}: bad url '{}': {}", id, url, e)))?;
        let link_pattern = link_pattern
            .map(Regex::new)
            .transpose()
            .map_err(|e| SourceError::Config(format!("{}: bad link_pattern: {}", id, e)))?;

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            url,
            link_pattern,
            fetcher,
        })
    }
}

impl SourceAdapter for AnchorScanAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Fetched, SourceError> {
        let html = self.fetcher.get(&self.url)?;
        Ok(parse_anchors(&html, &self.url, &self.id, self.link_pattern.as_ref()))
    }
}

/// Turn every usable `<a href>` into a record. Duplicate URLs keep the first anchor.
pub fn parse_anchors(
    html: &str,
    page_url: &Url,
    source_id: &str,
    link_pattern: Option<&Regex>,
) -> Fetched {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(e) => {
            return Fetched::Anomaly(ParseAnomaly {
                source_id: source_id.to_string(),
                reason: format!("anchor selector: {:?}", e),
            })
        }
    };

    let mut seen_urls = HashSet::new();
    let mut records = Vec::new();

    for element in document.select(&selector) {
        let title = collapse_whitespace(&element.text().collect::<String>());
        if title.is_empty() {
            continue;
        }

        let Some(link) = element.value().attr("href").and_then(|href| resolve_link(page_url, href)) else {
            continue;
        };
        let url = normalize_url(&link);

        if let Some(pattern) = link_pattern {
            if !pattern.is_match(&url) {
                continue;
            }
        }

        if !seen_urls.insert(url.clone()) {
            continue;
        }

        records.push(TenderRecord {
            source_id: source_id.to_string(),
            external_id: url.clone(),
            title,
            url,
            published_at: None,
            raw_text: element.value().attr("title").map(collapse_whitespace).unwrap_or_default(),
        });
    }

    if records.is_empty() {
        return Fetched::Anomaly(ParseAnomaly {
            source_id: source_id.to_string(),
            reason: "no usable links on page".to_string(),
        });
    }

    Fetched::Records(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><body>
          <nav><a href="/">Home</a> <a href="#top">Top</a> <a href="mailto:x@y.z">Mail</a></nav>
          <ul>
            <li><a href="/tender/101?utm_source=feed" title="Ministry of Innovation">
                Supply of   ERP Software</a></li>
            <li><a href="https://www.example.com/tender/102">Road Construction Bid</a></li>
            <li><a href="/tender/101">Supply of ERP Software (again)</a></li>
            <li><a href="/tender/103"><img src="x.png"></a></li>
          </ul>
        </body></html>
    "##;

    fn page_url() -> Url {
        Url::parse("https://www.example.com/listing").unwrap()
    }

    fn records(fetched: Fetched) -> Vec<TenderRecord> {
        match fetched {
            Fetched::Records(r) => r,
            Fetched::Anomaly(a) => panic!("unexpected anomaly: {}", a),
        }
    }

    #[test]
    fn test_parse_anchors_extracts_links() {
        let recs = records(parse_anchors(PAGE, &page_url(), "ex", None));
        let titles: Vec<_> = recs.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Home", "Supply of ERP Software", "Road Construction Bid"]);

        let erp = &recs[1];
        assert_eq!(erp.url, "https://www.example.com/tender/101");
        assert_eq!(erp.external_id, erp.url);
        assert_eq!(erp.raw_text, "Ministry of Innovation");
        assert_eq!(erp.source_id, "ex");
    }

    #[test]
    fn test_link_pattern_filters() {
        let pattern = Regex::new("/tender/").unwrap();
        let recs = records(parse_anchors(PAGE, &page_url(), "ex", Some(&pattern)));
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.url.contains("/tender/")));
    }

    #[test]
    fn test_no_links_is_anomaly() {
        let fetched = parse_anchors("<html><body><p>Maintenance</p></body></html>", &page_url(), "ex", None);
        match fetched {
            Fetched::Anomaly(a) => assert_eq!(a.source_id, "ex"),
            Fetched::Records(_) => panic!("expected anomaly"),
        }
    }

    #[test]
    fn test_bad_link_pattern_rejected() {
        let fetcher = PageFetcher::new(&super::super::http::FetchOptions {
            user_agent: "test".to_string(),
            timeout: std::time::Duration::from_secs(1),
            respect_robots: false,
        }).unwrap();
        let err = AnchorScanAdapter::new("ex", "Example", "https://example.com", Some("(unclosed"), fetcher);
        assert!(matches!(err, Err(SourceError::Config(_))));
    }
}
