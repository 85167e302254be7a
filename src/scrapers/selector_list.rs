use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{Fetched, PageFetcher, SourceAdapter};
use crate::error::{ParseAnomaly, SourceError};
use crate::normalize::{collapse_whitespace, normalize_url, parse_published, resolve_link};
use crate::types::{SelectorConfig, TenderRecord};

/// Compiled CSS selectors for a structured listing page
pub struct ListingSelectors {
    item: Selector,
    title: Selector,
    link: Selector,
    date: Option<Selector>,
    text: Option<Selector>,
    id_attr: Option<String>,
}

fn compile(source_id: &str, field: &str, css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| {
        SourceError::Config(format!("{}: invalid {} selector '{}': {:?}", source_id, field, css, e))
    })
}

impl ListingSelectors {
    pub fn compile(source_id: &str, config: &SelectorConfig) -> Result<Self, SourceError> {
        Ok(Self {
            item: compile(source_id, "item", &config.item)?,
            title: compile(source_id, "title", &config.title)?,
            link: compile(source_id, "link", config.link.as_deref().unwrap_or("a[href]"))?,
            date: config.date.as_deref().map(|css| compile(source_id, "date", css)).transpose()?,
            text: config.text.as_deref().map(|css| compile(source_id, "text", css)).transpose()?,
            id_attr: config.id_attr.clone(),
        })
    }
}

/// Listing page with one repeated element per tender.
pub struct SelectorListAdapter {
    id: String,
    name: String,
    url: Url,
    selectors: ListingSelectors,
    fetcher: PageFetcher,
}

impl SelectorListAdapter {
    pub fn new(
        id: &str,
        name: &str,
        url: &str,
        config: &SelectorConfig,
        fetcher: PageFetcher,
    ) -> Result<Self, SourceError> {
        let url = Url::parse(url)
            .map_err(|e| SourceError::Config(format!("{}: bad url '{}': {}", id, url, e)))?;

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            url,
            selectors: ListingSelectors::compile(id, config)?,
            fetcher,
        })
    }
}

impl SourceAdapter for SelectorListAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Fetched, SourceError> {
        let html = self.fetcher.get(&self.url)?;
        Ok(parse_listing(&html, &self.url, &self.id, &self.selectors))
    }
}

fn first_text(item: &ElementRef, selector: &Selector) -> Option<String> {
    item.select(selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

pub fn parse_listing(
    html: &str,
    page_url: &Url,
    source_id: &str,
    selectors: &ListingSelectors,
) -> Fetched {
    let document = Html::parse_document(html);
    let mut matched = 0;
    let mut records = Vec::new();

    for item in document.select(&selectors.item) {
        matched += 1;

        let Some(title) = first_text(&item, &selectors.title) else {
            continue;
        };

        let url = item.select(&selectors.link)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| resolve_link(page_url, href))
            .map(|u| normalize_url(&u));

        let external_id = selectors.id_attr.as_deref()
            .and_then(|attr| item.value().attr(attr))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| url.clone())
            .unwrap_or_else(|| title.clone());

        let published_at = selectors.date.as_ref()
            .and_then(|sel| first_text(&item, sel))
            .and_then(|text| parse_published(&text));

        let raw_text = selectors.text.as_ref()
            .and_then(|sel| first_text(&item, sel))
            .unwrap_or_default();

        records.push(TenderRecord {
            source_id: source_id.to_string(),
            external_id,
            title,
            url: url.unwrap_or_else(|| page_url.to_string()),
            published_at,
            raw_text,
        });
    }

    if records.is_empty() {
        let reason = if matched == 0 {
            "item selector matched nothing; page layout may have changed".to_string()
        } else {
            format!("{} items matched but none had a title", matched)
        };
        return Fetched::Anomaly(ParseAnomaly { source_id: source_id.to_string(), reason });
    }

    Fetched::Records(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const PAGE: &str = r##"
        <div class="results">
          <div class="tender" data-id="T-001">
            <h3>Cloud Hosting Services</h3>
            <a href="/tenders/1">Details</a>
            <span class="published">2026-10-17</span>
            <p class="summary">Ministry of Finance  seeks   a cloud provider</p>
          </div>
          <div class="tender">
            <h3>Office Furniture</h3>
            <a href="https://other.example.org/t/2#top">Details</a>
            <span class="published">whenever</span>
          </div>
          <div class="tender"><h3>  </h3></div>
        </div>
    "##;

    fn config() -> SelectorConfig {
        SelectorConfig {
            item: ".tender".to_string(),
            title: "h3".to_string(),
            link: None,
            date: Some(".published".to_string()),
            text: Some(".summary".to_string()),
            id_attr: Some("data-id".to_string()),
        }
    }

    fn page_url() -> Url {
        Url::parse("https://tenders.example.com/list").unwrap()
    }

    #[test]
    fn test_parse_listing_fields() {
        let selectors = ListingSelectors::compile("ex", &config()).unwrap();
        let recs = match parse_listing(PAGE, &page_url(), "ex", &selectors) {
            Fetched::Records(r) => r,
            Fetched::Anomaly(a) => panic!("unexpected anomaly: {}", a),
        };
        assert_eq!(recs.len(), 2);

        assert_eq!(recs[0].external_id, "T-001");
        assert_eq!(recs[0].title, "Cloud Hosting Services");
        assert_eq!(recs[0].url, "https://tenders.example.com/tenders/1");
        assert_eq!(recs[0].raw_text, "Ministry of Finance seeks a cloud provider");
        assert_eq!(recs[0].published_at, Some(Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap()));

        // no data-id: falls back to the normalized link
        assert_eq!(recs[1].external_id, "https://other.example.org/t/2");
        assert_eq!(recs[1].published_at, None);
        assert_eq!(recs[1].raw_text, "");
    }

    #[test]
    fn test_changed_layout_is_anomaly() {
        let selectors = ListingSelectors::compile("ex", &config()).unwrap();
        match parse_listing("<ul><li>New layout</li></ul>", &page_url(), "ex", &selectors) {
            Fetched::Anomaly(a) => assert!(a.reason.contains("matched nothing")),
            Fetched::Records(_) => panic!("expected anomaly"),
        }
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let mut cfg = config();
        cfg.item = "div[".to_string();
        assert!(matches!(ListingSelectors::compile("ex", &cfg), Err(SourceError::Config(_))));
    }
}
