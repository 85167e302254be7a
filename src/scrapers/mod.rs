mod anchor_scan;
mod http;
mod selector_list;

pub use anchor_scan::{parse_anchors, AnchorScanAdapter};
pub use http::{FetchOptions, PageFetcher, RobotsRules};
pub use selector_list::{parse_listing, ListingSelectors, SelectorListAdapter};

use crate::error::{ParseAnomaly, SourceError};
use crate::types::{SourceConfig, TenderRecord};

/// Scraper kinds accepted in `sources.yml`
pub const SUPPORTED_SCRAPERS: &[&str] = &["anchor_scan", "selector_list"];

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Records(Vec<TenderRecord>),
    /// Page came back but its structure was not recognized; zero records
    Anomaly(ParseAnomaly),
}

/// One tender source.
///
/// `fetch` returns `Err` only for hard failures (network, timeout, non-2xx).
/// An unrecognized page is `Ok(Fetched::Anomaly)`, never an error.
pub trait SourceAdapter {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn fetch(&self) -> Result<Fetched, SourceError>;
}

/// Build an adapter for one configured source.
pub fn adapter_from_config(
    source: &SourceConfig,
    fetcher: &PageFetcher,
) -> Result<Box<dyn SourceAdapter>, SourceError> {
    match source.scraper.as_str() {
        "anchor_scan" => Ok(Box::new(AnchorScanAdapter::new(
            &source.id,
            &source.name,
            &source.url,
            source.link_pattern.as_deref(),
            fetcher.clone(),
        )?)),
        "selector_list" => {
            let selectors = source.selectors.as_ref().ok_or_else(|| {
                SourceError::Config(format!("{}: selector_list requires a 'selectors' block", source.id))
            })?;
            Ok(Box::new(SelectorListAdapter::new(
                &source.id,
                &source.name,
                &source.url,
                selectors,
                fetcher.clone(),
            )?))
        }
        other => Err(SourceError::Config(format!(
            "{}: unknown scraper type '{}' (supported: {:?})",
            source.id, other, SUPPORTED_SCRAPERS
        ))),
    }
}

/// Adapters for all enabled sources, in file order. Misconfigured sources are
/// logged and left out so the rest still run.
pub fn build_adapters(sources: &[SourceConfig], fetcher: &PageFetcher) -> Vec<Box<dyn SourceAdapter>> {
    let mut adapters = Vec::new();

    for source in sources.iter().filter(|s| s.enabled) {
        match adapter_from_config(source, fetcher) {
            Ok(adapter) => adapters.push(adapter),
            Err(e) => tracing::warn!(source = %source.id, error = %e, "skipping misconfigured source"),
        }
    }

    adapters
}
