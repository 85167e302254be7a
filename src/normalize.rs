//! URL and text normalization for scraped listings
//!
//! - Resolve relative links against the page URL
//! - Strip fragments and tracking params so the same tender keeps one identity
//! - Collapse whitespace in scraped text
//! - Parse published dates in the formats tender sites commonly use

use chrono::{DateTime, NaiveDate, Utc};
use url::Url;

/// Tracking parameters to remove from URLs
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "gclsrc",           // Google Ads
    "fbclid",                     // Facebook
    "msclkid",                    // Microsoft/Bing
    "mc_cid", "mc_eid",          // Mailchimp
    "sessionid", "session_id",
    "phpsessid",
    "_ga", "_gl",
];

/// Resolve `href` against `base`. Returns None for non-navigational links
/// (`javascript:`, `mailto:`, `tel:`, bare fragments) and unparseable hrefs.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"].iter().any(|p| lower.starts_with(p)) {
        return None;
    }

    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

/// Normalize a URL for identity comparison.
///
/// Host is lowercased by the parser; we drop the fragment and tracking
/// params and keep the remaining query params in their original order.
pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url.query_pairs()
            .filter(|(k, _)| !is_tracking_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    url.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best-effort date parsing; None when no known format matches.
pub fn parse_published(text: &str) -> Option<DateTime<Utc>> {
    let text = collapse_whitespace(text);
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%d",
        "%d/%m/%Y",
        "%d %B %Y",
        "%B %d, %Y",
        "%d %b %Y",
        "%b %d, %Y",
        "%d-%m-%Y",
    ];

    for fmt in &formats {
        if let Ok(date) = NaiveDate::parse_from_str(&text, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    // Fall back to an embedded yyyy-mm-dd, e.g. "Published: 2026-10-18"
    let re = regex::Regex::new(r"(\d{4})-(\d{2})-(\d{2})").ok()?;
    let caps = re.captures(&text)?;
    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;
    date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> Url {
        Url::parse("https://www.example.com/tenders/list").unwrap()
    }

    fn normalize_url_str(url: &str) -> String {
        normalize_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_resolve_relative_link() {
        let url = resolve_link(&base(), "/tender/42").unwrap();
        assert_eq!(url.as_str(), "https://www.example.com/tender/42");

        let url = resolve_link(&base(), "detail?id=7").unwrap();
        assert_eq!(url.as_str(), "https://www.example.com/tenders/detail?id=7");
    }

    #[test]
    fn test_resolve_skips_non_navigational() {
        assert!(resolve_link(&base(), "#top").is_none());
        assert!(resolve_link(&base(), "javascript:void(0)").is_none());
        assert!(resolve_link(&base(), "MAILTO:bids@example.com").is_none());
        assert!(resolve_link(&base(), "tel:+251111").is_none());
        assert!(resolve_link(&base(), "ftp://files.example.com/x").is_none());
        assert!(resolve_link(&base(), "   ").is_none());
    }

    #[test]
    fn test_normalize_lowercases_host_and_drops_fragment() {
        assert_eq!(
            normalize_url_str("https://EXAMPLE.COM/Tender/1#details"),
            "https://example.com/Tender/1"
        );
    }

    #[test]
    fn test_normalize_removes_tracking_params() {
        assert_eq!(
            normalize_url_str("https://example.com/t?id=123&utm_source=mail&fbclid=abc&page=2"),
            "https://example.com/t?id=123&page=2"
        );
        assert_eq!(
            normalize_url_str("https://example.com/t?utm_campaign=x"),
            "https://example.com/t"
        );
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Supply of\n\t ERP   system "), "Supply of ERP system");
    }

    #[test]
    fn test_parse_published_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        assert_eq!(parse_published("2026-10-18"), Some(expected));
        assert_eq!(parse_published("18/10/2026"), Some(expected));
        assert_eq!(parse_published("18 October 2026"), Some(expected));
        assert_eq!(parse_published("October 18, 2026"), Some(expected));
        assert_eq!(parse_published("Published: 2026-10-18"), Some(expected));
        assert_eq!(parse_published("soon"), None);
        assert_eq!(parse_published(""), None);
    }
}
