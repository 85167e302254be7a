//! Keyword list loading
//!
//! Plain text, one keyword per line, optionally `keyword = weight`.
//! Blank lines and `#` comments are ignored.

use std::fs;
use std::path::Path;
use anyhow::{Result, Context};

use crate::error::KeywordError;

/// Used when no keyword file exists
const DEFAULT_KEYWORDS: &[&str] = &[
    "software", "web", "website", "mobile", "app", "android", "ios", "erp", "crm", "api",
    "devops", "security", "cybersecurity", "waf", "pam", "observability", "itsm",
    "integration", "database", "ai", "machine learning", "cloud", "portal", "digital", "ict",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// Lowercased term
    pub term: String,
    pub weight: u32,
}

/// Ordered, immutable set of relevance terms for one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
}

impl KeywordSet {
    /// Build from plain terms with weight 1. Duplicates keep the first occurrence.
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = KeywordSet::default();
        for term in terms {
            set.push(term.as_ref(), 1);
        }
        set
    }

    pub fn parse(content: &str) -> Result<Self, KeywordError> {
        let mut set = KeywordSet::default();

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (term, weight) = match line.rsplit_once('=') {
                Some((term, value)) => {
                    let value = value.trim();
                    let weight = value.parse::<u32>()
                        .ok()
                        .filter(|w| *w > 0)
                        .ok_or_else(|| KeywordError::InvalidWeight {
                            line: line_no,
                            value: value.to_string(),
                        })?;
                    (term.trim(), weight)
                }
                None => (line, 1),
            };

            if term.is_empty() {
                return Err(KeywordError::EmptyKeyword { line: line_no });
            }
            set.push(term, weight);
        }

        Ok(set)
    }

    fn push(&mut self, term: &str, weight: u32) {
        let term = term.trim().to_lowercase();
        if term.is_empty() || self.keywords.iter().any(|k| k.term == term) {
            return;
        }
        self.keywords.push(Keyword { term, weight });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

pub fn default_keywords() -> KeywordSet {
    KeywordSet::from_terms(DEFAULT_KEYWORDS)
}

/// Load the keyword file, falling back to the built-in list when it is missing.
pub fn load_keywords(path: &Path) -> Result<KeywordSet> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "keyword file not found, using built-in list");
        return Ok(default_keywords());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read keywords from {:?}", path))?;

    let set = KeywordSet::parse(&content)
        .with_context(|| format!("Failed to parse keywords in {:?}", path))?;

    if set.is_empty() {
        tracing::warn!(path = %path.display(), "keyword file is empty; nothing will be relevant");
    }

    Ok(set)
}
