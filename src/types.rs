use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tender listing as normalized by a source adapter.
///
/// Records live for a single run; only the dedupe key derived from
/// `(source_id, external_id)` is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenderRecord {
    pub source_id: String,
    pub external_id: String,
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_text: String,
}

/// A record that passed the relevance filter, with its score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredRecord {
    pub record: TenderRecord,
    /// Display name of the source it came from
    pub source_name: String,
    pub score: u32,
}

/// A source that failed hard during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// Nothing new, so no batch message was sent
    NotNeeded,
    Sent,
    Failed(String),
}

/// Diagnostic output of one pipeline run. Never used for control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub fetched: usize,
    pub relevant: usize,
    pub new_items: Vec<ScoredRecord>,
    pub failures: Vec<SourceFailure>,
    /// Sources whose page structure was not recognized
    pub anomalies: Vec<String>,
    pub notification: NotificationOutcome,
    pub heartbeat_sent: bool,
    pub pruned: usize,
}

impl RunSummary {
    pub fn new_count(&self) -> usize {
        self.new_items.len()
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SourcesFile {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Stable identifier; part of every dedupe key, so never rename it casually
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub scraper: String,
    #[serde(default)]
    pub link_pattern: Option<String>,
    #[serde(default)]
    pub selectors: Option<SelectorConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectorConfig {
    pub item: String,
    pub title: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub id_attr: Option<String>,
}

fn default_enabled() -> bool {
    true
}
