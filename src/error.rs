//! Error taxonomy for the watcher pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Hard failure of a single source. Isolated by the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("robots.txt disallows {url}")]
    RobotsDisallowed { url: String },
    #[error("invalid source configuration: {0}")]
    Config(String),
}

impl SourceError {
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout { url: url.to_string() }
        } else if let Some(status) = err.status() {
            SourceError::HttpStatus { url: url.to_string(), status: status.as_u16() }
        } else {
            SourceError::Network { url: url.to_string(), message: err.to_string() }
        }
    }
}

/// The page was fetched but its structure was not recognized.
///
/// Counts as zero records from that source and is logged as a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAnomaly {
    pub source_id: String,
    pub reason: String,
}

impl std::fmt::Display for ParseAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source_id, self.reason)
    }
}

/// Seen state could not be loaded or saved. Fatal to the run.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to read seen state from {path:?}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("seen state at {path:?} is corrupt: {source}")]
    Corrupt { path: PathBuf, source: serde_json::Error },
    #[error("failed to write seen state to {path:?}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("failed to serialize seen state: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("{channel}: {message}")]
    Channel { channel: String, message: String },
    #[error("all notification channels failed: {}", .0.join("; "))]
    AllFailed(Vec<String>),
}

impl NotificationError {
    pub fn channel(channel: &str, message: impl std::fmt::Display) -> Self {
        Self::Channel { channel: channel.to_string(), message: message.to_string() }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeywordError {
    #[error("line {line}: invalid weight '{value}' (expected a positive integer)")]
    InvalidWeight { line: usize, value: String },
    #[error("line {line}: empty keyword")]
    EmptyKeyword { line: usize },
}
