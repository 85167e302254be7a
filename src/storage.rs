//! Persistent state: source list and the seen-key blob
//!
//! The seen state is loaded wholesale at the start of a run and written
//! wholesale at the end. Writes go through a temp file plus rename so a
//! crash mid-write leaves the previous blob intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{Result, Context};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Digest};

use crate::error::PersistenceError;
use crate::types::SourcesFile;

pub fn load_sources(path: &Path) -> Result<SourcesFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources from {:?}", path))?;

    let sources: SourcesFile = serde_yaml::from_str(&content)
        .with_context(|| "Failed to parse sources YAML")?;

    Ok(sources)
}

/// Stable identity of a record across runs: `<source_id>:<sha256(external_id)>`
pub fn dedupe_key(source_id: &str, external_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(external_id.as_bytes());
    format!("{}:{:x}", source_id, hasher.finalize())
}

const LEGACY_HEARTBEAT_KEY: &str = "_last_heartbeat";

/// In-memory form of the seen blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeenState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_heartbeat: Option<NaiveDate>,
    /// key -> first-seen timestamp (RFC 3339), kept verbatim so reloads are byte-stable
    #[serde(default)]
    seen: BTreeMap<String, String>,
    #[serde(skip)]
    added: Vec<String>,
}

impl SeenState {
    /// Parse a blob. The flat legacy layout is converted; anything else that
    /// does not match the canonical layout is an error.
    pub fn from_blob(blob: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<Self>(blob) {
            Ok(state) => Ok(state),
            Err(err) => Self::from_legacy_blob(blob).ok_or(err),
        }
    }

    /// `{"<sha256 hex>": <epoch secs>, "_last_heartbeat": <epoch secs>}`
    ///
    /// Converted keys keep their first-seen time, so retention still ages
    /// them out. The next persist writes the canonical layout.
    fn from_legacy_blob(blob: &str) -> Option<Self> {
        let flat: BTreeMap<String, f64> = serde_json::from_str(blob).ok()?;
        let mut state = SeenState::default();

        for (key, secs) in flat {
            let ts = DateTime::<Utc>::from_timestamp(secs as i64, 0)?;
            if key == LEGACY_HEARTBEAT_KEY {
                state.last_heartbeat = Some(ts.date_naive());
            } else if !key.is_empty() && key.chars().all(|c| c.is_ascii_hexdigit()) {
                state.seen.insert(key, ts.to_rfc3339_opts(SecondsFormat::Secs, true));
            } else {
                return None;
            }
        }

        tracing::warn!(keys = state.seen.len(), "converted legacy seen state");
        Some(state)
    }

    /// Canonical serialization: sorted keys, two-space indent, trailing newline.
    pub fn to_blob(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains_key(key)
    }

    /// Returns false when the key was already present.
    pub fn mark_seen(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        if self.seen.contains_key(key) {
            return false;
        }
        self.seen.insert(key.to_string(), now.to_rfc3339_opts(SecondsFormat::Secs, true));
        self.added.push(key.to_string());
        true
    }

    /// Keys marked during this run, in marking order
    pub fn added(&self) -> &[String] {
        &self.added
    }

    /// Drop the keys marked during this run; loaded keys are untouched.
    pub fn forget_added(&mut self) -> usize {
        let count = self.added.len();
        for key in self.added.drain(..) {
            self.seen.remove(&key);
        }
        count
    }

    /// Remove keys first seen before `cutoff`. Unparseable timestamps are kept.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, first_seen| {
            match DateTime::parse_from_rfc3339(first_seen) {
                Ok(ts) => ts.with_timezone(&Utc) >= cutoff,
                Err(_) => true,
            }
        });
        before - self.seen.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.seen.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn last_heartbeat(&self) -> Option<NaiveDate> {
        self.last_heartbeat
    }

    pub fn set_last_heartbeat(&mut self, date: NaiveDate) {
        self.last_heartbeat = Some(date);
    }
}

/// Where the seen blob lives between runs.
pub trait StateBackend {
    fn load(&self) -> Result<SeenState, PersistenceError>;
    fn persist(&self, state: &SeenState) -> Result<(), PersistenceError>;
}

/// JSON file on disk, replaced atomically on every persist.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateBackend for FileBackend {
    fn load(&self) -> Result<SeenState, PersistenceError> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "no seen state yet, starting empty");
            return Ok(SeenState::default());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|source| PersistenceError::Read { path: self.path.clone(), source })?;

        SeenState::from_blob(&content)
            .map_err(|source| PersistenceError::Corrupt { path: self.path.clone(), source })
    }

    fn persist(&self, state: &SeenState) -> Result<(), PersistenceError> {
        let blob = state.to_blob()?;
        let write_err = |source| PersistenceError::Write { path: self.path.clone(), source };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(blob.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        tracing::debug!(path = %self.path.display(), keys = state.len(), "seen state persisted");
        Ok(())
    }
}

/// Holds the serialized blob in memory. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self { blob: Mutex::new(Some(blob.into())) }
    }

    pub fn blob(&self) -> Option<String> {
        self.blob.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl StateBackend for MemoryBackend {
    fn load(&self) -> Result<SeenState, PersistenceError> {
        match self.blob() {
            Some(blob) => SeenState::from_blob(&blob).map_err(|source| PersistenceError::Corrupt {
                path: PathBuf::from("<memory>"),
                source,
            }),
            None => Ok(SeenState::default()),
        }
    }

    fn persist(&self, state: &SeenState) -> Result<(), PersistenceError> {
        let blob = state.to_blob()?;
        *self.blob.lock().unwrap_or_else(|e| e.into_inner()) = Some(blob);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, 6, 15, 0).unwrap()
    }

    #[test]
    fn test_dedupe_key_is_deterministic() {
        let a = dedupe_key("ethiopian-tender", "https://example.com/t/1");
        let b = dedupe_key("ethiopian-tender", "https://example.com/t/1");
        assert_eq!(a, b);
        assert!(a.starts_with("ethiopian-tender:"));
        assert_eq!(a.len(), "ethiopian-tender:".len() + 64);
        assert_ne!(a, dedupe_key("global-tenders", "https://example.com/t/1"));
    }

    #[test]
    fn test_mark_seen_and_contains() {
        let mut state = SeenState::default();
        assert!(!state.contains("a:1"));
        assert!(state.mark_seen("a:1", ts(1)));
        assert!(!state.mark_seen("a:1", ts(2)));
        assert!(state.contains("a:1"));
        assert_eq!(state.added(), &["a:1".to_string()]);
    }

    #[test]
    fn test_blob_format() {
        let mut state = SeenState::default();
        state.mark_seen("b:2", ts(2));
        state.mark_seen("a:1", ts(1));
        state.set_last_heartbeat(NaiveDate::from_ymd_opt(2026, 10, 2).unwrap());

        let expected = "{\n  \"last_heartbeat\": \"2026-10-02\",\n  \"seen\": {\n    \"a:1\": \"2026-10-01T06:15:00Z\",\n    \"b:2\": \"2026-10-02T06:15:00Z\"\n  }\n}\n";
        assert_eq!(state.to_blob().unwrap(), expected);
    }

    #[test]
    fn test_load_persist_is_byte_stable() {
        let blob = "{\n  \"last_heartbeat\": \"2026-10-02\",\n  \"seen\": {\n    \"a:1\": \"2026-10-01T06:15:00+03:00\",\n    \"b:2\": \"2026-10-02T06:15:00Z\"\n  }\n}\n";
        let state = SeenState::from_blob(blob).unwrap();
        assert_eq!(state.to_blob().unwrap(), blob);

        let empty = SeenState::default().to_blob().unwrap();
        assert_eq!(SeenState::from_blob(&empty).unwrap().to_blob().unwrap(), empty);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let blob = "{\n  \"seen\": {},\n  \"notes\": \"hand edited\"\n}\n";
        assert!(SeenState::from_blob(blob).is_err());
    }

    #[test]
    fn test_legacy_blob_is_converted() {
        let blob = r#"{
  "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08": 1790000000.5,
  "_last_heartbeat": 1790050000.0
}"#;
        let state = SeenState::from_blob(blob).unwrap();
        assert_eq!(state.len(), 1);
        assert!(state.contains("9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"));
        assert_eq!(state.last_heartbeat(), Some(NaiveDate::from_ymd_opt(2026, 9, 22).unwrap()));
        assert!(state.added().is_empty());

        let canonical = state.to_blob().unwrap();
        assert!(canonical.contains("\"2026-09-21T14:13:20Z\""));
        assert_eq!(SeenState::from_blob(&canonical).unwrap(), state);
    }

    #[test]
    fn test_legacy_shape_with_odd_keys_is_corrupt() {
        assert!(SeenState::from_blob(r#"{"seen": 5}"#).is_err());
        assert!(SeenState::from_blob(r#"{"abc": "yesterday"}"#).is_err());
    }

    #[test]
    fn test_forget_added_keeps_loaded_keys() {
        let mut state = SeenState::default();
        state.mark_seen("old:1", ts(1));
        let mut state = SeenState::from_blob(&state.to_blob().unwrap()).unwrap();

        state.mark_seen("new:1", ts(2));
        state.mark_seen("new:2", ts(2));
        assert_eq!(state.forget_added(), 2);
        assert!(state.contains("old:1"));
        assert!(!state.contains("new:1"));
        assert!(state.added().is_empty());
    }

    #[test]
    fn test_prune_older_than() {
        let mut state = SeenState::from_blob(
            r#"{"seen": {"a": "2026-01-01T00:00:00Z", "b": "2026-10-01T00:00:00Z", "c": "garbage"}}"#,
        ).unwrap();
        let removed = state.prune_older_than(Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(removed, 1);
        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_file_backend_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("state/seen.json"));
        assert!(backend.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_backend_persist_creates_dirs_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("state/seen.json"));

        let mut state = SeenState::default();
        state.mark_seen("a:1", ts(1));
        backend.persist(&state).unwrap();

        let loaded = backend.load().unwrap();
        assert!(loaded.contains("a:1"));
        let on_disk = fs::read_to_string(backend.path()).unwrap();
        assert_eq!(loaded.to_blob().unwrap(), on_disk);

        // no temp files left next to the blob
        let entries = fs::read_dir(dir.path().join("state")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_file_backend_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        fs::write(&path, "{ not json").unwrap();

        let err = FileBackend::new(&path).load().unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
    }
}
