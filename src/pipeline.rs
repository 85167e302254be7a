//! Fetch → score → dedupe → notify → persist
//!
//! One run is sequential. Sources are isolated from each other's failures;
//! only a persistence failure aborts the run, and it does so before any
//! notification goes out.

use std::str::FromStr;
use std::time::Duration;
use chrono::{DateTime, NaiveDate, Timelike, Utc};

use crate::error::PersistenceError;
use crate::filter;
use crate::keywords::KeywordSet;
use crate::notify::{format_heartbeat, format_new_items, Notifier};
use crate::scrapers::{Fetched, SourceAdapter};
use crate::storage::{dedupe_key, StateBackend};
use crate::types::{NotificationOutcome, RunSummary, ScoredRecord, SourceFailure, TenderRecord};

/// What happens to this run's keys when the batch notification fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Keys are persisted anyway; a failed email is not retried.
    #[default]
    AtMostOnce,
    /// Keys from this run are dropped so the items are notified next run.
    AtLeastOnce,
}

impl FromStr for DeliveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "at-most-once" => Ok(DeliveryPolicy::AtMostOnce),
            "at-least-once" => Ok(DeliveryPolicy::AtLeastOnce),
            other => Err(format!(
                "unknown delivery policy '{}' (expected at-most-once or at-least-once)",
                other
            )),
        }
    }
}

/// Daily heartbeat, due once per UTC day after `hour_utc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSchedule {
    pub hour_utc: u32,
}

impl HeartbeatSchedule {
    pub fn is_due(&self, last_sent: Option<NaiveDate>, now: DateTime<Utc>) -> bool {
        if now.hour() < self.hour_utc {
            return false;
        }
        last_sent != Some(now.date_naive())
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub recipients: Vec<String>,
    pub subject_prefix: String,
    pub delivery: DeliveryPolicy,
    /// None disables the heartbeat
    pub heartbeat: Option<HeartbeatSchedule>,
    /// None keeps seen keys forever
    pub retention: Option<chrono::Duration>,
    /// Pause between sources
    pub source_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            recipients: vec![],
            subject_prefix: "[Tenders]".to_string(),
            delivery: DeliveryPolicy::AtMostOnce,
            heartbeat: None,
            retention: None,
            source_delay: Duration::ZERO,
        }
    }
}

/// Run every adapter in registration order and collect what they return.
///
/// Hard failures and unrecognized pages are recorded on the summary.
fn collect_records<'a>(
    adapters: &'a [Box<dyn SourceAdapter>],
    source_delay: Duration,
    summary: &mut RunSummary,
) -> Vec<(&'a str, TenderRecord)> {
    let mut records = Vec::new();

    for (idx, adapter) in adapters.iter().enumerate() {
        if idx > 0 && !source_delay.is_zero() {
            std::thread::sleep(source_delay);
        }

        match adapter.fetch() {
            Ok(Fetched::Records(fetched)) => {
                tracing::info!(source = adapter.id(), count = fetched.len(), "fetched source");
                records.extend(fetched.into_iter().map(|r| (adapter.name(), r)));
            }
            Ok(Fetched::Anomaly(anomaly)) => {
                tracing::warn!(source = adapter.id(), reason = %anomaly.reason, "unrecognized page structure");
                summary.anomalies.push(anomaly.source_id);
            }
            Err(e) => {
                tracing::warn!(source = adapter.id(), error = %e, "source failed");
                summary.failures.push(SourceFailure {
                    source_id: adapter.id().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    records
}

/// Execute one pipeline run.
///
/// Returns `Err` only when the seen state cannot be loaded or persisted.
pub fn run(
    adapters: &[Box<dyn SourceAdapter>],
    keywords: &KeywordSet,
    store: &dyn StateBackend,
    notifier: &dyn Notifier,
    options: &RunOptions,
    now: DateTime<Utc>,
) -> Result<RunSummary, PersistenceError> {
    let mut state = store.load()?;
    tracing::debug!(keys = state.len(), "seen state loaded");

    let mut summary = RunSummary {
        fetched: 0,
        relevant: 0,
        new_items: vec![],
        failures: vec![],
        anomalies: vec![],
        notification: NotificationOutcome::NotNeeded,
        heartbeat_sent: false,
        pruned: 0,
    };

    let records = collect_records(adapters, options.source_delay, &mut summary);
    summary.fetched = records.len();

    for (source_name, record) in records {
        let score = filter::score(&record, keywords);
        if score == 0 {
            continue;
        }
        summary.relevant += 1;

        let key = dedupe_key(&record.source_id, &record.external_id);
        if !state.mark_seen(&key, now) {
            continue;
        }

        summary.new_items.push(ScoredRecord {
            record,
            source_name: source_name.to_string(),
            score,
        });
    }

    if !summary.new_items.is_empty() {
        let (subject, body) = format_new_items(&options.subject_prefix, &summary.new_items, summary.fetched);
        summary.notification = match notifier.send(&subject, &body, &options.recipients) {
            Ok(()) => NotificationOutcome::Sent,
            Err(e) => {
                tracing::error!(error = %e, items = summary.new_items.len(), "failed to send new-items notification");
                if options.delivery == DeliveryPolicy::AtLeastOnce {
                    let dropped = state.forget_added();
                    tracing::info!(dropped, "at-least-once delivery: items will be retried next run");
                }
                NotificationOutcome::Failed(e.to_string())
            }
        };
    }

    if let Some(schedule) = options.heartbeat {
        if schedule.is_due(state.last_heartbeat(), now) {
            let (subject, body) = format_heartbeat(&options.subject_prefix, now.date_naive(), &summary);
            match notifier.send(&subject, &body, &options.recipients) {
                Ok(()) => {
                    state.set_last_heartbeat(now.date_naive());
                    summary.heartbeat_sent = true;
                }
                Err(e) => tracing::error!(error = %e, "failed to send heartbeat; will retry next run"),
            }
        }
    }

    if let Some(retention) = options.retention {
        summary.pruned = state.prune_older_than(now - retention);
        if summary.pruned > 0 {
            tracing::info!(pruned = summary.pruned, "pruned expired seen keys");
        }
    }

    store.persist(&state)?;

    tracing::info!(
        fetched = summary.fetched,
        relevant = summary.relevant,
        new = summary.new_count(),
        failed_sources = summary.failures.len(),
        anomalies = summary.anomalies.len(),
        heartbeat = summary.heartbeat_sent,
        seen_keys = state.len(),
        "run complete"
    );

    Ok(summary)
}
