//! Bounded in-memory history of runs and validations per feed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::diff::ValidationResult;
use crate::sync::{SyncMode, SyncReport};

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    OnDemand,
    /// Forced resync started because validation found drift.
    Drift,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded { upserted: usize, cleared: usize },
    Failed { kind: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub feed_id: String,
    pub mode: SyncMode,
    pub trigger: RunTrigger,
    pub attempts: u32,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn from_report(report: &SyncReport, trigger: RunTrigger, attempts: u32) -> Self {
        RunRecord {
            feed_id: report.feed_id.clone(),
            mode: report.mode,
            trigger,
            attempts,
            outcome: RunOutcome::Succeeded {
                upserted: report.upserted,
                cleared: report.cleared,
            },
            started_at: report.started_at,
            finished_at: report.finished_at,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded { .. })
    }
}

/// Short form of a validation kept for status listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub checked_at: DateTime<Utc>,
    pub external_count: usize,
    pub mirror_count: usize,
    pub missing: usize,
    pub extra: usize,
}

impl ValidationSummary {
    pub fn new(result: &ValidationResult, checked_at: DateTime<Utc>) -> Self {
        ValidationSummary {
            checked_at,
            external_count: result.ics_event_count,
            mirror_count: result.db_event_count,
            missing: result.missing_in_db,
            extra: result.extra_in_db,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.missing == 0 && self.extra == 0
    }
}

#[derive(Default)]
struct Entries {
    runs: HashMap<String, VecDeque<RunRecord>>,
    validations: HashMap<String, ValidationSummary>,
}

#[derive(Clone)]
pub struct RunLog {
    capacity: usize,
    entries: Arc<Mutex<Entries>>,
}

impl RunLog {
    pub fn new(capacity: usize) -> Self {
        RunLog {
            capacity: capacity.max(1),
            entries: Arc::default(),
        }
    }

    pub fn record(&self, record: RunRecord) {
        let mut entries = self.entries.lock();
        let runs = entries.runs.entry(record.feed_id.clone()).or_default();
        if runs.len() == self.capacity {
            runs.pop_front();
        }
        runs.push_back(record);
    }

    pub fn record_validation(&self, feed_id: &str, summary: ValidationSummary) {
        self.entries
            .lock()
            .validations
            .insert(feed_id.to_string(), summary);
    }

    /// Runs for `feed_id`, oldest first.
    pub fn runs(&self, feed_id: &str) -> Vec<RunRecord> {
        self.entries
            .lock()
            .runs
            .get(feed_id)
            .map(|runs| runs.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_run(&self, feed_id: &str) -> Option<RunRecord> {
        self.entries
            .lock()
            .runs
            .get(feed_id)
            .and_then(|runs| runs.back().cloned())
    }

    pub fn last_validation(&self, feed_id: &str) -> Option<ValidationSummary> {
        self.entries.lock().validations.get(feed_id).cloned()
    }
}
