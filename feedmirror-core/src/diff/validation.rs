//! The validation report and the pure comparison behind it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::{Recommendation, compare_uids};
use crate::event::{EventTime, ExternalEvent, MirroredEvent, TimePolicy};
use crate::snapshot::FeedSnapshot;

/// One entry of the side-by-side sample shown to an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleEvent {
    pub uid: String,
    pub title: String,
    /// `YYYY-MM-DD` for whole-day events, RFC 3339 otherwise.
    pub start: String,
    pub all_day: bool,
}

impl SampleEvent {
    fn from_external(event: &ExternalEvent) -> Self {
        let start = match event.starts_at {
            EventTime::Date(d) => d.format("%Y-%m-%d").to_string(),
            EventTime::DateTime(dt) => dt.to_rfc3339(),
        };
        SampleEvent {
            uid: event.uid.clone(),
            title: event.summary.clone(),
            start,
            all_day: event.starts_at.is_whole_day(),
        }
    }

    fn from_mirrored(row: &MirroredEvent, policy: &TimePolicy) -> Self {
        let start = if row.all_day {
            row.starts_at
                .with_timezone(&policy.timezone)
                .date_naive()
                .format("%Y-%m-%d")
                .to_string()
        } else {
            row.starts_at.to_rfc3339()
        };
        SampleEvent {
            uid: row.external_uid.clone(),
            title: row.title.clone(),
            start,
            all_day: row.all_day,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleComparison {
    pub ics_events: Vec<SampleEvent>,
    pub db_events: Vec<SampleEvent>,
}

/// Result of one validation pass. Built fresh on every call, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub feed_id: String,
    pub ics_event_count: usize,
    pub db_event_count: usize,
    pub date_range_start: DateTime<Utc>,
    pub date_range_end: DateTime<Utc>,
    pub missing_in_db: usize,
    pub extra_in_db: usize,
    pub matched_count: usize,
    /// First few UIDs behind `missing_in_db`, for follow-up.
    pub missing_uids: Vec<String>,
    /// First few UIDs behind `extra_in_db`.
    pub extra_uids: Vec<String>,
    pub sample_comparison: SampleComparison,
    pub recommendations: Vec<String>,
    /// Feed objects discarded by the parser for lacking SUMMARY or DTSTART.
    pub dropped_object_count: usize,
    /// Feed events whose UID was synthesized; excluded from the set
    /// comparison but included in `ics_event_count`.
    pub synthetic_uid_count: usize,
}

impl ValidationResult {
    /// Build a report from a feed snapshot and the mirror rows for the same
    /// window. Synthetic UIDs on either side take no part in the set
    /// comparison.
    pub fn compare(
        feed_id: &str,
        snapshot: &FeedSnapshot,
        rows: &[MirroredEvent],
        cap: usize,
        sample_size: usize,
    ) -> Self {
        let external_uids = snapshot
            .events
            .iter()
            .filter(|e| !e.uid_is_synthetic)
            .map(|e| e.uid.as_str());
        let mirror_uids = rows
            .iter()
            .filter(|r| !r.uid_is_synthetic)
            .map(|r| r.external_uid.as_str());
        let comparison = compare_uids(external_uids, mirror_uids);

        let ics_event_count = snapshot.events.len();
        let db_event_count = rows.len();
        let missing_in_db = comparison.missing.len();
        let extra_in_db = comparison.extra.len();

        let recommendations = Recommendation::evaluate(
            ics_event_count,
            db_event_count,
            missing_in_db,
            extra_in_db,
            cap,
        )
        .iter()
        .map(ToString::to_string)
        .collect();

        ValidationResult {
            feed_id: feed_id.to_string(),
            ics_event_count,
            db_event_count,
            date_range_start: snapshot.window.start,
            date_range_end: snapshot.window.end,
            missing_in_db,
            extra_in_db,
            matched_count: comparison.matched,
            missing_uids: comparison.missing.into_iter().take(sample_size).collect(),
            extra_uids: comparison.extra.into_iter().take(sample_size).collect(),
            sample_comparison: SampleComparison {
                ics_events: snapshot
                    .events
                    .iter()
                    .take(sample_size)
                    .map(SampleEvent::from_external)
                    .collect(),
                db_events: rows
                    .iter()
                    .take(sample_size)
                    .map(|r| SampleEvent::from_mirrored(r, &snapshot.policy))
                    .collect(),
            },
            recommendations,
            dropped_object_count: snapshot.stats.dropped,
            synthetic_uid_count: snapshot.synthetic_count(),
        }
    }

    /// No UID is missing or extra.
    pub fn is_clean(&self) -> bool {
        self.missing_in_db == 0 && self.extra_in_db == 0
    }
}
