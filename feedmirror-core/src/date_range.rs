//! Validity windows and the overlap filter.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{FeedMirrorError, FeedMirrorResult};
use crate::event::{ExternalEvent, TimePolicy, local_midnight};

/// A closed interval of instants that events are mirrored and validated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> FeedMirrorResult<Self> {
        if start > end {
            return Err(FeedMirrorError::Config(format!(
                "Window start {} is after window end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(DateWindow { start, end })
    }

    /// From local midnight of `start` to the last second of `end`, in `tz`.
    pub fn from_dates(start: NaiveDate, end: NaiveDate, tz: Tz) -> FeedMirrorResult<Self> {
        let end_of_day = end
            .succ_opt()
            .map(|next| local_midnight(next, tz) - Duration::seconds(1))
            .ok_or_else(|| FeedMirrorError::Config(format!("Window end {end} is out of range")))?;
        Self::new(local_midnight(start, tz), end_of_day)
    }

    /// `days_back` days before through `days_ahead` days after `reference`.
    pub fn around(
        reference: NaiveDate,
        days_back: i64,
        days_ahead: i64,
        tz: Tz,
    ) -> FeedMirrorResult<Self> {
        let start = reference
            .checked_sub_signed(Duration::days(days_back))
            .ok_or_else(|| FeedMirrorError::Config("days_back is out of range".into()))?;
        let end = reference
            .checked_add_signed(Duration::days(days_ahead))
            .ok_or_else(|| FeedMirrorError::Config("days_ahead is out of range".into()))?;
        Self::from_dates(start, end, tz)
    }

    /// Overlap test shared by the date filter and mirror range queries:
    /// `start <= window.end && end >= window.start`. Touching counts.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end >= self.start
    }
}

/// The end used for overlap tests.
///
/// The event's own end when present, otherwise the start plus the policy's
/// whole-day duration for whole-day events, otherwise the start itself.
pub fn effective_end(event: &ExternalEvent, policy: &TimePolicy) -> DateTime<Utc> {
    let start = event.starts_at.to_utc(policy.timezone);
    match &event.ends_at {
        Some(end) => end.to_utc(policy.timezone).max(start),
        None if event.starts_at.is_whole_day() => start + policy.whole_day_duration,
        None => start,
    }
}

pub fn event_overlaps(event: &ExternalEvent, window: &DateWindow, policy: &TimePolicy) -> bool {
    window.overlaps(
        event.starts_at.to_utc(policy.timezone),
        effective_end(event, policy),
    )
}

/// Keep the events overlapping `window`, preserving order.
pub fn filter_events(
    events: Vec<ExternalEvent>,
    window: &DateWindow,
    policy: &TimePolicy,
) -> Vec<ExternalEvent> {
    events
        .into_iter()
        .filter(|e| event_overlaps(e, window, policy))
        .collect()
}
