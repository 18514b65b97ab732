//! Event types for feeds and the mirror.
//!
//! `ExternalEvent` is what the feed parser produces from a calendar feed.
//! `MirroredEvent` is the row shape kept by a `Mirror`. The two are only ever
//! reconciled by identifier (`uid` == `external_uid`), never by content.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Start or end of an event: either a whole day or a timed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EventTime {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl EventTime {
    pub fn is_whole_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Resolve to an instant. Whole days start at local midnight in `tz`.
    pub fn to_utc(&self, tz: Tz) -> DateTime<Utc> {
        match self {
            EventTime::Date(d) => local_midnight(*d, tz),
            EventTime::DateTime(dt) => *dt,
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M UTC")),
        }
    }
}

/// How floating times and whole days are turned into instants.
///
/// Passed explicitly to the parser and the date filter so neither depends on
/// the host's clock or time zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePolicy {
    /// Zone for whole-day values and timed values without `Z` or `TZID`.
    pub timezone: Tz,
    /// Duration assumed for a whole-day event that has no end.
    pub whole_day_duration: Duration,
}

impl Default for TimePolicy {
    fn default() -> Self {
        TimePolicy {
            timezone: Tz::UTC,
            whole_day_duration: Duration::days(1),
        }
    }
}

impl TimePolicy {
    pub fn new(timezone: Tz) -> Self {
        TimePolicy {
            timezone,
            ..Default::default()
        }
    }
}

/// Midnight of `date` in `tz`, as UTC.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    resolve_local(date.and_time(NaiveTime::MIN), tz)
}

/// Interpret a wall-clock time in `tz`.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// DST gap are shifted forward by an hour.
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
    /// A STATUS value outside the VEVENT set, kept verbatim.
    Other(String),
}

impl EventStatus {
    pub fn from_ics_str(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "CONFIRMED" => EventStatus::Confirmed,
            "TENTATIVE" => EventStatus::Tentative,
            "CANCELLED" => EventStatus::Cancelled,
            _ => EventStatus::Other(s.trim().to_string()),
        }
    }

    pub fn as_ics_str(&self) -> &str {
        match self {
            EventStatus::Confirmed => "CONFIRMED",
            EventStatus::Tentative => "TENTATIVE",
            EventStatus::Cancelled => "CANCELLED",
            EventStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ics_str().to_lowercase())
    }
}

/// An event as parsed from a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    /// The feed's identifier, or `generated-<n>` when the source had none.
    pub uid: String,
    /// Set when `uid` was synthesized. Synthetic UIDs are only stable within
    /// a single parse, so they take no part in reconciliation.
    pub uid_is_synthetic: bool,
    pub summary: String,
    pub description: Option<String>,
    pub starts_at: EventTime,
    pub ends_at: Option<EventTime>,
    pub last_modified: Option<DateTime<Utc>>,
    pub location: Option<String>,
    /// Organizer address with any `mailto:` prefix removed.
    pub organizer: Option<String>,
    pub status: EventStatus,
    /// True when the source object carried an RRULE. The series is compared
    /// as a single unit; occurrences are never expanded.
    pub is_recurring: bool,
    /// `X-` extension properties, in source order.
    pub custom_properties: Vec<(String, String)>,
}

impl ExternalEvent {
    pub fn custom_property(&self, name: &str) -> Option<&str> {
        self.custom_properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ExternalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)
    }
}

/// A row in the mirror.
///
/// Times are stored resolved: `ends_at` is the effective end computed with
/// the feed's `TimePolicy` at sync time, so range queries need no zone data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirroredEvent {
    pub feed_id: String,
    pub external_uid: String,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub all_day: bool,
    pub location: Option<String>,
    pub status: EventStatus,
    pub is_recurring: bool,
    pub uid_is_synthetic: bool,
    pub synced_at: DateTime<Utc>,
}

impl MirroredEvent {
    pub fn from_external(
        feed_id: &str,
        event: &ExternalEvent,
        policy: &TimePolicy,
        synced_at: DateTime<Utc>,
    ) -> Self {
        MirroredEvent {
            feed_id: feed_id.to_string(),
            external_uid: event.uid.clone(),
            title: event.summary.clone(),
            starts_at: event.starts_at.to_utc(policy.timezone),
            ends_at: crate::date_range::effective_end(event, policy),
            all_day: event.starts_at.is_whole_day(),
            location: event.location.clone(),
            status: event.status.clone(),
            is_recurring: event.is_recurring,
            uid_is_synthetic: event.uid_is_synthetic,
            synced_at,
        }
    }
}

impl fmt::Display for MirroredEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}
