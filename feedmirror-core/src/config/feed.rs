//! Per-feed configuration.

use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_EVENTS, DEFAULT_SYNC_DAYS};
use crate::date_range::DateWindow;
use crate::error::{FeedMirrorError, FeedMirrorResult};
use crate::event::TimePolicy;
use crate::fetch::normalize_feed_url;
use crate::mirror::FeedScope;

fn default_days() -> i64 {
    DEFAULT_SYNC_DAYS
}

fn default_max_events() -> usize {
    DEFAULT_MAX_EVENTS
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

/// One `[[feeds]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub id: String,
    pub url: String,

    /// Fixed window bounds. When absent, the window is relative to the
    /// reference date of each run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end: Option<NaiveDate>,

    #[serde(default = "default_days")]
    pub days_back: i64,
    #[serde(default = "default_days")]
    pub days_ahead: i64,

    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Feeds without an interval only sync on demand.
    #[serde(
        default,
        with = "super::duration_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_interval: Option<Duration>,

    /// IANA zone for floating times and whole-day values.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_true")]
    pub validate_after_sync: bool,

    #[serde(default)]
    pub resync_on_drift: bool,
}

impl FeedConfig {
    pub fn new(id: &str, url: &str) -> Self {
        FeedConfig {
            id: id.to_string(),
            url: url.to_string(),
            window_start: None,
            window_end: None,
            days_back: DEFAULT_SYNC_DAYS,
            days_ahead: DEFAULT_SYNC_DAYS,
            max_events: DEFAULT_MAX_EVENTS,
            refresh_interval: None,
            timezone: default_timezone(),
            validate_after_sync: true,
            resync_on_drift: false,
        }
    }

    pub fn with_window(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.window_start = Some(start);
        self.window_end = Some(end);
        self
    }

    pub fn scope(&self) -> FeedScope {
        FeedScope::new(&self.id)
    }

    /// The URL actually requested, with `webcal://` rewritten.
    pub fn fetch_url(&self) -> FeedMirrorResult<String> {
        normalize_feed_url(&self.url)
    }

    pub fn tz(&self) -> FeedMirrorResult<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            FeedMirrorError::Config(format!(
                "Feed '{}': unknown time zone '{}'",
                self.id, self.timezone
            ))
        })
    }

    pub fn time_policy(&self) -> FeedMirrorResult<TimePolicy> {
        Ok(TimePolicy::new(self.tz()?))
    }

    /// The validity window for a run on `reference`.
    ///
    /// Fixed bounds win over the relative window; a feed may fix one side
    /// and leave the other relative.
    pub fn window(&self, reference: NaiveDate) -> FeedMirrorResult<DateWindow> {
        let tz = self.tz()?;
        match (self.window_start, self.window_end) {
            (None, None) => DateWindow::around(reference, self.days_back, self.days_ahead, tz),
            (start, end) => {
                let start = start.unwrap_or(relative_date(reference, -self.days_back)?);
                let end = end.unwrap_or(relative_date(reference, self.days_ahead)?);
                DateWindow::from_dates(start, end, tz).map_err(|_| {
                    FeedMirrorError::Config(format!(
                        "Feed '{}': window_start {} is after window_end {}",
                        self.id, start, end
                    ))
                })
            }
        }
    }

    /// Check everything that can be checked without the network.
    pub fn validate(&self) -> FeedMirrorResult<()> {
        if self.id.trim().is_empty() {
            return Err(FeedMirrorError::Config("Feed id must not be empty".into()));
        }
        if self.id.contains(['/', '\\']) || self.id.starts_with('.') {
            return Err(FeedMirrorError::Config(format!(
                "Feed id '{}' must be a plain name",
                self.id
            )));
        }
        self.fetch_url()?;
        self.tz()?;
        if self.max_events == 0 {
            return Err(FeedMirrorError::Config(format!(
                "Feed '{}': max_events must be at least 1",
                self.id
            )));
        }
        if self.days_back < 0 || self.days_ahead < 0 {
            return Err(FeedMirrorError::Config(format!(
                "Feed '{}': days_back and days_ahead must not be negative",
                self.id
            )));
        }
        if let (Some(start), Some(end)) = (self.window_start, self.window_end) {
            if start > end {
                return Err(FeedMirrorError::Config(format!(
                    "Feed '{}': window_start {} is after window_end {}",
                    self.id, start, end
                )));
            }
        }
        if self.refresh_interval.is_some_and(|d| d.is_zero()) {
            return Err(FeedMirrorError::Config(format!(
                "Feed '{}': refresh_interval must be positive",
                self.id
            )));
        }
        Ok(())
    }
}

fn relative_date(reference: NaiveDate, days: i64) -> FeedMirrorResult<NaiveDate> {
    reference
        .checked_add_signed(chrono::Duration::days(days))
        .ok_or_else(|| {
            FeedMirrorError::Config(format!("{days} days from {reference} is out of range"))
        })
}
