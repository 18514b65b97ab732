//! The filtered external event set for one feed at one point in time.
//!
//! Both the sync worker and the diff engine start from a snapshot, so they
//! see exactly the same events for the same feed, window and reference date.

use chrono::NaiveDate;

use crate::config::FeedConfig;
use crate::date_range::{DateWindow, filter_events};
use crate::error::FeedMirrorResult;
use crate::event::{ExternalEvent, TimePolicy};
use crate::fetch::FeedFetcher;
use crate::ics::{ParseStats, ParsedFeed, parse_feed_bytes};

#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub window: DateWindow,
    pub policy: TimePolicy,
    /// Events overlapping `window`, in feed order, at most `max_events`.
    pub events: Vec<ExternalEvent>,
    pub stats: ParseStats,
    /// Bytes received from the feed.
    pub fetched_bytes: usize,
    /// Events that overlapped the window before the cap was applied.
    pub in_window: usize,
    /// Whether the cap cut events off.
    pub truncated: bool,
}

impl FeedSnapshot {
    /// Fetch, parse, filter and cap the feed.
    pub async fn load(
        fetcher: &dyn FeedFetcher,
        feed: &FeedConfig,
        reference: NaiveDate,
    ) -> FeedMirrorResult<Self> {
        let policy = feed.time_policy()?;
        let window = feed.window(reference)?;
        let url = feed.fetch_url()?;

        let raw = fetcher.fetch(&url).await?;
        let parsed = parse_feed_bytes(&raw, &policy)?;

        let mut snapshot = Self::from_parsed(parsed, window, policy, feed.max_events);
        snapshot.fetched_bytes = raw.len();

        tracing::debug!(
            feed = %feed.id,
            bytes = snapshot.fetched_bytes,
            objects = snapshot.stats.objects,
            dropped = snapshot.stats.dropped,
            in_window = snapshot.in_window,
            "feed snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn from_parsed(
        parsed: ParsedFeed,
        window: DateWindow,
        policy: TimePolicy,
        max_events: usize,
    ) -> Self {
        let mut events = filter_events(parsed.events, &window, &policy);
        let in_window = events.len();
        let truncated = in_window > max_events;
        events.truncate(max_events);

        FeedSnapshot {
            window,
            policy,
            events,
            stats: parsed.stats,
            fetched_bytes: 0,
            in_window,
            truncated,
        }
    }

    pub fn synthetic_count(&self) -> usize {
        self.events.iter().filter(|e| e.uid_is_synthetic).count()
    }
}
