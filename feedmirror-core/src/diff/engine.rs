use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::FeedConfig;
use crate::constants::DEFAULT_SAMPLE_SIZE;
use crate::diff::ValidationResult;
use crate::error::FeedMirrorResult;
use crate::fetch::FeedFetcher;
use crate::mirror::Mirror;
use crate::snapshot::FeedSnapshot;

/// Compares a feed against its mirror. Never writes to the mirror.
#[derive(Clone)]
pub struct DiffEngine {
    fetcher: Arc<dyn FeedFetcher>,
    mirror: Arc<dyn Mirror>,
    sample_size: usize,
}

impl DiffEngine {
    pub fn new(fetcher: Arc<dyn FeedFetcher>, mirror: Arc<dyn Mirror>) -> Self {
        DiffEngine {
            fetcher,
            mirror,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Validate `feed` for the window it has on `reference`.
    ///
    /// Fetch and config failures are returned as errors, never as an empty
    /// report.
    pub async fn validate(
        &self,
        feed: &FeedConfig,
        reference: NaiveDate,
    ) -> FeedMirrorResult<ValidationResult> {
        let snapshot = FeedSnapshot::load(self.fetcher.as_ref(), feed, reference).await?;
        let rows = self
            .mirror
            .query_range(&feed.scope(), &snapshot.window)
            .await?;

        let result =
            ValidationResult::compare(&feed.id, &snapshot, &rows, feed.max_events, self.sample_size);

        if result.is_clean() {
            tracing::info!(
                feed = %feed.id,
                events = result.ics_event_count,
                "mirror matches feed"
            );
        } else {
            tracing::warn!(
                feed = %feed.id,
                missing = result.missing_in_db,
                extra = result.extra_in_db,
                "mirror has drifted from feed"
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedMirrorError;
    use crate::event::{EventStatus, MirroredEvent};
    use crate::fetch::{StaticFetcher, StaticResponse};
    use crate::mirror::{DirMirror, MemoryMirror};
    use chrono::{TimeZone, Utc};

    const URL: &str = "https://example.com/team.ics";

    const TWO_EVENTS: &str = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\nUID:holiday\r\nSUMMARY:Holiday\r\nDTSTART;VALUE=DATE:20250301\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:standup\r\nSUMMARY:Standup\r\nDTSTART:20250301T090000\r\nDTEND:20250301T100000\r\nEND:VEVENT\r\n\
END:VCALENDAR\r\n";

    fn feed() -> FeedConfig {
        FeedConfig::new("team", URL).with_window(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
        )
    }

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn stale_row() -> MirroredEvent {
        MirroredEvent {
            feed_id: "team".into(),
            external_uid: "gone".into(),
            title: "Gone".into(),
            starts_at: Utc.with_ymd_and_hms(2025, 3, 2, 12, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2025, 3, 2, 13, 0, 0).unwrap(),
            all_day: false,
            location: None,
            status: EventStatus::Confirmed,
            is_recurring: false,
            uid_is_synthetic: false,
            synced_at: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_empty_mirror_reports_everything_missing() {
        let fetcher = Arc::new(StaticFetcher::with_body(URL, TWO_EVENTS));
        let mirror = Arc::new(MemoryMirror::new());
        let engine = DiffEngine::new(fetcher, mirror);

        let result = engine.validate(&feed(), reference()).await.unwrap();

        assert_eq!(result.ics_event_count, 2);
        assert_eq!(result.db_event_count, 0);
        assert_eq!(result.missing_in_db, 2);
        assert_eq!(result.extra_in_db, 0);
        assert_eq!(result.sample_comparison.ics_events.len(), 2);
        assert_eq!(result.sample_comparison.ics_events[0].start, "2025-03-01");
        assert!(result.recommendations[0].contains("full resync"));
    }

    #[tokio::test]
    async fn test_escaped_uid_matches_its_stored_row() {
        let body = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\nUID:abc\\,def\\;ghi\\\\x\r\nSUMMARY:Escaped\r\n\
DTSTART:20250301T090000Z\r\nDTEND:20250301T100000Z\r\nEND:VEVENT\r\n\
END:VCALENDAR\r\n";
        let fetcher = Arc::new(StaticFetcher::with_body(URL, body));
        let dir = tempfile::tempdir().unwrap();
        let mirror = Arc::new(DirMirror::new(dir.path()));
        let mut row = stale_row();
        row.external_uid = "abc,def;ghi\\x".into();
        row.title = "Escaped".into();
        row.starts_at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        row.ends_at = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        mirror.upsert(&row).await.unwrap();
        let engine = DiffEngine::new(fetcher, mirror);

        let result = engine.validate(&feed(), reference()).await.unwrap();

        assert!(result.is_clean(), "{result:?}");
        assert_eq!(result.ics_event_count, 1);
        assert_eq!(result.db_event_count, 1);
    }

    #[tokio::test]
    async fn test_validation_does_not_write() {
        let fetcher = Arc::new(StaticFetcher::with_body(URL, TWO_EVENTS));
        let mirror = Arc::new(MemoryMirror::new());
        mirror.upsert(&stale_row()).await.unwrap();
        let engine = DiffEngine::new(fetcher, mirror.clone());

        let result = engine.validate(&feed(), reference()).await.unwrap();

        assert_eq!(result.extra_in_db, 1);
        assert_eq!(result.extra_uids, vec!["gone"]);
        assert_eq!(mirror.count(&feed().scope()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_error_not_a_zeroed_result() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.set_response(URL, StaticResponse::Transport("connection refused".into()));
        let engine = DiffEngine::new(fetcher, Arc::new(MemoryMirror::new()));

        let err = engine.validate(&feed(), reference()).await.unwrap_err();
        assert!(matches!(err, FeedMirrorError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_result_serializes_with_contract_names() {
        let fetcher = Arc::new(StaticFetcher::with_body(URL, TWO_EVENTS));
        let engine = DiffEngine::new(fetcher, Arc::new(MemoryMirror::new())).with_sample_size(1);

        let result = engine.validate(&feed(), reference()).await.unwrap();
        let json = serde_json::to_value(&result).unwrap();

        for key in [
            "icsEventCount",
            "dbEventCount",
            "dateRangeStart",
            "dateRangeEnd",
            "missingInDb",
            "extraInDb",
            "recommendations",
            "droppedObjectCount",
            "syntheticUidCount",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(json["sampleComparison"]["icsEvents"].as_array().unwrap().len(), 1);
        assert!(json["sampleComparison"]["dbEvents"].as_array().unwrap().is_empty());
    }
}
