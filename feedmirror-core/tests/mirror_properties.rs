//! End-to-end behaviour of parse -> filter -> sync -> validate.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use feedmirror_core::date_range::{effective_end, event_overlaps};
use feedmirror_core::diff::compare_uids;
use feedmirror_core::ics::parse_feed;
use feedmirror_core::{
    DateWindow, DiffEngine, DirMirror, EventStatus, EventTime, ExternalEvent, FeedConfig,
    MemoryMirror, Mirror, StaticFetcher, SyncMode, SyncWorker, TimePolicy,
};

const URL: &str = "https://calendar.example.com/team.ics";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn feed() -> FeedConfig {
    FeedConfig::new("team", URL).with_window(date(2025, 3, 1), date(2025, 3, 2))
}

fn reference() -> NaiveDate {
    date(2025, 3, 1)
}

fn calendar(events: &[&str]) -> String {
    let mut text = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Example//EN\r\n");
    for event in events {
        text.push_str(event);
    }
    text.push_str("END:VCALENDAR\r\n");
    text
}

fn timed(uid: &str, start: &str, end: &str) -> String {
    format!(
        "BEGIN:VEVENT\r\nUID:{uid}\r\nSUMMARY:{uid}\r\nDTSTART:{start}\r\nDTEND:{end}\r\nEND:VEVENT\r\n"
    )
}

const WHOLE_DAY: &str =
    "BEGIN:VEVENT\r\nUID:holiday\r\nSUMMARY:Holiday\r\nDTSTART;VALUE=DATE:20250301\r\nEND:VEVENT\r\n";

const TIMED: &str = "BEGIN:VEVENT\r\nUID:standup\r\nSUMMARY:Standup\r\n\
DTSTART:20250301T090000\r\nDTEND:20250301T100000\r\nEND:VEVENT\r\n";

#[tokio::test]
async fn whole_day_and_timed_event_against_empty_mirror() {
    let text = calendar(&[WHOLE_DAY, TIMED]);

    let parsed = parse_feed(&text, &TimePolicy::default());
    assert_eq!(parsed.events.len(), 2);
    assert_eq!(parsed.events[0].starts_at, EventTime::Date(date(2025, 3, 1)));
    assert!(!parsed.events[1].starts_at.is_whole_day());

    let fetcher = Arc::new(StaticFetcher::with_body(URL, text));
    let engine = DiffEngine::new(fetcher, Arc::new(MemoryMirror::new()));
    let result = engine.validate(&feed(), reference()).await.unwrap();

    assert_eq!(result.ics_event_count, 2);
    assert_eq!(result.db_event_count, 0);
    assert_eq!(result.missing_in_db, 2);
    assert_eq!(result.extra_in_db, 0);
}

#[test]
fn block_without_summary_is_dropped_and_the_rest_survive() {
    let broken = "BEGIN:VEVENT\r\nUID:broken\r\nDTSTART:20250301T120000Z\r\nEND:VEVENT\r\n";
    let text = calendar(&[WHOLE_DAY, broken, TIMED]);

    let parsed = parse_feed(&text, &TimePolicy::default());

    let uids: Vec<_> = parsed.events.iter().map(|e| e.uid.as_str()).collect();
    assert_eq!(uids, vec!["holiday", "standup"]);
    assert_eq!(parsed.stats.dropped, 1);
    assert_eq!(parsed.stats.objects, 3);
}

#[test]
fn folded_values_unfold_to_the_original_for_any_number_of_lines() {
    let original = "Quarterly planning, with notes; and a long tail of words that wraps";

    for pieces in 1..=original.len() {
        let chunk = original.len().div_ceil(pieces);
        let chunks: Vec<&str> = original
            .as_bytes()
            .chunks(chunk)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect();
        let folded = chunks.join("\r\n ");

        let event = format!(
            "BEGIN:VEVENT\r\nUID:fold\r\nSUMMARY:{folded}\r\nDTSTART:20250301T090000Z\r\nEND:VEVENT\r\n"
        );
        let parsed = parse_feed(&calendar(&[&event]), &TimePolicy::default());

        // Commas and semicolons are escaped in real feeds; here they are raw
        assert_eq!(parsed.events[0].summary, original, "{pieces} pieces");
    }
}

#[test]
fn overlap_matches_the_interval_predicate() {
    let policy = TimePolicy::default();
    let window = DateWindow::from_dates(date(2025, 3, 1), date(2025, 3, 2), Tz::UTC).unwrap();

    let base = ExternalEvent {
        uid: "e".into(),
        uid_is_synthetic: false,
        summary: "E".into(),
        description: None,
        starts_at: EventTime::Date(date(2025, 3, 1)),
        ends_at: None,
        last_modified: None,
        location: None,
        organizer: None,
        status: EventStatus::Confirmed,
        is_recurring: false,
        custom_properties: vec![],
    };

    // Sweep starts and ends across the window edges in 6-hour steps
    let origin = Utc.with_ymd_and_hms(2025, 2, 27, 0, 0, 0).unwrap();
    for s in 0..28 {
        for len in [0, 3, 12, 30] {
            let start = origin + chrono::Duration::hours(6 * s);
            let end = start + chrono::Duration::hours(len);
            let event = ExternalEvent {
                starts_at: EventTime::DateTime(start),
                ends_at: Some(EventTime::DateTime(end)),
                ..base.clone()
            };

            let expected = start <= window.end && effective_end(&event, &policy) >= window.start;
            assert_eq!(event_overlaps(&event, &window, &policy), expected, "start {start}");
        }
    }

    let touching = ExternalEvent {
        starts_at: EventTime::DateTime(window.end),
        ends_at: None,
        ..base
    };
    assert!(event_overlaps(&touching, &window, &policy));
}

#[test]
fn diff_counts_are_symmetric() {
    let a = ["1", "2", "3", "7"];
    let b = ["2", "3", "4", "5", "6"];

    let forward = compare_uids(a, b);
    let backward = compare_uids(b, a);

    assert_eq!(forward.missing.len(), 2);
    assert_eq!(forward.extra.len(), 3);
    assert_eq!(forward.missing.len(), backward.extra.len());
    assert_eq!(forward.extra.len(), backward.missing.len());
}

#[tokio::test]
async fn incremental_sync_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = Arc::new(DirMirror::new(dir.path()));
    let text = calendar(&[
        WHOLE_DAY,
        TIMED,
        &timed("late", "20250302T230000Z", "20250303T010000Z"),
    ]);
    let fetcher = Arc::new(StaticFetcher::with_body(URL, text));
    let worker = SyncWorker::new(fetcher.clone(), mirror.clone());
    let engine = DiffEngine::new(fetcher, mirror.clone());
    let feed = feed();
    let window = feed.window(reference()).unwrap();

    worker.run(&feed, SyncMode::Incremental, reference()).await.unwrap();
    let first: Vec<_> = mirror
        .query_range(&feed.scope(), &window)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.external_uid, r.title, r.starts_at, r.ends_at))
        .collect();

    worker.run(&feed, SyncMode::Incremental, reference()).await.unwrap();
    let second: Vec<_> = mirror
        .query_range(&feed.scope(), &window)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.external_uid, r.title, r.starts_at, r.ends_at))
        .collect();

    assert_eq!(first, second);
    assert_eq!(mirror.count(&feed.scope()).await.unwrap(), 3);

    let result = engine.validate(&feed, reference()).await.unwrap();
    assert_eq!(result.missing_in_db, 0);
    assert_eq!(result.extra_in_db, 0);
    assert!(result.recommendations.is_empty());
}

#[tokio::test]
async fn forced_resync_recovers_upstream_deletions() {
    let fetcher = Arc::new(StaticFetcher::with_body(
        URL,
        calendar(&[TIMED, &timed("x", "20250301T120000Z", "20250301T130000Z")]),
    ));
    let mirror = Arc::new(MemoryMirror::new());
    let worker = SyncWorker::new(fetcher.clone(), mirror.clone());
    let engine = DiffEngine::new(fetcher.clone(), mirror.clone());
    let feed = feed();

    worker.run(&feed, SyncMode::Incremental, reference()).await.unwrap();

    // "x" is deleted upstream
    fetcher.set_body(URL, calendar(&[TIMED]));

    worker.run(&feed, SyncMode::Incremental, reference()).await.unwrap();
    let after_incremental = engine.validate(&feed, reference()).await.unwrap();
    assert_eq!(after_incremental.extra_in_db, 1);
    assert_eq!(after_incremental.extra_uids, vec!["x"]);

    worker.run(&feed, SyncMode::ForcedResync, reference()).await.unwrap();
    let after_resync = engine.validate(&feed, reference()).await.unwrap();
    assert_eq!(after_resync.extra_in_db, 0);
    assert_eq!(after_resync.missing_in_db, 0);
}

#[tokio::test]
async fn synthetic_uids_take_no_part_in_reconciliation() {
    let no_uid = "BEGIN:VEVENT\r\nSUMMARY:Anonymous\r\nDTSTART:20250301T150000Z\r\nEND:VEVENT\r\n";
    let fetcher = Arc::new(StaticFetcher::with_body(URL, calendar(&[no_uid, TIMED])));
    let mirror = Arc::new(MemoryMirror::new());
    let engine = DiffEngine::new(fetcher, mirror.clone());

    let result = engine.validate(&feed(), reference()).await.unwrap();

    assert_eq!(result.ics_event_count, 2);
    assert_eq!(result.synthetic_uid_count, 1);
    // Only "standup" can be missing; the anonymous event is not compared
    assert_eq!(result.missing_in_db, 1);
}
