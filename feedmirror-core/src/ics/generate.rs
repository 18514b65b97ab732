//! ICS serialization of mirror rows.
//!
//! The directory-backed mirror stores each row as a one-event calendar file.
//! Files are written with the icalendar crate and read back with our own
//! feed parser, so the stored format is exactly what feeds look like.

use chrono::{DateTime, NaiveDateTime, Utc};
use icalendar::{Calendar, Component, EventLike};

use crate::event::{EventStatus, MirroredEvent, TimePolicy};
use crate::ics::parse::parse_feed;

const X_FEED: &str = "X-FEEDMIRROR-FEED";
const X_ALL_DAY: &str = "X-FEEDMIRROR-ALL-DAY";
const X_RECURRING: &str = "X-FEEDMIRROR-RECURRING";
const X_SYNTHETIC_UID: &str = "X-FEEDMIRROR-SYNTHETIC-UID";
const X_SYNCED_AT: &str = "X-FEEDMIRROR-SYNCED-AT";

/// Generate the .ics content for one mirror row.
pub fn generate_mirror_ics(event: &MirroredEvent) -> String {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.external_uid);
    ics_event.summary(&event.title);

    // DTSTAMP derives from synced_at so rewriting an unchanged row is a no-op
    ics_event.add_property("DTSTAMP", ics_utc(&event.synced_at));

    // Rows hold resolved instants, so both ends are always written as UTC
    ics_event.add_property("DTSTART", ics_utc(&event.starts_at));
    ics_event.add_property("DTEND", ics_utc(&event.ends_at));

    if let Some(ref loc) = event.location {
        ics_event.location(loc);
    }

    // Status - only emit if not CONFIRMED (the implied default)
    if event.status != EventStatus::Confirmed {
        ics_event.add_property("STATUS", event.status.as_ics_str());
    }

    ics_event.add_property(X_FEED, &event.feed_id);
    ics_event.add_property(X_SYNCED_AT, ics_utc(&event.synced_at));
    if event.all_day {
        ics_event.add_property(X_ALL_DAY, "TRUE");
    }
    if event.is_recurring {
        ics_event.add_property(X_RECURRING, "TRUE");
    }
    if event.uid_is_synthetic {
        ics_event.add_property(X_SYNTHETIC_UID, "TRUE");
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    let cal = cal.done();

    strip_ics_bloat(&cal.to_string())
}

/// Read a mirror row back from its .ics content.
pub fn parse_mirror_ics(content: &str) -> Option<MirroredEvent> {
    // Stored times are always UTC, so the default policy is exact
    let parsed = parse_feed(content, &TimePolicy::default());
    let event = parsed.events.into_iter().next()?;
    let policy = TimePolicy::default();

    let flag = |name: &str| {
        event
            .custom_property(name)
            .is_some_and(|v| v.eq_ignore_ascii_case("TRUE"))
    };

    let synced_at = event
        .custom_property(X_SYNCED_AT)
        .and_then(|v| {
            NaiveDateTime::parse_from_str(v.trim_end_matches('Z'), "%Y%m%dT%H%M%S").ok()
        })
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Some(MirroredEvent {
        feed_id: event.custom_property(X_FEED)?.to_string(),
        starts_at: event.starts_at.to_utc(policy.timezone),
        ends_at: event
            .ends_at
            .map(|t| t.to_utc(policy.timezone))
            .unwrap_or_else(|| event.starts_at.to_utc(policy.timezone)),
        all_day: flag(X_ALL_DAY),
        is_recurring: flag(X_RECURRING),
        uid_is_synthetic: flag(X_SYNTHETIC_UID),
        external_uid: event.uid,
        title: event.summary,
        location: event.location,
        status: event.status,
        synced_at,
    })
}

fn ics_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with FEEDMIRROR
/// - Remove CALSCALE:GREGORIAN (it's the default)
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:FEEDMIRROR\r\n");
            continue;
        }
        if line == "CALSCALE:GREGORIAN" {
            continue;
        }
        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}
