//! Tolerant VEVENT parser for calendar feeds.
//!
//! Feeds come from third parties and are frequently sloppy, so this parser
//! never fails on an individual object. The feed is unfolded once, cut into
//! VEVENT blocks, and each block goes through the icalendar reader on its
//! own: a block the reader rejects, or one without a SUMMARY or a decodable
//! DTSTART, is dropped and counted while everything else is emitted.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use icalendar::parser::{self, read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use serde::Serialize;

use crate::error::{FeedMirrorError, FeedMirrorResult};
use crate::event::{EventStatus, EventTime, ExternalEvent, TimePolicy, resolve_local};
use crate::ics::property::Property;

/// Counters for one parse pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// VEVENT blocks seen.
    pub objects: usize,
    pub accepted: usize,
    /// Blocks discarded as unreadable, unterminated, or lacking a SUMMARY or
    /// a usable DTSTART.
    pub dropped: usize,
    /// Blocks whose UID repeated an earlier one (recurrence overrides).
    pub duplicates: usize,
    pub synthetic_uids: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub events: Vec<ExternalEvent>,
    pub stats: ParseStats,
}

/// Parse raw feed bytes. Bytes that are not UTF-8 are the only hard error.
pub fn parse_feed_bytes(raw: &[u8], policy: &TimePolicy) -> FeedMirrorResult<ParsedFeed> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| FeedMirrorError::Serialization(format!("Feed is not valid UTF-8: {e}")))?;
    Ok(parse_feed(text.trim_start_matches('\u{feff}'), policy))
}

/// Parse feed text into events, in source order.
pub fn parse_feed(text: &str, policy: &TimePolicy) -> ParsedFeed {
    let mut parsed = ParsedFeed::default();
    let mut seen_uids: HashSet<String> = HashSet::new();

    let unfolded = unfold(text);
    let blocks = split_vevent_blocks(&unfolded);
    parsed.stats.objects = blocks.complete.len() + blocks.unterminated;
    parsed.stats.dropped = blocks.unterminated;

    for block in &blocks.complete {
        let Some(mut event) = read_event(block, policy) else {
            parsed.stats.dropped += 1;
            continue;
        };

        if event.uid.is_empty() {
            event.uid = format!("generated-{}", parsed.events.len());
            event.uid_is_synthetic = true;
        }

        if !seen_uids.insert(event.uid.clone()) {
            tracing::trace!(uid = %event.uid, "skipping repeated UID");
            parsed.stats.duplicates += 1;
            continue;
        }

        if event.uid_is_synthetic {
            parsed.stats.synthetic_uids += 1;
        }
        parsed.stats.accepted += 1;
        parsed.events.push(event);
    }

    parsed
}

/// VEVENT blocks cut out of an unfolded feed, each a standalone
/// `BEGIN:VEVENT`..`END:VEVENT` text.
#[derive(Debug, Default)]
struct VeventBlocks {
    complete: Vec<String>,
    /// Blocks cut short by another `BEGIN:VEVENT` or by the end of input.
    unterminated: usize,
}

/// Cut the feed into VEVENT blocks.
///
/// VEVENTs never nest, so a `BEGIN:VEVENT` while a block is open abandons
/// that block. Nested components (VALARM and friends) are tracked by name;
/// an `END` matching neither them nor the VEVENT is skipped, and nested
/// components still open at `END:VEVENT` are closed for the reader.
fn split_vevent_blocks(unfolded: &str) -> VeventBlocks {
    let mut blocks = VeventBlocks::default();
    let mut current: Option<String> = None;
    let mut nested: Vec<String> = Vec::new();

    for line in unfolded.lines() {
        if line.trim().is_empty() {
            continue;
        }

        match boundary(line) {
            Some(Boundary::Begin(name)) if name == "VEVENT" => {
                if current.is_some() {
                    tracing::debug!("dropping VEVENT that was never closed");
                    blocks.unterminated += 1;
                }
                current = Some(String::new());
                nested.clear();
                push_line(&mut current, "BEGIN:VEVENT");
            }
            Some(Boundary::Begin(name)) => {
                if current.is_some() {
                    push_line(&mut current, &format!("BEGIN:{name}"));
                    nested.push(name);
                }
            }
            Some(Boundary::End(name)) => {
                if nested.last() == Some(&name) {
                    nested.pop();
                    push_line(&mut current, &format!("END:{name}"));
                } else if name == "VEVENT" && current.is_some() {
                    while let Some(open) = nested.pop() {
                        push_line(&mut current, &format!("END:{open}"));
                    }
                    push_line(&mut current, "END:VEVENT");
                    if let Some(block) = current.take() {
                        blocks.complete.push(block);
                    }
                }
            }
            None => push_line(&mut current, line),
        }
    }

    // Truncated feed: the last object never closed
    if current.is_some() {
        tracing::debug!("dropping VEVENT cut off by end of feed");
        blocks.unterminated += 1;
    }

    blocks
}

enum Boundary {
    Begin(String),
    End(String),
}

/// Recognize `BEGIN:<NAME>` / `END:<NAME>`, normalizing the component name.
fn boundary(line: &str) -> Option<Boundary> {
    let (key, value) = line.split_once(':')?;
    let name = value.trim().to_ascii_uppercase();
    match key.trim().to_ascii_uppercase().as_str() {
        "BEGIN" => Some(Boundary::Begin(name)),
        "END" => Some(Boundary::End(name)),
        _ => None,
    }
}

fn push_line(block: &mut Option<String>, line: &str) {
    if let Some(block) = block.as_mut() {
        block.push_str(line);
        block.push_str("\r\n");
    }
}

/// Run one block through the icalendar reader and map it to an event.
fn read_event(block: &str, policy: &TimePolicy) -> Option<ExternalEvent> {
    let calendar = match read_calendar(block) {
        Ok(calendar) => calendar,
        Err(e) => {
            tracing::debug!(error = %e, "dropping unreadable VEVENT");
            return None;
        }
    };
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;

    let mut builder = EventBuilder::default();
    for prop in &vevent.properties {
        builder.apply(prop, policy);
    }

    let event = builder.build();
    if event.is_none() {
        tracing::debug!("dropping VEVENT without SUMMARY or usable DTSTART");
    }
    event
}

#[derive(Default)]
struct EventBuilder {
    uid: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    starts_at: Option<EventTime>,
    ends_at: Option<EventTime>,
    last_modified: Option<DateTime<Utc>>,
    location: Option<String>,
    organizer: Option<String>,
    status: Option<EventStatus>,
    is_recurring: bool,
    custom_properties: Vec<(String, String)>,
}

impl EventBuilder {
    // TEXT values (UID, SUMMARY, DESCRIPTION, LOCATION, STATUS) arrive
    // unescaped from the reader
    fn apply(&mut self, prop: &parser::Property<'_>, policy: &TimePolicy) {
        let value = prop.val.as_str();
        match Property::from_name(prop.name.as_str()) {
            Property::Uid => self.uid = Some(value.trim().to_string()),
            Property::Summary => self.summary = Some(value.to_string()),
            Property::Description => self.description = Some(value.to_string()),
            Property::DtStart => self.starts_at = decode_time(prop, policy),
            Property::DtEnd => self.ends_at = decode_time(prop, policy),
            Property::LastModified => {
                self.last_modified = decode_time(prop, policy).map(|t| t.to_utc(policy.timezone))
            }
            Property::Location => self.location = Some(value.to_string()),
            Property::Organizer => {
                let value = value.trim();
                let address = value
                    .strip_prefix("mailto:")
                    .or_else(|| value.strip_prefix("MAILTO:"))
                    .unwrap_or(value);
                self.organizer = Some(address.to_string());
            }
            Property::Status => self.status = Some(EventStatus::from_ics_str(value)),
            Property::RRule => self.is_recurring = true,
            Property::Extension(name) => self
                .custom_properties
                .push((name, prop.val.clone().unescape_text().to_string())),
            Property::Unrecognized => {}
        }
    }

    fn build(self) -> Option<ExternalEvent> {
        let summary = self.summary?;
        let starts_at = self.starts_at?;

        Some(ExternalEvent {
            uid: self.uid.unwrap_or_default(),
            uid_is_synthetic: false,
            summary,
            description: self.description,
            starts_at,
            ends_at: self.ends_at,
            last_modified: self.last_modified,
            location: self.location,
            organizer: self.organizer,
            status: self.status.unwrap_or_default(),
            is_recurring: self.is_recurring,
            custom_properties: self.custom_properties,
        })
    }
}

/// Decode a DTSTART/DTEND/LAST-MODIFIED property.
///
/// - `YYYYMMDD` (or any value with `VALUE=DATE`) is a whole day.
/// - `YYYYMMDDTHHMMSS` is timed: `Z` means UTC, a known `TZID` parameter
///   selects that zone, anything else uses the policy's zone.
/// - Other shapes get a generic RFC 3339 / ISO 8601 attempt.
///
/// Returns `None` for anything unparsable.
pub fn decode_time(prop: &parser::Property<'_>, policy: &TimePolicy) -> Option<EventTime> {
    let date_only = prop.params.iter().any(|p| {
        p.key == "VALUE"
            && p.val
                .as_ref()
                .is_some_and(|v| v.as_str().eq_ignore_ascii_case("DATE"))
    });

    match DatePerhapsTime::try_from(prop) {
        Ok(time) if date_only => Some(EventTime::Date(time.date_naive())),
        Ok(DatePerhapsTime::Date(date)) => Some(EventTime::Date(date)),
        Ok(DatePerhapsTime::DateTime(time)) => {
            Some(EventTime::DateTime(resolve_instant(time, policy)))
        }
        Err(_) => decode_generic(prop.val.as_str().trim(), policy),
    }
}

fn resolve_instant(time: CalendarDateTime, policy: &TimePolicy) -> DateTime<Utc> {
    match time {
        CalendarDateTime::Utc(instant) => instant,
        CalendarDateTime::Floating(naive) => resolve_local(naive, policy.timezone),
        CalendarDateTime::WithTimezone { date_time, tzid } => {
            resolve_local(date_time, zone_for(&tzid, policy))
        }
    }
}

fn zone_for(tzid: &str, policy: &TimePolicy) -> Tz {
    tzid.trim_matches('"').parse::<Tz>().unwrap_or_else(|_| {
        tracing::debug!(tzid, "unknown TZID, using feed time zone");
        policy.timezone
    })
}

fn decode_generic(value: &str, policy: &TimePolicy) -> Option<EventTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(EventTime::DateTime(dt.with_timezone(&Utc)));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(EventTime::DateTime(resolve_local(naive, policy.timezone)));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(EventTime::Date)
}
