//! Calendar feed parsing and ICS generation.
//!
//! Reading goes through `icalendar::parser` one VEVENT at a time rather than
//! over the whole feed: one broken VEVENT must never cost the rest of it.

mod generate;
mod parse;
mod property;

pub use generate::{generate_mirror_ics, parse_mirror_ics};
pub use parse::{ParseStats, ParsedFeed, decode_time, parse_feed, parse_feed_bytes};
pub use property::Property;
