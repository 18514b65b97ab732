//! Core library for feedmirror.
//!
//! Mirrors third-party iCalendar feeds into a local store and checks that
//! the mirror still matches its feed:
//! - `ics` parses feeds tolerantly and stores mirror rows as .ics files
//! - `date_range` holds the validity window and overlap filter
//! - `mirror` is the store, behind the `Mirror` trait
//! - `sync` upserts feeds into the mirror, incrementally or by full rebuild
//! - `diff` compares a feed with its mirror and recommends follow-ups
//! - `scheduler` runs all of the above periodically or on demand

pub mod config;
pub mod constants;
pub mod date_range;
pub mod diff;
pub mod error;
pub mod event;
pub mod feedmirror;
pub mod fetch;
pub mod ics;
pub mod mirror;
pub mod scheduler;
pub mod snapshot;
pub mod sync;

pub use config::{FeedConfig, FeedMirrorConfig};
pub use date_range::DateWindow;
pub use diff::{DiffEngine, ValidationResult};
pub use error::{FeedMirrorError, FeedMirrorResult};
pub use event::{EventStatus, EventTime, ExternalEvent, MirroredEvent, TimePolicy};
pub use feedmirror::FeedMirror;
pub use fetch::{FeedFetcher, HttpFetcher, StaticFetcher};
pub use mirror::{DirMirror, FeedScope, MemoryMirror, Mirror};
pub use scheduler::{FeedStatus, Scheduler};
pub use snapshot::FeedSnapshot;
pub use sync::{FeedState, SyncMode, SyncReport, SyncWorker};
