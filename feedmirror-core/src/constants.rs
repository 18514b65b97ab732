//! Defaults shared across the crate.

use std::time::Duration;

/// Days before and after the reference date covered by a relative window.
pub const DEFAULT_SYNC_DAYS: i64 = 365;

/// Default event cap per feed.
pub const DEFAULT_MAX_EVENTS: usize = 2500;

/// Number of events from each side included in a validation sample.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Relative count difference above which validation asks for a manual look.
pub const DISCREPANCY_THRESHOLD: f64 = 0.1;

/// Run records kept per feed by the scheduler.
pub const RUN_LOG_CAPACITY: usize = 20;
