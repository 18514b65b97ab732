//! The mirror: the locally owned store of previously synced events.
//!
//! The sync worker and diff engine only talk to the `Mirror` trait. Two
//! implementations ship with the crate: `MemoryMirror` for tests and
//! ephemeral servers, and `DirMirror`, which keeps one .ics file per row.

mod dir;
mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::date_range::DateWindow;
use crate::error::FeedMirrorResult;
use crate::event::MirroredEvent;

pub use dir::DirMirror;
pub use memory::MemoryMirror;

/// Addresses every row belonging to one feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedScope {
    pub feed_id: String,
}

impl FeedScope {
    pub fn new(feed_id: impl Into<String>) -> Self {
        FeedScope {
            feed_id: feed_id.into(),
        }
    }
}

impl fmt::Display for FeedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.feed_id)
    }
}

#[async_trait]
pub trait Mirror: Send + Sync {
    /// Insert or replace the row keyed by `(feed_id, external_uid)`.
    async fn upsert(&self, event: &MirroredEvent) -> FeedMirrorResult<()>;

    /// Remove every row in `scope`, returning how many were removed.
    async fn clear(&self, scope: &FeedScope) -> FeedMirrorResult<usize>;

    /// Rows in `scope` whose `[starts_at, ends_at]` overlaps `window`,
    /// ordered by start.
    async fn query_range(
        &self,
        scope: &FeedScope,
        window: &DateWindow,
    ) -> FeedMirrorResult<Vec<MirroredEvent>>;

    async fn count(&self, scope: &FeedScope) -> FeedMirrorResult<usize>;

    /// Flag (or unflag) a forced resync as in progress for `scope`.
    ///
    /// Stores that survive restarts persist this so an interrupted resync is
    /// still visible afterwards.
    async fn set_resync_pending(&self, scope: &FeedScope, pending: bool) -> FeedMirrorResult<()>;

    async fn resync_pending(&self, scope: &FeedScope) -> FeedMirrorResult<bool>;
}

fn sort_rows(rows: &mut [MirroredEvent]) {
    rows.sort_by(|a, b| {
        a.starts_at
            .cmp(&b.starts_at)
            .then_with(|| a.external_uid.cmp(&b.external_uid))
    });
}
