//! In-memory mirror.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::date_range::DateWindow;
use crate::error::FeedMirrorResult;
use crate::event::MirroredEvent;
use crate::mirror::{FeedScope, Mirror, sort_rows};

#[derive(Default)]
pub struct MemoryMirror {
    // feed_id -> external_uid -> row
    feeds: RwLock<HashMap<String, HashMap<String, MirroredEvent>>>,
    pending: RwLock<HashSet<String>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row of a feed, ordered by start.
    pub async fn rows(&self, scope: &FeedScope) -> Vec<MirroredEvent> {
        let feeds = self.feeds.read().await;
        let mut rows: Vec<_> = feeds
            .get(&scope.feed_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        sort_rows(&mut rows);
        rows
    }
}

#[async_trait]
impl Mirror for MemoryMirror {
    async fn upsert(&self, event: &MirroredEvent) -> FeedMirrorResult<()> {
        self.feeds
            .write()
            .await
            .entry(event.feed_id.clone())
            .or_default()
            .insert(event.external_uid.clone(), event.clone());
        Ok(())
    }

    async fn clear(&self, scope: &FeedScope) -> FeedMirrorResult<usize> {
        let removed = self
            .feeds
            .write()
            .await
            .remove(&scope.feed_id)
            .map(|rows| rows.len())
            .unwrap_or(0);
        Ok(removed)
    }

    async fn query_range(
        &self,
        scope: &FeedScope,
        window: &DateWindow,
    ) -> FeedMirrorResult<Vec<MirroredEvent>> {
        let mut rows: Vec<_> = self
            .rows(scope)
            .await
            .into_iter()
            .filter(|row| window.overlaps(row.starts_at, row.ends_at))
            .collect();
        sort_rows(&mut rows);
        Ok(rows)
    }

    async fn count(&self, scope: &FeedScope) -> FeedMirrorResult<usize> {
        Ok(self
            .feeds
            .read()
            .await
            .get(&scope.feed_id)
            .map(|rows| rows.len())
            .unwrap_or(0))
    }

    async fn set_resync_pending(&self, scope: &FeedScope, pending: bool) -> FeedMirrorResult<()> {
        let mut flags = self.pending.write().await;
        if pending {
            flags.insert(scope.feed_id.clone());
        } else {
            flags.remove(&scope.feed_id);
        }
        Ok(())
    }

    async fn resync_pending(&self, scope: &FeedScope) -> FeedMirrorResult<bool> {
        Ok(self.pending.read().await.contains(&scope.feed_id))
    }
}
