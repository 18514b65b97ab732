use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FeedConfig;
use crate::error::{FeedMirrorError, FeedMirrorResult};
use crate::event::MirroredEvent;
use crate::fetch::FeedFetcher;
use crate::mirror::Mirror;
use crate::snapshot::FeedSnapshot;
use crate::sync::{FeedGuard, FeedLocks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Upsert every feed event; never removes rows.
    Incremental,
    /// Clear the feed's rows, then upsert every feed event.
    ForcedResync,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Incremental => write!(f, "incremental"),
            SyncMode::ForcedResync => write!(f, "forced resync"),
        }
    }
}

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub feed_id: String,
    pub mode: SyncMode,
    pub fetched_bytes: usize,
    /// Events the parser accepted.
    pub parsed: usize,
    /// Events overlapping the window, before the cap.
    pub in_window: usize,
    pub upserted: usize,
    /// Rows removed by the clear step; 0 for incremental runs.
    pub cleared: usize,
    pub dropped: usize,
    pub synthetic: usize,
    pub truncated: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Runs feed -> mirror syncs.
///
/// At most one run per feed is in flight; a second request for a busy feed
/// fails with `SyncInProgress` instead of queuing.
#[derive(Clone)]
pub struct SyncWorker {
    fetcher: Arc<dyn FeedFetcher>,
    mirror: Arc<dyn Mirror>,
    locks: FeedLocks,
}

impl SyncWorker {
    pub fn new(fetcher: Arc<dyn FeedFetcher>, mirror: Arc<dyn Mirror>) -> Self {
        Self::with_locks(fetcher, mirror, FeedLocks::new())
    }

    pub fn with_locks(
        fetcher: Arc<dyn FeedFetcher>,
        mirror: Arc<dyn Mirror>,
        locks: FeedLocks,
    ) -> Self {
        SyncWorker {
            fetcher,
            mirror,
            locks,
        }
    }

    pub fn locks(&self) -> &FeedLocks {
        &self.locks
    }

    pub fn mirror(&self) -> &Arc<dyn Mirror> {
        &self.mirror
    }

    pub async fn run(
        &self,
        feed: &FeedConfig,
        mode: SyncMode,
        reference: NaiveDate,
    ) -> FeedMirrorResult<SyncReport> {
        let guard = self
            .locks
            .try_acquire(&feed.id)
            .ok_or_else(|| FeedMirrorError::SyncInProgress(feed.id.clone()))?;
        self.run_locked(&guard, feed, mode, reference).await
    }

    /// Run while already holding the feed's lock, for callers that need
    /// several runs (retries, a follow-up resync) without letting another
    /// run slip in between.
    pub async fn run_locked(
        &self,
        guard: &FeedGuard,
        feed: &FeedConfig,
        mode: SyncMode,
        reference: NaiveDate,
    ) -> FeedMirrorResult<SyncReport> {
        if guard.feed_id() != feed.id {
            return Err(FeedMirrorError::SyncInProgress(feed.id.clone()));
        }

        let started_at = Utc::now();
        tracing::info!(feed = %feed.id, %mode, "sync started");

        // Fetch and parse before touching the mirror, so a transport or
        // config failure never clears anything.
        let snapshot = FeedSnapshot::load(self.fetcher.as_ref(), feed, reference).await?;

        let synthetic = snapshot.synthetic_count();
        if synthetic > 0 {
            tracing::warn!(
                feed = %feed.id,
                count = synthetic,
                "feed has events without UID; their generated ids are not stable across runs"
            );
        }
        if snapshot.truncated {
            tracing::warn!(
                feed = %feed.id,
                cap = feed.max_events,
                in_window = snapshot.in_window,
                "event cap reached, mirror will be incomplete"
            );
        }

        let (cleared, upserted) = match mode {
            SyncMode::Incremental => (0, self.upsert_all(feed, &snapshot).await?),
            SyncMode::ForcedResync => self.clear_and_rebuild(feed, &snapshot).await?,
        };

        let report = SyncReport {
            feed_id: feed.id.clone(),
            mode,
            fetched_bytes: snapshot.fetched_bytes,
            parsed: snapshot.stats.accepted,
            in_window: snapshot.in_window,
            upserted,
            cleared,
            dropped: snapshot.stats.dropped,
            synthetic,
            truncated: snapshot.truncated,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            feed = %feed.id,
            %mode,
            upserted = report.upserted,
            cleared = report.cleared,
            dropped = report.dropped,
            "sync finished"
        );
        Ok(report)
    }

    async fn upsert_all(
        &self,
        feed: &FeedConfig,
        snapshot: &FeedSnapshot,
    ) -> FeedMirrorResult<usize> {
        let synced_at = Utc::now();
        let mut upserted = 0;
        for event in &snapshot.events {
            let row = MirroredEvent::from_external(&feed.id, event, &snapshot.policy, synced_at);
            self.mirror.upsert(&row).await?;
            upserted += 1;
        }
        Ok(upserted)
    }

    async fn clear_and_rebuild(
        &self,
        feed: &FeedConfig,
        snapshot: &FeedSnapshot,
    ) -> FeedMirrorResult<(usize, usize)> {
        let scope = feed.scope();
        self.mirror.set_resync_pending(&scope, true).await?;

        let incomplete = |cleared: usize, restored: usize, e: FeedMirrorError| {
            tracing::error!(
                feed = %feed.id,
                cleared,
                restored,
                error = %e,
                "forced resync interrupted"
            );
            FeedMirrorError::ResyncIncomplete {
                feed_id: feed.id.clone(),
                cleared,
                restored,
                message: e.to_string(),
            }
        };

        let cleared = self
            .mirror
            .clear(&scope)
            .await
            .map_err(|e| incomplete(0, 0, e))?;
        tracing::debug!(feed = %feed.id, cleared, "mirror cleared");

        let synced_at = Utc::now();
        let mut restored = 0;
        for event in &snapshot.events {
            let row = MirroredEvent::from_external(&feed.id, event, &snapshot.policy, synced_at);
            self.mirror
                .upsert(&row)
                .await
                .map_err(|e| incomplete(cleared, restored, e))?;
            restored += 1;
        }

        if let Err(e) = self.mirror.set_resync_pending(&scope, false).await {
            // Rows are complete; a leftover marker only causes another resync
            tracing::warn!(feed = %feed.id, error = %e, "could not clear resync marker");
        }
        Ok((cleared, restored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_range::DateWindow;
    use crate::fetch::{StaticFetcher, StaticResponse};
    use crate::mirror::{FeedScope, MemoryMirror};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const URL: &str = "https://example.com/team.ics";

    fn feed_text(uids: &[&str]) -> String {
        let mut text = String::from("BEGIN:VCALENDAR\r\n");
        for (i, uid) in uids.iter().enumerate() {
            text.push_str(&format!(
                "BEGIN:VEVENT\r\nUID:{uid}\r\nSUMMARY:Event {i}\r\n\
DTSTART:2025030{}T090000Z\r\nEND:VEVENT\r\n",
                i + 1
            ));
        }
        text.push_str("END:VCALENDAR\r\n");
        text
    }

    fn feed() -> FeedConfig {
        FeedConfig::new("team", URL).with_window(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
    }

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    /// Mirror that starts failing upserts after a number of successes.
    struct FlakyMirror {
        inner: MemoryMirror,
        upserts_left: AtomicUsize,
    }

    #[async_trait]
    impl Mirror for FlakyMirror {
        async fn upsert(&self, event: &MirroredEvent) -> FeedMirrorResult<()> {
            let left = self.upserts_left.load(Ordering::SeqCst);
            if left == 0 {
                return Err(FeedMirrorError::Storage("disk full".into()));
            }
            self.upserts_left.store(left - 1, Ordering::SeqCst);
            self.inner.upsert(event).await
        }
        async fn clear(&self, scope: &FeedScope) -> FeedMirrorResult<usize> {
            self.inner.clear(scope).await
        }
        async fn query_range(
            &self,
            scope: &FeedScope,
            window: &DateWindow,
        ) -> FeedMirrorResult<Vec<MirroredEvent>> {
            self.inner.query_range(scope, window).await
        }
        async fn count(&self, scope: &FeedScope) -> FeedMirrorResult<usize> {
            self.inner.count(scope).await
        }
        async fn set_resync_pending(&self, scope: &FeedScope, pending: bool) -> FeedMirrorResult<()> {
            self.inner.set_resync_pending(scope, pending).await
        }
        async fn resync_pending(&self, scope: &FeedScope) -> FeedMirrorResult<bool> {
            self.inner.resync_pending(scope).await
        }
    }

    #[tokio::test]
    async fn test_incremental_upserts_every_event() {
        let fetcher = Arc::new(StaticFetcher::with_body(URL, feed_text(&["a", "b"])));
        let mirror = Arc::new(MemoryMirror::new());
        let worker = SyncWorker::new(fetcher, mirror.clone());

        let report = worker.run(&feed(), SyncMode::Incremental, reference()).await.unwrap();

        assert_eq!(report.upserted, 2);
        assert_eq!(report.cleared, 0);
        assert_eq!(mirror.count(&feed().scope()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_forced_resync_removes_stale_rows() {
        let fetcher = Arc::new(StaticFetcher::with_body(URL, feed_text(&["a", "x"])));
        let mirror = Arc::new(MemoryMirror::new());
        let worker = SyncWorker::new(fetcher.clone(), mirror.clone());
        worker.run(&feed(), SyncMode::Incremental, reference()).await.unwrap();

        fetcher.set_body(URL, feed_text(&["a"]));
        let report = worker.run(&feed(), SyncMode::ForcedResync, reference()).await.unwrap();

        assert_eq!(report.cleared, 2);
        assert_eq!(report.upserted, 1);
        let rows = mirror.rows(&feed().scope()).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].external_uid, "a");
        assert!(!mirror.resync_pending(&feed().scope()).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_failure_never_clears() {
        let fetcher = Arc::new(StaticFetcher::with_body(URL, feed_text(&["a"])));
        let mirror = Arc::new(MemoryMirror::new());
        let worker = SyncWorker::new(fetcher.clone(), mirror.clone());
        worker.run(&feed(), SyncMode::Incremental, reference()).await.unwrap();

        fetcher.set_response(URL, StaticResponse::Timeout);
        let err = worker
            .run(&feed(), SyncMode::ForcedResync, reference())
            .await
            .unwrap_err();

        assert!(matches!(err, FeedMirrorError::FetchTimeout { .. }));
        assert_eq!(mirror.count(&feed().scope()).await.unwrap(), 1);
        assert!(!mirror.resync_pending(&feed().scope()).await.unwrap());
    }

    #[tokio::test]
    async fn test_storage_failure_after_clear_is_resync_incomplete() {
        let fetcher = Arc::new(StaticFetcher::with_body(URL, feed_text(&["a", "b", "c"])));
        let mirror = Arc::new(FlakyMirror {
            inner: MemoryMirror::new(),
            upserts_left: AtomicUsize::new(4),
        });
        let worker = SyncWorker::new(fetcher, mirror.clone());
        worker.run(&feed(), SyncMode::Incremental, reference()).await.unwrap();

        let err = worker
            .run(&feed(), SyncMode::ForcedResync, reference())
            .await
            .unwrap_err();

        match err {
            FeedMirrorError::ResyncIncomplete {
                cleared, restored, ..
            } => {
                assert_eq!(cleared, 3);
                assert_eq!(restored, 1);
            }
            other => panic!("expected ResyncIncomplete, got {other:?}"),
        }
        assert!(mirror.resync_pending(&feed().scope()).await.unwrap());
    }

    #[tokio::test]
    async fn test_busy_feed_is_rejected() {
        let fetcher = Arc::new(StaticFetcher::with_body(URL, feed_text(&["a"])));
        let worker = SyncWorker::new(fetcher, Arc::new(MemoryMirror::new()));
        let _guard = worker.locks().try_acquire("team").unwrap();

        let err = worker
            .run(&feed(), SyncMode::Incremental, reference())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedMirrorError::SyncInProgress(_)));
    }
}
