//! Per-feed mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per feed id, created on first use.
///
/// Runs for the same feed exclude each other; runs for different feeds
/// never contend.
#[derive(Clone, Default)]
pub struct FeedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Held for the duration of one run.
pub struct FeedGuard {
    feed_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl FeedGuard {
    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }
}

impl FeedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, feed_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(feed_id.to_string())
            .or_default()
            .clone()
    }

    /// Take the lock if nobody holds it.
    pub fn try_acquire(&self, feed_id: &str) -> Option<FeedGuard> {
        let guard = self.lock_for(feed_id).try_lock_owned().ok()?;
        Some(FeedGuard {
            feed_id: feed_id.to_string(),
            _guard: guard,
        })
    }

    /// Wait for the lock.
    pub async fn acquire(&self, feed_id: &str) -> FeedGuard {
        let guard = self.lock_for(feed_id).lock_owned().await;
        FeedGuard {
            feed_id: feed_id.to_string(),
            _guard: guard,
        }
    }

    pub fn is_busy(&self, feed_id: &str) -> bool {
        self.lock_for(feed_id).try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_feed_is_exclusive() {
        let locks = FeedLocks::new();
        let guard = locks.try_acquire("team").unwrap();
        assert_eq!(guard.feed_id(), "team");
        assert!(locks.try_acquire("team").is_none());
        assert!(locks.is_busy("team"));

        drop(guard);
        assert!(locks.try_acquire("team").is_some());
    }

    #[test]
    fn test_different_feeds_do_not_contend() {
        let locks = FeedLocks::new();
        let _team = locks.try_acquire("team").unwrap();
        assert!(locks.try_acquire("holidays").is_some());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let locks = FeedLocks::new();
        let guard = locks.try_acquire("team").unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("team").await.feed_id().to_string() })
        };
        tokio::task::yield_now().await;
        drop(guard);

        assert_eq!(waiter.await.unwrap(), "team");
    }
}
