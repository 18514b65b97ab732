//! Entry point tying config, mirror, fetcher and scheduler together.

use std::sync::Arc;

use crate::config::{FeedConfig, FeedMirrorConfig};
use crate::diff::ValidationResult;
use crate::error::FeedMirrorResult;
use crate::fetch::{FeedFetcher, HttpFetcher};
use crate::mirror::{DirMirror, Mirror};
use crate::scheduler::{FeedStatus, Scheduler};
use crate::sync::{SyncMode, SyncReport};

#[derive(Clone)]
pub struct FeedMirror {
    config: FeedMirrorConfig,
    mirror: Arc<dyn Mirror>,
    scheduler: Arc<Scheduler>,
}

impl FeedMirror {
    /// Load ~/.config/feedmirror/config.toml and open the mirror directory.
    pub fn load() -> FeedMirrorResult<Self> {
        Self::from_config(FeedMirrorConfig::load()?)
    }

    /// Directory-backed mirror and HTTP fetcher, as configured.
    pub fn from_config(config: FeedMirrorConfig) -> FeedMirrorResult<Self> {
        let mirror = Arc::new(DirMirror::new(config.mirror_path()));
        let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
        Ok(Self::with_parts(config, fetcher, mirror))
    }

    pub fn with_parts(
        config: FeedMirrorConfig,
        fetcher: Arc<dyn FeedFetcher>,
        mirror: Arc<dyn Mirror>,
    ) -> Self {
        let scheduler = Arc::new(Scheduler::new(&config, fetcher, mirror.clone()));
        FeedMirror {
            config,
            mirror,
            scheduler,
        }
    }

    pub fn config(&self) -> &FeedMirrorConfig {
        &self.config
    }

    pub fn feeds(&self) -> &[FeedConfig] {
        &self.config.feeds
    }

    pub fn mirror(&self) -> &Arc<dyn Mirror> {
        &self.mirror
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub async fn sync(&self, feed_id: &str, mode: SyncMode) -> FeedMirrorResult<SyncReport> {
        self.scheduler.run_now(feed_id, mode).await
    }

    pub async fn validate(&self, feed_id: &str) -> FeedMirrorResult<ValidationResult> {
        self.scheduler.validate_now(feed_id).await
    }

    pub fn status(&self) -> Vec<FeedStatus> {
        self.scheduler.status()
    }
}
