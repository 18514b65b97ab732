//! Periodic refresh, drift detection and on-demand runs.
//!
//! The scheduler owns everything that spans runs: the per-feed locks and
//! states, the retry policy and the run log. Each feed with a
//! `refresh_interval` gets its own task; feeds without one only run when
//! asked to.

mod run_log;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{FeedConfig, FeedMirrorConfig};
use crate::constants::RUN_LOG_CAPACITY;
use crate::diff::{DiffEngine, ValidationResult};
use crate::error::{FeedMirrorError, FeedMirrorResult};
use crate::fetch::FeedFetcher;
use crate::mirror::Mirror;
use crate::sync::{FeedGuard, FeedState, FeedStates, SyncMode, SyncReport, SyncWorker};

pub use run_log::{RunLog, RunOutcome, RunRecord, RunTrigger, ValidationSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// Point-in-time view of one feed, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub feed_id: String,
    pub url: String,
    pub state: FeedState,
    /// Refresh interval in seconds; `None` for on-demand feeds.
    pub refresh_interval_secs: Option<u64>,
    pub last_run: Option<RunRecord>,
    pub last_validation: Option<ValidationSummary>,
}

pub struct Scheduler {
    feeds: Vec<FeedConfig>,
    worker: SyncWorker,
    engine: DiffEngine,
    states: FeedStates,
    log: RunLog,
    retry: RetryPolicy,
    /// Fixed reference date; `None` means today in each feed's zone.
    reference_date: Option<NaiveDate>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        config: &FeedMirrorConfig,
        fetcher: Arc<dyn FeedFetcher>,
        mirror: Arc<dyn Mirror>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Scheduler {
            feeds: config.feeds.clone(),
            worker: SyncWorker::new(fetcher.clone(), mirror.clone()),
            engine: DiffEngine::new(fetcher, mirror).with_sample_size(config.sample_size),
            states: FeedStates::new(),
            log: RunLog::new(RUN_LOG_CAPACITY),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff: config.retry_backoff,
            },
            reference_date: None,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Pin the reference date used for relative windows.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn feeds(&self) -> &[FeedConfig] {
        &self.feeds
    }

    pub fn feed(&self, feed_id: &str) -> FeedMirrorResult<&FeedConfig> {
        self.feeds
            .iter()
            .find(|f| f.id == feed_id)
            .ok_or_else(|| FeedMirrorError::FeedNotFound(feed_id.to_string()))
    }

    pub fn state(&self, feed_id: &str) -> FeedState {
        self.states.get(feed_id)
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    fn reference_for(&self, feed: &FeedConfig) -> FeedMirrorResult<NaiveDate> {
        match self.reference_date {
            Some(date) => Ok(date),
            None => Ok(Utc::now().with_timezone(&feed.tz()?).date_naive()),
        }
    }

    /// Flag feeds whose last forced resync never finished, e.g. because the
    /// process stopped between clear and re-population.
    pub async fn restore_states(&self) -> FeedMirrorResult<()> {
        for feed in &self.feeds {
            if self.worker.mirror().resync_pending(&feed.scope()).await? {
                tracing::warn!(feed = %feed.id, "previous forced resync did not complete");
                self.states.set(
                    &feed.id,
                    FeedState::ResyncIncomplete {
                        error: "forced resync was interrupted".to_string(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Start one refresh task per feed that has a `refresh_interval`.
    pub fn spawn(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        for feed in &self.feeds {
            let Some(period) = feed.refresh_interval else {
                continue;
            };
            let scheduler = Arc::clone(self);
            let feed_id = feed.id.clone();
            let mut shutdown = self.shutdown.subscribe();

            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                tracing::info!(feed = %feed_id, every = ?period, "refresh task started");

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = scheduler.tick(&feed_id).await {
                                tracing::error!(feed = %feed_id, error = %e, "scheduled run failed");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                tracing::info!(feed = %feed_id, "refresh task stopped");
            }));
        }
    }

    /// Signal every refresh task to stop and wait for them.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }

    /// One scheduled refresh of `feed_id`.
    ///
    /// Skipped (returns `Ok(None)`) when the feed is already running. Runs a
    /// forced resync instead of an incremental sync while a previous resync
    /// is incomplete. Afterwards validates the feed if configured to, and
    /// resyncs on drift if configured to.
    pub async fn tick(&self, feed_id: &str) -> FeedMirrorResult<Option<RunRecord>> {
        let feed = self.feed(feed_id)?;
        let Some(guard) = self.worker.locks().try_acquire(feed_id) else {
            tracing::debug!(feed = %feed_id, "run already in progress, skipping tick");
            return Ok(None);
        };

        let mode = self.states.get(feed_id).next_mode();
        let report = self
            .run_with_retries(&guard, feed, mode, RunTrigger::Scheduled)
            .await?;

        if !feed.validate_after_sync {
            return Ok(self.log.last_run(feed_id));
        }

        let result = self.validate_feed(feed).await?;
        if !result.is_clean() && feed.resync_on_drift && report.mode == SyncMode::Incremental {
            tracing::warn!(
                feed = %feed_id,
                missing = result.missing_in_db,
                extra = result.extra_in_db,
                "drift detected, forcing resync"
            );
            self.run_with_retries(&guard, feed, SyncMode::ForcedResync, RunTrigger::Drift)
                .await?;
        }

        Ok(self.log.last_run(feed_id))
    }

    /// Run `feed_id` now, without retries. Fails with `SyncInProgress` if
    /// the feed is busy.
    pub async fn run_now(&self, feed_id: &str, mode: SyncMode) -> FeedMirrorResult<SyncReport> {
        let feed = self.feed(feed_id)?;
        let guard = self
            .worker
            .locks()
            .try_acquire(feed_id)
            .ok_or_else(|| FeedMirrorError::SyncInProgress(feed_id.to_string()))?;

        let reference = self.reference_for(feed)?;
        let previous = self.states.begin(feed_id, mode);
        let started_at = Utc::now();
        let result = self.worker.run_locked(&guard, feed, mode, reference).await;
        self.finish(feed_id, &previous, mode, RunTrigger::OnDemand, 1, started_at, &result);
        result
    }

    /// Validate `feed_id` against the mirror now. Read-only.
    pub async fn validate_now(&self, feed_id: &str) -> FeedMirrorResult<ValidationResult> {
        let feed = self.feed(feed_id)?;
        self.validate_feed(feed).await
    }

    pub fn status(&self) -> Vec<FeedStatus> {
        self.feeds
            .iter()
            .map(|feed| FeedStatus {
                feed_id: feed.id.clone(),
                url: feed.url.clone(),
                state: self.states.get(&feed.id),
                refresh_interval_secs: feed.refresh_interval.map(|d| d.as_secs()),
                last_run: self.log.last_run(&feed.id),
                last_validation: self.log.last_validation(&feed.id),
            })
            .collect()
    }

    async fn validate_feed(&self, feed: &FeedConfig) -> FeedMirrorResult<ValidationResult> {
        let reference = self.reference_for(feed)?;
        let result = self.engine.validate(feed, reference).await?;
        self.log
            .record_validation(&feed.id, ValidationSummary::new(&result, Utc::now()));
        Ok(result)
    }

    async fn run_with_retries(
        &self,
        guard: &FeedGuard,
        feed: &FeedConfig,
        mode: SyncMode,
        trigger: RunTrigger,
    ) -> FeedMirrorResult<SyncReport> {
        let reference = self.reference_for(feed)?;
        let mut previous = self.states.begin(&feed.id, mode);
        let started_at = Utc::now();

        let mut mode = mode;
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self.worker.run_locked(guard, feed, mode, reference).await {
                Err(e) if e.is_retryable() && attempt <= self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        feed = %feed.id,
                        attempt,
                        error = %e,
                        retry_in = ?delay,
                        "run failed, retrying"
                    );
                    // Once rows may have been cleared, only a full rebuild is
                    // safe, and a later failure of another kind must not
                    // hide the partial mirror
                    if matches!(e, FeedMirrorError::ResyncIncomplete { .. }) {
                        mode = SyncMode::ForcedResync;
                        previous = FeedState::ResyncIncomplete {
                            error: e.to_string(),
                        };
                    }
                    tokio::time::sleep(delay).await;
                }
                result => break result,
            }
        };

        self.finish(&feed.id, &previous, mode, trigger, attempt, started_at, &result);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        feed_id: &str,
        previous: &FeedState,
        mode: SyncMode,
        trigger: RunTrigger,
        attempts: u32,
        started_at: DateTime<Utc>,
        result: &FeedMirrorResult<SyncReport>,
    ) {
        let outcome = result.as_ref().map(|_| ());
        let state = self.states.finish(feed_id, previous, mode, outcome);

        let record = match result {
            Ok(report) => RunRecord::from_report(report, trigger, attempts),
            Err(e) => {
                tracing::error!(feed = %feed_id, %mode, error = %e, state = state.label(), "run failed");
                RunRecord {
                    feed_id: feed_id.to_string(),
                    mode,
                    trigger,
                    attempts,
                    outcome: RunOutcome::Failed {
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                    },
                    started_at,
                    finished_at: Utc::now(),
                }
            }
        };
        self.log.record(record);
    }
}
