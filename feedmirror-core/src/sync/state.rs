//! Per-feed sync state machine.
//!
//! ```text
//! idle -> syncing -> idle                  (success)
//! idle -> syncing -> failed -> syncing ... (failure, retried)
//! idle -> syncing -> resync_incomplete     (forced resync broke after clearing)
//! ```
//!
//! `resync_incomplete` is sticky: only a successful forced resync clears it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::FeedMirrorError;
use crate::sync::SyncMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedState {
    Idle,
    Syncing {
        mode: SyncMode,
        since: DateTime<Utc>,
    },
    Failed {
        kind: String,
        error: String,
    },
    ResyncIncomplete {
        error: String,
    },
}

impl FeedState {
    pub fn label(&self) -> &'static str {
        match self {
            FeedState::Idle => "idle",
            FeedState::Syncing { .. } => "syncing",
            FeedState::Failed { .. } => "failed",
            FeedState::ResyncIncomplete { .. } => "resync_incomplete",
        }
    }

    /// The mode the next scheduled run should use.
    pub fn next_mode(&self) -> SyncMode {
        match self {
            FeedState::ResyncIncomplete { .. } => SyncMode::ForcedResync,
            _ => SyncMode::Incremental,
        }
    }

    /// The state after a run in `mode` ended with `outcome`, starting from
    /// `self` (the state before the run began).
    pub fn after_run(&self, mode: SyncMode, outcome: Result<(), &FeedMirrorError>) -> FeedState {
        match (outcome, self) {
            (Ok(()), FeedState::ResyncIncomplete { .. }) if mode == SyncMode::Incremental => {
                self.clone()
            }
            (Ok(()), _) => FeedState::Idle,
            (Err(FeedMirrorError::SyncInProgress(_)), _) => self.clone(),
            (Err(e), FeedState::ResyncIncomplete { .. }) => FeedState::ResyncIncomplete {
                error: e.to_string(),
            },
            (Err(e), _) if matches!(e, FeedMirrorError::ResyncIncomplete { .. }) => {
                FeedState::ResyncIncomplete {
                    error: e.to_string(),
                }
            }
            (Err(e), _) => FeedState::Failed {
                kind: e.kind().to_string(),
                error: e.to_string(),
            },
        }
    }
}

/// Shared map of feed id to current state.
#[derive(Clone, Default)]
pub struct FeedStates {
    states: Arc<RwLock<HashMap<String, FeedState>>>,
}

impl FeedStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, feed_id: &str) -> FeedState {
        self.states
            .read()
            .get(feed_id)
            .cloned()
            .unwrap_or(FeedState::Idle)
    }

    pub fn set(&self, feed_id: &str, state: FeedState) {
        self.states.write().insert(feed_id.to_string(), state);
    }

    /// Mark a run as started and return the state it started from.
    pub fn begin(&self, feed_id: &str, mode: SyncMode) -> FeedState {
        let mut states = self.states.write();
        let previous = states.get(feed_id).cloned().unwrap_or(FeedState::Idle);
        states.insert(
            feed_id.to_string(),
            FeedState::Syncing {
                mode,
                since: Utc::now(),
            },
        );
        previous
    }

    pub fn finish(
        &self,
        feed_id: &str,
        previous: &FeedState,
        mode: SyncMode,
        outcome: Result<(), &FeedMirrorError>,
    ) -> FeedState {
        let next = previous.after_run(mode, outcome);
        self.set(feed_id, next.clone());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> FeedMirrorError {
        FeedMirrorError::Transport {
            url: "https://example.com/a.ics".into(),
            message: "refused".into(),
        }
    }

    fn incomplete() -> FeedMirrorError {
        FeedMirrorError::ResyncIncomplete {
            feed_id: "team".into(),
            cleared: 3,
            restored: 1,
            message: "disk full".into(),
        }
    }

    #[test]
    fn test_success_returns_to_idle() {
        let next = FeedState::Idle.after_run(SyncMode::Incremental, Ok(()));
        assert_eq!(next, FeedState::Idle);

        let failed = FeedState::Idle.after_run(SyncMode::Incremental, Err(&transport()));
        assert_eq!(failed.label(), "failed");
        assert_eq!(failed.after_run(SyncMode::Incremental, Ok(())), FeedState::Idle);
    }

    #[test]
    fn test_incomplete_resync_is_sticky() {
        let broken = FeedState::Idle.after_run(SyncMode::ForcedResync, Err(&incomplete()));
        assert_eq!(broken.label(), "resync_incomplete");
        assert_eq!(broken.next_mode(), SyncMode::ForcedResync);

        // Incremental success does not clear the flag
        let still = broken.after_run(SyncMode::Incremental, Ok(()));
        assert_eq!(still.label(), "resync_incomplete");

        // Neither does a later transport failure
        let still = broken.after_run(SyncMode::ForcedResync, Err(&transport()));
        assert_eq!(still.label(), "resync_incomplete");

        assert_eq!(broken.after_run(SyncMode::ForcedResync, Ok(())), FeedState::Idle);
    }

    #[test]
    fn test_registry_begin_and_finish() {
        let states = FeedStates::new();
        let previous = states.begin("team", SyncMode::Incremental);
        assert_eq!(previous, FeedState::Idle);
        assert_eq!(states.get("team").label(), "syncing");

        states.finish("team", &previous, SyncMode::Incremental, Err(&transport()));
        assert_eq!(states.get("team").label(), "failed");
        assert_eq!(states.get("other"), FeedState::Idle);
    }
}
