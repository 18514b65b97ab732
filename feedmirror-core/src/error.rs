//! Error types for feedmirror.

use thiserror::Error;

/// Errors that can occur while fetching, mirroring or validating a feed.
///
/// A malformed calendar object inside an otherwise readable feed is not an
/// error: the parser drops it and counts it in `ParseStats::dropped`.
#[derive(Error, Debug)]
pub enum FeedMirrorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed not found: {0}")]
    FeedNotFound(String),

    #[error("Failed to fetch {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Fetching {url} timed out after {secs}s")]
    FetchTimeout { url: String, secs: u64 },

    #[error("Feed {url} responded with HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("A sync is already running for feed '{0}'")]
    SyncInProgress(String),

    #[error(
        "Resync of feed '{feed_id}' is incomplete ({cleared} rows cleared, {restored} restored): {message}"
    )]
    ResyncIncomplete {
        feed_id: String,
        cleared: usize,
        restored: usize,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FeedMirrorError {
    /// Whether the scheduler may retry the run that produced this error.
    ///
    /// An incomplete resync is retryable, but only from the clear step, which
    /// the scheduler guarantees by re-running it as a forced resync.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedMirrorError::Transport { .. }
            | FeedMirrorError::FetchTimeout { .. }
            | FeedMirrorError::Storage(_)
            | FeedMirrorError::ResyncIncomplete { .. } => true,
            FeedMirrorError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            FeedMirrorError::Config(_)
            | FeedMirrorError::FeedNotFound(_)
            | FeedMirrorError::SyncInProgress(_)
            | FeedMirrorError::Serialization(_) => false,
        }
    }

    /// Stable label used in API responses and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedMirrorError::Config(_) => "config",
            FeedMirrorError::FeedNotFound(_) => "feed_not_found",
            FeedMirrorError::Transport { .. } => "transport",
            FeedMirrorError::FetchTimeout { .. } => "fetch_timeout",
            FeedMirrorError::HttpStatus { .. } => "http_status",
            FeedMirrorError::Storage(_) => "storage",
            FeedMirrorError::SyncInProgress(_) => "sync_in_progress",
            FeedMirrorError::ResyncIncomplete { .. } => "resync_incomplete",
            FeedMirrorError::Serialization(_) => "serialization",
        }
    }

    /// True for failures reaching the feed endpoint.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FeedMirrorError::Transport { .. }
                | FeedMirrorError::FetchTimeout { .. }
                | FeedMirrorError::HttpStatus { .. }
        )
    }
}

/// Result type alias for feedmirror operations.
pub type FeedMirrorResult<T> = Result<T, FeedMirrorError>;
