use anyhow::Result;
use feedmirror_core::FeedMirror;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    feedmirror: FeedMirror,
}

impl AppState {
    /// Load the config and open the mirror once; feed changes need a restart.
    pub fn load() -> Result<Self> {
        Ok(Self::new(FeedMirror::load()?))
    }

    pub fn new(feedmirror: FeedMirror) -> Self {
        AppState { feedmirror }
    }

    pub fn feedmirror(&self) -> &FeedMirror {
        &self.feedmirror
    }
}
