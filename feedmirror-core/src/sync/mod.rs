//! Feed -> mirror synchronization.

mod lock;
mod state;
mod worker;

pub use lock::{FeedGuard, FeedLocks};
pub use state::{FeedState, FeedStates};
pub use worker::{SyncMode, SyncReport, SyncWorker};
