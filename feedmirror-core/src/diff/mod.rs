//! Drift detection between a feed and its mirror.

mod compare;
mod engine;
mod recommendation;
mod validation;

pub use compare::{UidComparison, compare_uids};
pub use engine::DiffEngine;
pub use recommendation::{Recommendation, relative_discrepancy};
pub use validation::{SampleComparison, SampleEvent, ValidationResult};
