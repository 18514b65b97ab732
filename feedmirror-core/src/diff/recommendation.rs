use std::fmt;

use serde::Serialize;

use crate::constants::DISCREPANCY_THRESHOLD;

/// Follow-up suggested by a validation pass.
///
/// Rules are evaluated independently; every one that applies is reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// The feed has events the mirror lacks.
    FullResync { missing: usize },
    /// The mirror has events the feed no longer lists.
    InvestigateStale { extra: usize },
    /// The feed hit its event cap, so completeness cannot be shown.
    RaiseCap { cap: usize },
    /// Total counts differ by more than the discrepancy threshold.
    ManualInvestigation { external: usize, mirror: usize },
}

impl Recommendation {
    /// Apply the four rules to one comparison.
    pub fn evaluate(
        external_count: usize,
        mirror_count: usize,
        missing: usize,
        extra: usize,
        cap: usize,
    ) -> Vec<Recommendation> {
        let mut out = Vec::new();
        if missing > 0 {
            out.push(Recommendation::FullResync { missing });
        }
        if extra > 0 {
            out.push(Recommendation::InvestigateStale { extra });
        }
        if external_count >= cap {
            out.push(Recommendation::RaiseCap { cap });
        }
        if relative_discrepancy(external_count, mirror_count) > DISCREPANCY_THRESHOLD {
            out.push(Recommendation::ManualInvestigation {
                external: external_count,
                mirror: mirror_count,
            });
        }
        out
    }
}

/// `|external - mirror| / max(external, 1)`
pub fn relative_discrepancy(external: usize, mirror: usize) -> f64 {
    external.abs_diff(mirror) as f64 / external.max(1) as f64
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::FullResync { missing } => write!(
                f,
                "{missing} feed event(s) are missing from the mirror; run a full resync"
            ),
            Recommendation::InvestigateStale { extra } => write!(
                f,
                "{extra} mirrored event(s) are no longer in the feed; they may have been removed upstream"
            ),
            Recommendation::RaiseCap { cap } => write!(
                f,
                "The feed reached its event cap of {cap}; raise max_events to confirm the mirror is complete"
            ),
            Recommendation::ManualInvestigation { external, mirror } => write!(
                f,
                "Feed has {external} event(s) but the mirror has {mirror}; investigate manually"
            ),
        }
    }
}
