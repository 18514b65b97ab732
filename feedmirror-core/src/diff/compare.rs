//! Set comparison by UID.

use std::collections::HashSet;

/// Outcome of comparing the feed's UIDs against the mirror's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidComparison {
    /// In the feed but not in the mirror, in feed order.
    pub missing: Vec<String>,
    /// In the mirror but not in the feed, in mirror order.
    pub extra: Vec<String>,
    pub matched: usize,
}

impl UidComparison {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Compare two UID sequences as sets.
///
/// Repeated UIDs on either side count once. Swapping the arguments swaps
/// `missing` and `extra` and leaves `matched` unchanged.
pub fn compare_uids<'a, E, M>(external: E, mirror: M) -> UidComparison
where
    E: IntoIterator<Item = &'a str>,
    M: IntoIterator<Item = &'a str>,
{
    let external = ordered_unique(external);
    let mirror = ordered_unique(mirror);

    let external_set: HashSet<&str> = external.iter().copied().collect();
    let mirror_set: HashSet<&str> = mirror.iter().copied().collect();

    UidComparison {
        missing: external
            .iter()
            .filter(|uid| !mirror_set.contains(*uid))
            .map(|uid| uid.to_string())
            .collect(),
        extra: mirror
            .iter()
            .filter(|uid| !external_set.contains(*uid))
            .map(|uid| uid.to_string())
            .collect(),
        matched: external_set.intersection(&mirror_set).count(),
    }
}

fn ordered_unique<'a>(uids: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    uids.into_iter().filter(|uid| seen.insert(*uid)).collect()
}
