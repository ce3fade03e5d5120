//! Reducing many statuses to one

use crate::status::Status;
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateStatus {
    /// Most severe status among all objects
    pub status: Status,
    /// Number of objects with each status; every status is present
    pub counts: BTreeMap<Status, usize>,
}

impl AggregateStatus {
    pub fn count(&self, status: Status) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Aggregates statuses. Order of input does not matter,
/// empty input is `Current`.
pub fn aggregate<I>(statuses: I) -> AggregateStatus
where
    I: IntoIterator<Item = Status>,
{
    let mut counts = Status::iter().map(|s| (s, 0)).collect::<BTreeMap<_, _>>();
    let mut worst = Status::Current;
    for status in statuses {
        *counts.entry(status).or_default() += 1;
        worst = worst.max(status);
    }
    AggregateStatus {
        status: worst,
        counts,
    }
}
