//! Last known status of every tracked object

use crate::{
    aggregator::{aggregate, AggregateStatus},
    event::ResourceStatus,
    object::ObjectIdentifier,
    status::Status,
};
use std::collections::BTreeMap;

/// Objects watched by one poller run, with their last known status.
///
/// Objects which were not observed yet have `Unknown` status.
#[derive(Debug)]
pub struct TrackedSet {
    entries: BTreeMap<ObjectIdentifier, Option<ResourceStatus>>,
}

impl TrackedSet {
    pub(crate) fn new<I: IntoIterator<Item = ObjectIdentifier>>(identifiers: I) -> Self {
        TrackedSet {
            entries: identifiers.into_iter().map(|id| (id, None)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers in stable order
    pub fn identifiers(&self) -> impl Iterator<Item = &ObjectIdentifier> {
        self.entries.keys()
    }

    pub fn get(&self, id: &ObjectIdentifier) -> Option<&ResourceStatus> {
        self.entries.get(id)?.as_ref()
    }

    pub fn status(&self, id: &ObjectIdentifier) -> Option<Status> {
        self.entries
            .get(id)
            .map(|e| e.as_ref().map_or(Status::Unknown, |rs| rs.status))
    }

    pub fn statuses(&self) -> impl Iterator<Item = (&ObjectIdentifier, Status)> {
        self.entries
            .iter()
            .map(|(id, e)| (id, e.as_ref().map_or(Status::Unknown, |rs| rs.status)))
    }

    pub fn is_fully_observed(&self) -> bool {
        self.entries.values().all(Option::is_some)
    }

    pub fn aggregate(&self) -> AggregateStatus {
        aggregate(self.statuses().map(|(_, s)| s))
    }

    /// Records new status. Returns false if it reports nothing new.
    /// Statuses of untracked objects are ignored.
    pub(crate) fn update(&mut self, status: ResourceStatus) -> bool {
        let entry = match self.entries.get_mut(&status.identifier) {
            Some(e) => e,
            None => return false,
        };
        let changed = match entry {
            Some(prev) => prev.differs(&status),
            None => true,
        };
        // keep the latest object even if status did not change
        *entry = Some(status);
        changed
    }
}
