//! Events produced by the status poller

use crate::{
    aggregator::AggregateStatus, object::ObjectIdentifier, snapshot::Snapshot, status::Status,
};
use std::{fmt, sync::Arc};

/// Status of one object as of some poll cycle.
#[derive(Clone, Debug)]
pub struct ResourceStatus {
    pub identifier: ObjectIdentifier,
    pub status: Status,
    pub message: String,
    /// Object the status was computed from
    pub resource: Option<Arc<Snapshot>>,
    /// Error which prevented computing the status
    pub error: Option<Arc<anyhow::Error>>,
}

impl ResourceStatus {
    pub fn not_found(identifier: ObjectIdentifier) -> Self {
        ResourceStatus {
            identifier,
            status: Status::NotFound,
            message: "Resource not found".to_string(),
            resource: None,
            error: None,
        }
    }

    /// Lookup of the object failed, so its status is unknown for now
    pub fn lookup_failed(identifier: ObjectIdentifier, error: anyhow::Error) -> Self {
        ResourceStatus {
            identifier,
            status: Status::Unknown,
            message: format!("{:#}", error),
            resource: None,
            error: Some(Arc::new(error)),
        }
    }

    /// Returns true if `other` reports something new compared to `self`
    pub fn differs(&self, other: &ResourceStatus) -> bool {
        self.status != other.status || self.message != other.message
    }
}

/// How a poller run ended.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Stop condition was satisfied
    Completed,
    /// Run was cancelled by the caller
    Cancelled,
    /// Deadline passed before stop condition was satisfied
    DeadlineExceeded,
    /// Cluster could not be read for too many cycles in a row
    Failed(Arc<anyhow::Error>),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => f.write_str("completed"),
            Outcome::Cancelled => f.write_str("cancelled"),
            Outcome::DeadlineExceeded => f.write_str("deadline exceeded"),
            Outcome::Failed(err) => write!(f, "failed: {:#}", err),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Event {
    /// Status of an object changed (or was computed for the first time)
    ResourceUpdate { cycle: u64, status: ResourceStatus },
    /// Overall status after a cycle
    Aggregate {
        cycle: u64,
        aggregate: AggregateStatus,
    },
    /// A cycle failed as a whole; it will be retried
    Error {
        cycle: u64,
        error: Arc<anyhow::Error>,
        consecutive_failures: u32,
    },
    /// Always the last event
    Finished(Outcome),
}

impl Event {
    pub fn cycle(&self) -> Option<u64> {
        match self {
            Event::ResourceUpdate { cycle, .. }
            | Event::Aggregate { cycle, .. }
            | Event::Error { cycle, .. } => Some(*cycle),
            Event::Finished(_) => None,
        }
    }
}
