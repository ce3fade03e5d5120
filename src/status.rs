use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Computed status of one object.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum Status {
    /// Object is fully reconciled
    Current,
    /// Object is being reconciled and nothing is wrong so far
    InProgress,
    /// Object is being deleted
    Terminating,
    /// Reconciliation failed
    Failed,
    /// Object does not exist
    NotFound,
    /// Status could not be computed
    Unknown,
}

impl Status {
    /// Position in aggregation precedence, bigger is more severe.
    pub fn severity(self) -> u8 {
        match self {
            Status::Current => 0,
            Status::NotFound => 1,
            Status::Terminating => 2,
            Status::InProgress => 3,
            Status::Unknown => 4,
            Status::Failed => 5,
        }
    }
}

/// Orders statuses by severity, so `max` picks the most severe one.
impl Ord for Status {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity().cmp(&other.severity())
    }
}

impl PartialOrd for Status {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of a status evaluator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusResult {
    pub status: Status,
    pub message: String,
}

impl StatusResult {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        StatusResult {
            status,
            message: message.into(),
        }
    }

    pub fn current(message: impl Into<String>) -> Self {
        StatusResult::new(Status::Current, message)
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        StatusResult::new(Status::InProgress, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        StatusResult::new(Status::Failed, message)
    }

    pub fn terminating(message: impl Into<String>) -> Self {
        StatusResult::new(Status::Terminating, message)
    }
}
