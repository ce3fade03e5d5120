//! Computing status of Kubernetes objects.
//!
//! [`StatusPoller`] periodically reads a set of objects from cluster,
//! classifies each of them with a kind-specific [`StatusEvaluator`] and
//! streams status changes until a [`StopCondition`] is satisfied.

pub mod aggregator;
pub mod errors;
pub mod evaluator;
pub mod event;
pub mod object;
pub mod policy;
pub mod poller;
pub mod reader;
pub mod registry;
pub mod snapshot;
pub mod status;

pub use crate::{
    aggregator::{aggregate, AggregateStatus},
    evaluator::{ConditionTable, StatusEvaluator},
    event::{Event, Outcome, ResourceStatus},
    object::{GroupKind, ObjectIdentifier},
    policy::{BackoffPolicy, PollInterval, StopCondition},
    poller::{EngineState, PollOptions, StatusPoller, StatusStream, TrackedSet},
    reader::{ClusterReader, KubeClusterReader, ReadError},
    registry::{EvaluatorRegistry, RegistryBuilder},
    snapshot::Snapshot,
    status::{Status, StatusResult},
};
