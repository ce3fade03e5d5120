//! Computing status of individual objects.
//!
//! Each evaluator looks at one fetched object and classifies it. Absence of
//! an object is handled by the registry, so evaluators only see objects that
//! exist.

mod conditions;
mod crd;
mod generic;
mod job;
mod pdb;
mod pod;
mod pvc;
mod service;
mod workloads;

pub use self::conditions::{ConditionRule, ConditionTable};
pub use self::generic::{check_common, GenericEvaluator};
pub use self::{
    crd::custom_resource_definition,
    job::job,
    pdb::pod_disruption_budget,
    pod::pod,
    pvc::persistent_volume_claim,
    service::service,
    workloads::{daemon_set, deployment, replica_set, stateful_set},
};

use crate::{snapshot::Snapshot, status::StatusResult};

/// Classifies an existing object.
///
/// Must be a pure function of its input. An error is reported as
/// `Unknown` status of the object.
pub trait StatusEvaluator: Send + Sync {
    fn evaluate(&self, object: &Snapshot) -> anyhow::Result<StatusResult>;
}

impl<F> StatusEvaluator for F
where
    F: Fn(&Snapshot) -> anyhow::Result<StatusResult> + Send + Sync,
{
    fn evaluate(&self, object: &Snapshot) -> anyhow::Result<StatusResult> {
        self(object)
    }
}

/// `.spec.replicas`, defaulting to 1 like the API server does
fn desired_replicas(object: &Snapshot) -> anyhow::Result<i64> {
    Ok(object.try_i64(&["spec", "replicas"])?.unwrap_or(1))
}

/// Counter in `.status`; controllers omit zero counters
fn status_count(object: &Snapshot, field: &str) -> anyhow::Result<i64> {
    Ok(object.try_i64(&["status", field])?.unwrap_or(0))
}
