//! Choosing evaluator for an object

use crate::{
    evaluator::{self, ConditionTable, GenericEvaluator, StatusEvaluator},
    event::ResourceStatus,
    object::{GroupKind, ObjectIdentifier},
    snapshot::Snapshot,
    status::Status,
};
use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        batch::v1::Job,
        core::v1::{PersistentVolumeClaim, Pod, Service},
        policy::v1::PodDisruptionBudget,
    },
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
use std::{collections::HashMap, sync::Arc};

/// Collects evaluators before the registry is frozen
pub struct RegistryBuilder {
    evaluators: HashMap<GroupKind, Arc<dyn StatusEvaluator>>,
    generic: Arc<dyn StatusEvaluator>,
}

impl RegistryBuilder {
    /// Builder without any kind-specific evaluators
    pub fn empty() -> Self {
        RegistryBuilder {
            evaluators: HashMap::new(),
            generic: Arc::new(GenericEvaluator::default()),
        }
    }

    /// Builder with evaluators for built-in workload kinds
    pub fn with_defaults() -> Self {
        RegistryBuilder::empty()
            .register(GroupKind::of::<Deployment>(), evaluator::deployment)
            .register(GroupKind::of::<StatefulSet>(), evaluator::stateful_set)
            .register(GroupKind::of::<DaemonSet>(), evaluator::daemon_set)
            .register(GroupKind::of::<ReplicaSet>(), evaluator::replica_set)
            .register(GroupKind::of::<Pod>(), evaluator::pod)
            .register(
                GroupKind::of::<PersistentVolumeClaim>(),
                evaluator::persistent_volume_claim,
            )
            .register(GroupKind::of::<Service>(), evaluator::service)
            .register(GroupKind::of::<Job>(), evaluator::job)
            .register(
                GroupKind::of::<CustomResourceDefinition>(),
                evaluator::custom_resource_definition,
            )
            .register(
                GroupKind::of::<PodDisruptionBudget>(),
                evaluator::pod_disruption_budget,
            )
    }

    /// Registers evaluator for a kind, replacing previous one
    pub fn register<E: StatusEvaluator + 'static>(mut self, kind: GroupKind, evaluator: E) -> Self {
        self.evaluators.insert(kind, Arc::new(evaluator));
        self
    }

    /// Replaces fallback evaluator
    pub fn generic<E: StatusEvaluator + 'static>(mut self, evaluator: E) -> Self {
        self.generic = Arc::new(evaluator);
        self
    }

    /// Shorthand for a generic evaluator with custom condition table
    pub fn conditions(self, table: ConditionTable) -> Self {
        self.generic(GenericEvaluator::new(table))
    }

    pub fn build(self) -> EvaluatorRegistry {
        EvaluatorRegistry {
            evaluators: self.evaluators,
            generic: self.generic,
        }
    }
}

/// Immutable mapping from kinds to evaluators.
pub struct EvaluatorRegistry {
    evaluators: HashMap<GroupKind, Arc<dyn StatusEvaluator>>,
    generic: Arc<dyn StatusEvaluator>,
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        RegistryBuilder::with_defaults().build()
    }
}

impl EvaluatorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::with_defaults()
    }

    pub fn is_registered(&self, kind: &GroupKind) -> bool {
        self.evaluators.contains_key(kind)
    }

    /// Returns evaluator for the kind, or the generic one
    pub fn dispatch(&self, kind: &GroupKind) -> &dyn StatusEvaluator {
        match self.evaluators.get(kind) {
            Some(e) => e.as_ref(),
            None => self.generic.as_ref(),
        }
    }

    /// Computes status of an object. `None` means the object does not exist.
    pub fn classify(
        &self,
        identifier: &ObjectIdentifier,
        object: Option<Snapshot>,
    ) -> ResourceStatus {
        let object = match object {
            Some(o) => o,
            None => return ResourceStatus::not_found(identifier.clone()),
        };
        let evaluator = self.dispatch(&identifier.group_kind());
        match evaluator.evaluate(&object) {
            Ok(res) => ResourceStatus {
                identifier: identifier.clone(),
                status: res.status,
                message: res.message,
                resource: Some(Arc::new(object)),
                error: None,
            },
            Err(err) => {
                tracing::debug!(identifier = %identifier, "Status evaluation failed: {:#}", err);
                ResourceStatus {
                    identifier: identifier.clone(),
                    status: Status::Unknown,
                    message: format!("failed to compute status: {:#}", err),
                    resource: Some(Arc::new(object)),
                    error: Some(Arc::new(err)),
                }
            }
        }
    }
}
