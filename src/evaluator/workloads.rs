//! Evaluators for replicated workloads

use crate::{
    evaluator::{check_common, desired_replicas, status_count},
    snapshot::Snapshot,
    status::StatusResult,
};

/// Common checks, plus the controller must have seen the latest spec:
/// a workload without `.status.observedGeneration` is not current yet.
fn check_workload(object: &Snapshot) -> Option<StatusResult> {
    if let Some(res) = check_common(object) {
        return Some(res);
    }
    match (object.generation(), object.observed_generation()) {
        (Some(generation), None) => Some(StatusResult::in_progress(format!(
            "{} generation {} is not observed yet",
            object.kind().unwrap_or("Resource"),
            generation
        ))),
        _ => None,
    }
}

pub fn deployment(object: &Snapshot) -> anyhow::Result<StatusResult> {
    if let Some(res) = check_workload(object) {
        return Ok(res);
    }
    let desired = desired_replicas(object)?;
    let replicas = status_count(object, "replicas")?;
    let updated = status_count(object, "updatedReplicas")?;
    let ready = status_count(object, "readyReplicas")?;
    let available = status_count(object, "availableReplicas")?;

    if let Some(progressing) = object.condition("Progressing") {
        if progressing.is_false()
            && progressing.reason.as_deref() == Some("ProgressDeadlineExceeded")
        {
            return Ok(StatusResult::failed("Progress deadline exceeded"));
        }
    }
    if let Some(failure) = object.condition("ReplicaFailure") {
        if failure.is_true() {
            return Ok(StatusResult::failed(format!(
                "ReplicaFailure: {}",
                failure.describe().unwrap_or("unknown reason")
            )));
        }
    }
    if desired > replicas {
        return Ok(StatusResult::in_progress(format!("Replicas: {}/{}", replicas, desired)));
    }
    if updated < desired {
        return Ok(StatusResult::in_progress(format!("Updated: {}/{}", updated, desired)));
    }
    if replicas > updated {
        return Ok(StatusResult::in_progress(format!(
            "Pending termination: {}",
            replicas - updated
        )));
    }
    if available < desired {
        return Ok(StatusResult::in_progress(format!("Available: {}/{}", available, desired)));
    }
    if ready < desired {
        return Ok(StatusResult::in_progress(format!("Ready: {}/{}", ready, desired)));
    }
    if let Some(cond) = object.condition("Available") {
        if cond.is_false() {
            return Ok(StatusResult::in_progress("Deployment not Available"));
        }
    }
    Ok(StatusResult::current(format!("Deployment is available. Replicas: {}", replicas)))
}

pub fn stateful_set(object: &Snapshot) -> anyhow::Result<StatusResult> {
    if let Some(res) = check_workload(object) {
        return Ok(res);
    }
    let desired = desired_replicas(object)?;
    let ready = status_count(object, "readyReplicas")?;
    let current = status_count(object, "currentReplicas")?;
    let updated = status_count(object, "updatedReplicas")?;

    if ready < desired {
        return Ok(StatusResult::in_progress(format!("Ready: {}/{}", ready, desired)));
    }
    let strategy = object.try_str(&["spec", "updateStrategy", "type"])?;
    if strategy == Some("OnDelete") {
        return Ok(StatusResult::current("StatefulSet is using the OnDelete update strategy"));
    }
    let partition = object.try_i64(&["spec", "updateStrategy", "rollingUpdate", "partition"])?;
    if let Some(partition) = partition.filter(|p| *p > 0) {
        let expected = (desired - partition).max(0);
        if updated < expected {
            return Ok(StatusResult::in_progress(format!(
                "Partitioned roll out in progress. updated: {}/{}",
                updated, expected
            )));
        }
        return Ok(StatusResult::current(format!(
            "Partitioned roll out complete. updated: {}/{}",
            updated, expected
        )));
    }
    let current_revision = object.try_str(&["status", "currentRevision"])?;
    let update_revision = object.try_str(&["status", "updateRevision"])?;
    if current_revision != update_revision {
        return Ok(StatusResult::in_progress(format!(
            "Waiting for rolling update to complete. updated: {}/{}",
            updated, desired
        )));
    }
    if current < desired {
        return Ok(StatusResult::in_progress(format!("Current: {}/{}", current, desired)));
    }
    Ok(StatusResult::current(format!("All replicas scheduled as expected. Replicas: {}", desired)))
}

pub fn daemon_set(object: &Snapshot) -> anyhow::Result<StatusResult> {
    if let Some(res) = check_workload(object) {
        return Ok(res);
    }
    let desired = match object.try_i64(&["status", "desiredNumberScheduled"])? {
        Some(d) => d,
        None => return Ok(StatusResult::in_progress("Missing .status.desiredNumberScheduled")),
    };
    let checks = [
        ("currentNumberScheduled", "Current"),
        ("updatedNumberScheduled", "Updated"),
        ("numberAvailable", "Available"),
        ("numberReady", "Ready"),
    ];
    for (field, label) in checks {
        let actual = status_count(object, field)?;
        if actual < desired {
            return Ok(StatusResult::in_progress(format!("{}: {}/{}", label, actual, desired)));
        }
    }
    Ok(StatusResult::current(format!("All replicas scheduled as expected. Replicas: {}", desired)))
}

pub fn replica_set(object: &Snapshot) -> anyhow::Result<StatusResult> {
    if let Some(res) = check_workload(object) {
        return Ok(res);
    }
    if let Some(failure) = object.condition("ReplicaFailure") {
        if failure.is_true() {
            return Ok(StatusResult::failed(format!(
                "ReplicaFailure: {}",
                failure.describe().unwrap_or("unknown reason")
            )));
        }
    }
    let desired = desired_replicas(object)?;
    let checks = [
        ("fullyLabeledReplicas", "Labelled"),
        ("availableReplicas", "Available"),
        ("readyReplicas", "Ready"),
    ];
    for (field, label) in checks {
        let actual = status_count(object, field)?;
        if actual < desired {
            return Ok(StatusResult::in_progress(format!("{}: {}/{}", label, actual, desired)));
        }
    }
    let replicas = status_count(object, "replicas")?;
    if replicas > desired {
        return Ok(StatusResult::in_progress(format!(
            "Pending termination: {}",
            replicas - desired
        )));
    }
    Ok(StatusResult::current(format!("ReplicaSet is available. Replicas: {}", replicas)))
}
