//! PodDisruptionBudget status

use crate::{
    evaluator::{check_common, status_count},
    snapshot::Snapshot,
    status::StatusResult,
};

pub fn pod_disruption_budget(object: &Snapshot) -> anyhow::Result<StatusResult> {
    if let Some(res) = check_common(object) {
        return Ok(res);
    }
    if object.observed_generation().is_none() {
        return Ok(StatusResult::in_progress("Budget has not been observed yet"));
    }
    let healthy = status_count(object, "currentHealthy")?;
    let wanted = status_count(object, "desiredHealthy")?;
    if healthy < wanted {
        return Ok(StatusResult::in_progress(format!(
            "Budget not met. healthy: {}/{}",
            healthy, wanted
        )));
    }
    Ok(StatusResult::current(format!("Budget is met. healthy: {}/{}", healthy, wanted)))
}
