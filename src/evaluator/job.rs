//! Job status

use crate::{
    evaluator::{check_common, status_count},
    snapshot::Snapshot,
    status::StatusResult,
};

pub fn job(object: &Snapshot) -> anyhow::Result<StatusResult> {
    if let Some(res) = check_common(object) {
        return Ok(res);
    }
    let succeeded = status_count(object, "succeeded")?;
    let active = status_count(object, "active")?;
    let failed = status_count(object, "failed")?;
    let completions = object.try_i64(&["spec", "completions"])?.unwrap_or(1);

    if let Some(cond) = object.condition("Failed") {
        if cond.is_true() {
            return Ok(StatusResult::failed(format!(
                "Job Failed. failed: {}, reason: {}",
                failed,
                cond.describe().unwrap_or("unknown")
            )));
        }
    }
    if let Some(cond) = object.condition("Complete") {
        if cond.is_true() {
            return Ok(StatusResult::current(format!(
                "Job Completed. succeeded: {}/{}",
                succeeded, completions
            )));
        }
    }
    if object.get(&["status", "startTime"]).is_none() {
        return Ok(StatusResult::in_progress("Job not started"));
    }
    Ok(StatusResult::in_progress(format!(
        "Job in progress. succeeded: {}, active: {}, failed: {}",
        succeeded, active, failed
    )))
}
