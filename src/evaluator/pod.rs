//! Pod status from phase, conditions and container states

use crate::{evaluator::check_common, snapshot::Snapshot, status::StatusResult};

const CRASH_LOOP: &str = "CrashLoopBackOff";

/// Names of containers waiting with `CrashLoopBackOff`
fn crash_looping(object: &Snapshot) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for field in ["initContainerStatuses", "containerStatuses"] {
        let statuses = match object.try_array(&["status", field])? {
            Some(s) => s,
            None => continue,
        };
        for st in statuses {
            let reason = st
                .pointer("/state/waiting/reason")
                .and_then(|r| r.as_str());
            if reason == Some(CRASH_LOOP) {
                let name = st.get("name").and_then(|n| n.as_str()).unwrap_or("<unnamed>");
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

pub fn pod(object: &Snapshot) -> anyhow::Result<StatusResult> {
    if let Some(res) = check_common(object) {
        return Ok(res);
    }
    let phase = object.try_str(&["status", "phase"])?;
    match phase {
        Some("Succeeded") => return Ok(StatusResult::current("Pod has completed successfully")),
        Some("Failed") => {
            return Ok(StatusResult::failed("Pod has completed, but not successfully"))
        }
        _ => {}
    }
    let looping = crash_looping(object)?;
    if !looping.is_empty() {
        return Ok(StatusResult::failed(format!(
            "Containers are crash looping: {}",
            looping.join(", ")
        )));
    }
    match phase {
        Some("Running") => match object.condition("Ready") {
            Some(ready) if ready.is_true() => Ok(StatusResult::current("Pod is Ready")),
            _ => Ok(StatusResult::in_progress("Pod is running but is not Ready")),
        },
        Some("Pending") => match object.condition("PodScheduled") {
            Some(sched) if sched.is_false() && sched.reason.as_deref() == Some("Unschedulable") => {
                Ok(StatusResult::in_progress(format!(
                    "Pod could not be scheduled: {}",
                    sched.describe().unwrap_or("Unschedulable")
                )))
            }
            _ => Ok(StatusResult::in_progress("Pod is in the Pending phase")),
        },
        Some(other) => Ok(StatusResult::in_progress(format!("Pod is in the {} phase", other))),
        None => Ok(StatusResult::in_progress("Pod phase not available")),
    }
}
