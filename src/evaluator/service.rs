//! Service status; only load balancers need to wait

use crate::{evaluator::check_common, snapshot::Snapshot, status::StatusResult};

pub fn service(object: &Snapshot) -> anyhow::Result<StatusResult> {
    if let Some(res) = check_common(object) {
        return Ok(res);
    }
    if object.try_str(&["spec", "type"])? == Some("LoadBalancer") {
        let ingress = object.try_array(&["status", "loadBalancer", "ingress"])?;
        if ingress.map_or(true, |i| i.is_empty()) {
            return Ok(StatusResult::in_progress("Waiting for load balancer ingress"));
        }
    }
    Ok(StatusResult::current("Service is ready"))
}
