//! CustomResourceDefinition is current once established

use crate::{evaluator::check_common, snapshot::Snapshot, status::StatusResult};

pub fn custom_resource_definition(object: &Snapshot) -> anyhow::Result<StatusResult> {
    if let Some(res) = check_common(object) {
        return Ok(res);
    }
    if let Some(accepted) = object.condition("NamesAccepted") {
        if accepted.is_false() {
            return Ok(StatusResult::failed(format!(
                "CRD names were not accepted: {}",
                accepted.describe().unwrap_or("no reason given")
            )));
        }
    }
    match object.condition("Established") {
        Some(established) if established.is_true() => {
            Ok(StatusResult::current("CRD is established"))
        }
        _ => Ok(StatusResult::in_progress("CRD is not established")),
    }
}
