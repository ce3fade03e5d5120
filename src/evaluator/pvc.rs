//! PersistentVolumeClaim is current once bound

use crate::{evaluator::check_common, snapshot::Snapshot, status::StatusResult};

pub fn persistent_volume_claim(object: &Snapshot) -> anyhow::Result<StatusResult> {
    if let Some(res) = check_common(object) {
        return Ok(res);
    }
    match object.try_str(&["status", "phase"])? {
        Some("Bound") => Ok(StatusResult::current("PVC is Bound")),
        Some("Lost") => Ok(StatusResult::failed("PVC lost its underlying volume")),
        Some(phase) => Ok(StatusResult::in_progress(format!("PVC is not Bound. phase: {}", phase))),
        None => Ok(StatusResult::in_progress("PVC is not Bound")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use serde_json::json;

    #[test]
    fn phases() {
        let claim = |phase: &str| {
            Snapshot::new(json!({
                "kind": "PersistentVolumeClaim",
                "metadata": {"name": "data"},
                "status": {"phase": phase}
            }))
        };
        assert_eq!(
            persistent_volume_claim(&claim("Pending")).unwrap(),
            StatusResult::in_progress("PVC is not Bound. phase: Pending")
        );
        assert_eq!(
            persistent_volume_claim(&claim("Bound")).unwrap().status,
            Status::Current
        );
        assert_eq!(
            persistent_volume_claim(&claim("Lost")).unwrap().status,
            Status::Failed
        );
    }
}
