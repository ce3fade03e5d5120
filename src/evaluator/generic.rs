use crate::{
    evaluator::{ConditionTable, StatusEvaluator},
    snapshot::Snapshot,
    status::StatusResult,
};

/// Checks shared by all evaluators: pending deletion and unobserved
/// generation.
pub fn check_common(object: &Snapshot) -> Option<StatusResult> {
    if object.deletion_timestamp().is_some() {
        return Some(StatusResult::terminating("Resource scheduled for deletion"));
    }
    if let (Some(generation), Some(observed)) = (object.generation(), object.observed_generation())
    {
        if generation != observed {
            return Some(StatusResult::in_progress(format!(
                "{} generation is {}, but latest observed generation is {}",
                object.kind().unwrap_or("Resource"),
                generation,
                observed
            )));
        }
    }
    None
}

/// Fallback evaluator for kinds without dedicated logic.
///
/// Objects without `.status` are current as soon as they exist; otherwise
/// conditions are matched against a [`ConditionTable`].
#[derive(Clone, Debug, Default)]
pub struct GenericEvaluator {
    table: ConditionTable,
}

impl GenericEvaluator {
    pub fn new(table: ConditionTable) -> Self {
        GenericEvaluator { table }
    }

    pub fn table(&self) -> &ConditionTable {
        &self.table
    }
}

impl StatusEvaluator for GenericEvaluator {
    fn evaluate(&self, object: &Snapshot) -> anyhow::Result<StatusResult> {
        if let Some(res) = check_common(object) {
            return Ok(res);
        }
        let status = match object.get(&["status"]) {
            Some(status) => status,
            None => return Ok(StatusResult::current("Resource is current")),
        };
        if !status.is_object() {
            return Ok(StatusResult::in_progress("Resource has .status of unrecognized shape"));
        }
        let conditions = match object.conditions() {
            Ok(Some(conditions)) => conditions,
            Ok(None) => return Ok(StatusResult::current("Resource is current")),
            Err(err) => {
                return Ok(StatusResult::in_progress(format!(
                    "Resource has unrecognized conditions: {:#}",
                    err
                )))
            }
        };
        Ok(self
            .table
            .classify(&conditions)
            .unwrap_or_else(|| StatusResult::current("Resource is current")))
    }
}
