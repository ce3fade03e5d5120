use crate::{
    snapshot::Condition,
    status::{Status, StatusResult},
};
use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Maps a condition in given state to object status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRule {
    #[serde(rename = "type")]
    pub type_: String,
    /// `True`, `False` or `Unknown`
    pub status: String,
    pub result: Status,
}

impl ConditionRule {
    pub fn new(type_: &str, status: &str, result: Status) -> Self {
        ConditionRule {
            type_: type_.to_string(),
            status: status.to_string(),
            result,
        }
    }
}

/// Ordered list of condition rules used by the generic evaluator.
/// First matching rule wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionTable {
    pub rules: Vec<ConditionRule>,
}

impl Default for ConditionTable {
    fn default() -> Self {
        ConditionTable {
            rules: vec![
                ConditionRule::new("Stalled", "True", Status::Failed),
                ConditionRule::new("Failed", "True", Status::Failed),
                ConditionRule::new("Reconciling", "True", Status::InProgress),
                ConditionRule::new("Ready", "False", Status::InProgress),
                ConditionRule::new("Available", "False", Status::InProgress),
                ConditionRule::new("Ready", "True", Status::Current),
            ],
        }
    }
}

impl ConditionTable {
    /// Parses table from yaml like
    /// ```yaml
    /// rules:
    ///   - type: Stalled
    ///     status: "True"
    ///     result: Failed
    /// ```
    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        let table: ConditionTable =
            serde_yaml::from_str(data).context("failed to parse condition table")?;
        for rule in &table.rules {
            if rule.result == Status::NotFound {
                anyhow::bail!(
                    "condition {}={} maps to NotFound, which only absent objects can have",
                    rule.type_,
                    rule.status
                );
            }
        }
        Ok(table)
    }

    pub fn classify(&self, conditions: &[Condition]) -> Option<StatusResult> {
        for rule in &self.rules {
            let hit = conditions
                .iter()
                .find(|c| c.type_ == rule.type_ && c.status == rule.status);
            if let Some(cond) = hit {
                let message = match cond.describe() {
                    Some(detail) => format!("{}={}: {}", cond.type_, cond.status, detail),
                    None => format!("{}={}", cond.type_, cond.status),
                };
                return Some(StatusResult::new(rule.result, message));
            }
        }
        None
    }
}
