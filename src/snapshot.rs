//! Schema-less view of a fetched object.
//!
//! Accessors never fail on missing paths: plain accessors return `None`
//! both when a field is absent and when it has unexpected type, `try_*`
//! accessors return `Ok(None)` for absent fields and an error for a
//! present field of the wrong type.

use anyhow::Context as _;
use serde_json::Value;

/// Current representation of an object, as returned by the cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot(Value);

/// Condition-like entry of `.status.conditions`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub type_: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }

    pub fn is_false(&self) -> bool {
        self.status == "False"
    }

    /// Message if set, otherwise reason
    pub fn describe(&self) -> Option<&str> {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| self.reason.as_deref())
    }
}

fn path_display(path: &[&str]) -> String {
    format!(".{}", path.join("."))
}

impl Snapshot {
    pub fn new(value: Value) -> Self {
        Snapshot(value)
    }

    pub fn from_typed<K: serde::Serialize>(obj: &K) -> anyhow::Result<Self> {
        let value = serde_json::to_value(obj).context("failed to serialize object")?;
        Ok(Snapshot(value))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let mut cur = &self.0;
        for segment in path {
            cur = cur.as_object()?.get(*segment)?;
        }
        if cur.is_null() {
            None
        } else {
            Some(cur)
        }
    }

    pub fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn i64_at(&self, path: &[&str]) -> Option<i64> {
        self.get(path).and_then(Value::as_i64)
    }

    pub fn try_i64(&self, path: &[&str]) -> anyhow::Result<Option<i64>> {
        match self.get(path) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .with_context(|| format!("{} is not an integer: {}", path_display(path), v)),
        }
    }

    pub fn try_str(&self, path: &[&str]) -> anyhow::Result<Option<&str>> {
        match self.get(path) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .with_context(|| format!("{} is not a string: {}", path_display(path), v)),
        }
    }

    pub fn try_array(&self, path: &[&str]) -> anyhow::Result<Option<&Vec<Value>>> {
        match self.get(path) {
            None => Ok(None),
            Some(v) => v
                .as_array()
                .map(Some)
                .with_context(|| format!("{} is not a list", path_display(path))),
        }
    }

    pub fn kind(&self) -> Option<&str> {
        self.str_at(&["kind"])
    }

    pub fn name(&self) -> Option<&str> {
        self.str_at(&["metadata", "name"])
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_at(&["metadata", "namespace"])
    }

    pub fn generation(&self) -> Option<i64> {
        self.i64_at(&["metadata", "generation"])
    }

    pub fn observed_generation(&self) -> Option<i64> {
        self.i64_at(&["status", "observedGeneration"])
    }

    pub fn deletion_timestamp(&self) -> Option<&str> {
        self.str_at(&["metadata", "deletionTimestamp"])
    }

    /// Parses `.status.conditions`.
    ///
    /// Returns `Ok(None)` if there are no conditions at all and an
    /// error if some entry lacks `type` or `status`.
    pub fn conditions(&self) -> anyhow::Result<Option<Vec<Condition>>> {
        let raw = match self.try_array(&["status", "conditions"])? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let mut conditions = Vec::with_capacity(raw.len());
        for (i, item) in raw.iter().enumerate() {
            let field = |name: &str| item.get(name).and_then(Value::as_str).map(str::to_string);
            conditions.push(Condition {
                type_: field("type").with_context(|| format!("condition #{} has no type", i))?,
                status: field("status")
                    .with_context(|| format!("condition #{} has no status", i))?,
                reason: field("reason"),
                message: field("message"),
            });
        }
        Ok(Some(conditions))
    }

    /// Looks up condition by its type. Malformed condition lists are
    /// treated as having no such condition.
    pub fn condition(&self, type_: &str) -> Option<Condition> {
        self.conditions()
            .ok()
            .flatten()?
            .into_iter()
            .find(|c| c.type_ == type_)
    }
}

impl From<Value> for Snapshot {
    fn from(value: Value) -> Self {
        Snapshot(value)
    }
}
