//! Identifiers of cluster objects

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// API group and kind, without version.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKind {
    /// Empty for the core group
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: &str, kind: &str) -> Self {
        GroupKind {
            group: group.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Group and kind of a typed k8s-openapi resource
    pub fn of<K: k8s_openapi::Resource>() -> Self {
        GroupKind::new(K::GROUP, K::KIND)
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum InvalidIdentifier {
    #[error("identifier has empty kind")]
    EmptyKind,
    #[error("identifier {0} has empty name")]
    EmptyName(String),
    #[error("'{0}' does not look like group/Kind/namespace/name")]
    Malformed(String),
}

/// Names one object in cluster: (group, kind, namespace, name).
///
/// Namespace is empty for cluster-scoped objects.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectIdentifier {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectIdentifier {
    pub fn new(group: &str, kind: &str, namespace: &str, name: &str) -> Self {
        ObjectIdentifier {
            group: group.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Identifier of typed resource `K`
    pub fn of<K: k8s_openapi::Resource>(namespace: &str, name: &str) -> Self {
        ObjectIdentifier::new(K::GROUP, K::KIND, namespace, name)
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.group, &self.kind)
    }

    pub fn namespace(&self) -> Option<&str> {
        if self.namespace.is_empty() {
            None
        } else {
            Some(&self.namespace)
        }
    }

    /// Rejects identifiers which can not name any object.
    pub fn validate(&self) -> Result<(), InvalidIdentifier> {
        if self.kind.trim().is_empty() {
            return Err(InvalidIdentifier::EmptyKind);
        }
        if self.name.trim().is_empty() {
            return Err(InvalidIdentifier::EmptyName(self.to_string()));
        }
        Ok(())
    }

    /// Extracts identifier from an object document, e.g. parsed manifest.
    pub fn from_object(obj: &serde_json::Value) -> anyhow::Result<Self> {
        let api_version = obj
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .context("missing apiVersion")?;
        let kind = obj
            .get("kind")
            .and_then(|v| v.as_str())
            .context("missing kind")?;
        let metadata = obj.get("metadata").context("missing metadata")?;
        let name = metadata
            .get("name")
            .and_then(|v| v.as_str())
            .context("missing metadata.name")?;
        let namespace = metadata
            .get("namespace")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        // "v1" is core, "apps/v1" is in group "apps"
        let group = match api_version.rsplit_once('/') {
            Some((group, _version)) => group,
            None => "",
        };
        let id = ObjectIdentifier::new(group, kind, namespace, name);
        id.validate()?;
        Ok(id)
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = if self.group.is_empty() {
            "core"
        } else {
            &self.group
        };
        write!(
            f,
            "{}/{}/{}/{}",
            group, self.kind, self.namespace, self.name
        )
    }
}

/// Parses `group/Kind/namespace/name`.
///
/// The core group can be written either as `core` or as empty string.
/// Cluster-scoped objects have empty namespace, e.g. `core/Namespace//foo`.
impl FromStr for ObjectIdentifier {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, InvalidIdentifier> {
        let parts = s.split('/').collect::<Vec<_>>();
        if parts.len() != 4 {
            return Err(InvalidIdentifier::Malformed(s.to_string()));
        }
        let group = match parts[0] {
            "core" => "",
            other => other,
        };
        let id = ObjectIdentifier::new(group, parts[1], parts[2], parts[3]);
        id.validate()?;
        Ok(id)
    }
}
