//! Reading objects from cluster

use crate::{
    errors::{classify_kube, ErrorClass},
    object::{GroupKind, ObjectIdentifier},
    snapshot::Snapshot,
};
use async_trait::async_trait;
use kube::{
    api::{Api, DynamicObject, ListParams},
    discovery::{ApiResource, Scope},
};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// Only this lookup failed; other objects can still be read
    #[error("{0:#}")]
    Resource(anyhow::Error),
    /// Cluster is not readable at all right now
    #[error("cluster is unreachable: {0:#}")]
    Systemic(anyhow::Error),
}

impl ReadError {
    pub fn from_kube(err: kube::Error) -> Self {
        if classify_kube(&err).is_systemic() {
            ReadError::Systemic(err.into())
        } else {
            ReadError::Resource(err.into())
        }
    }

    pub fn is_systemic(&self) -> bool {
        matches!(self, ReadError::Systemic(_))
    }

    pub fn into_inner(self) -> anyhow::Error {
        match self {
            ReadError::Resource(e) | ReadError::Systemic(e) => e,
        }
    }
}

/// Source of object snapshots.
///
/// `get` must return `Ok(None)` for objects which do not exist.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn get(&self, id: &ObjectIdentifier) -> Result<Option<Snapshot>, ReadError>;

    /// If false, `list` is never called and objects are fetched one by one
    fn supports_batching(&self) -> bool {
        false
    }

    /// Lists all objects of the kind in the namespace (or in the
    /// whole cluster for cluster-scoped kinds).
    async fn list(
        &self,
        kind: &GroupKind,
        _namespace: Option<&str>,
    ) -> Result<Vec<Snapshot>, ReadError> {
        Err(ReadError::Resource(anyhow::anyhow!("listing {} is not supported", kind)))
    }
}

/// Reads objects through Kubernetes API, resolving kinds via discovery.
pub struct KubeClusterReader {
    client: kube::Client,
    resources: RwLock<HashMap<GroupKind, (ApiResource, Scope)>>,
}

impl KubeClusterReader {
    pub fn new(client: kube::Client) -> Self {
        KubeClusterReader {
            client,
            resources: RwLock::new(HashMap::new()),
        }
    }

    /// Connects using kubeconfig or in-cluster environment
    pub async fn try_default() -> anyhow::Result<Self> {
        let client = kube::Client::try_default().await?;
        Ok(KubeClusterReader::new(client))
    }

    #[tracing::instrument(skip(self, kind), fields(kind = %kind))]
    async fn resolve(&self, kind: &GroupKind) -> Result<(ApiResource, Scope), ReadError> {
        {
            let resources = self.resources.read().await;
            if let Some(res) = resources.get(kind) {
                return Ok(res.clone());
            }
        }
        let group = match kube::discovery::group(&self.client, &kind.group).await {
            Ok(g) => g,
            Err(err) if classify_kube(&err) == ErrorClass::NotFound => {
                return Err(ReadError::Resource(anyhow::anyhow!(
                    "API group '{}' is not served by cluster",
                    kind.group
                )))
            }
            Err(err) => return Err(ReadError::from_kube(err)),
        };
        let (resource, caps) = group.recommended_kind(&kind.kind).ok_or_else(|| {
            ReadError::Resource(anyhow::anyhow!("resource type {} is unknown", kind))
        })?;
        tracing::debug!(
            api_version = resource.api_version.as_str(),
            "Discovered resource"
        );
        let res = (resource, caps.scope);
        {
            // race condition is possible here, but it's harmless
            let mut resources = self.resources.write().await;
            resources.insert(kind.clone(), res.clone());
        }
        Ok(res)
    }

    fn api(
        &self,
        resource: &ApiResource,
        scope: &Scope,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>, ReadError> {
        match (scope, namespace) {
            (Scope::Cluster, _) => Ok(Api::all_with(self.client.clone(), resource)),
            (Scope::Namespaced, Some(ns)) => {
                Ok(Api::namespaced_with(self.client.clone(), ns, resource))
            }
            (Scope::Namespaced, None) => Err(ReadError::Resource(anyhow::anyhow!(
                "{} is namespaced, but no namespace was given",
                resource.kind
            ))),
        }
    }
}

fn to_snapshot(obj: &DynamicObject) -> Result<Snapshot, ReadError> {
    Snapshot::from_typed(obj).map_err(ReadError::Resource)
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    #[tracing::instrument(skip(self, id), fields(id = %id))]
    async fn get(&self, id: &ObjectIdentifier) -> Result<Option<Snapshot>, ReadError> {
        let (resource, scope) = self.resolve(&id.group_kind()).await?;
        let api = self.api(&resource, &scope, id.namespace())?;
        match api.get_opt(&id.name).await {
            Ok(Some(obj)) => Ok(Some(to_snapshot(&obj)?)),
            Ok(None) => Ok(None),
            Err(err) => Err(ReadError::from_kube(err)),
        }
    }

    fn supports_batching(&self) -> bool {
        true
    }

    #[tracing::instrument(skip(self, kind), fields(kind = %kind))]
    async fn list(
        &self,
        kind: &GroupKind,
        namespace: Option<&str>,
    ) -> Result<Vec<Snapshot>, ReadError> {
        let (resource, scope) = self.resolve(kind).await?;
        let api = self.api(&resource, &scope, namespace)?;
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(ReadError::from_kube)?;
        let snapshots = list
            .items
            .iter()
            .map(to_snapshot)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }
}
