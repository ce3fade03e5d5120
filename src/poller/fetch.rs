//! Fetching all tracked objects for one cycle

use crate::{
    object::{GroupKind, ObjectIdentifier},
    reader::{ClusterReader, ReadError},
    snapshot::Snapshot,
};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

pub(crate) type Lookup = Result<Option<Snapshot>, ReadError>;

/// Lookups of one cycle
pub(crate) struct Fetched {
    /// Only lookups which returned before cancellation
    pub(crate) results: BTreeMap<ObjectIdentifier, Lookup>,
    /// False if some lookups were abandoned because of cancellation
    pub(crate) complete: bool,
}

impl Fetched {
    /// Removes and returns the first systemic error, if any
    pub(crate) fn take_systemic_error(&mut self) -> Option<anyhow::Error> {
        let key = self
            .results
            .iter()
            .find(|(_, res)| matches!(res, Err(e) if e.is_systemic()))
            .map(|(id, _)| id.clone())?;
        match self.results.remove(&key) {
            Some(Err(err)) => Some(err.into_inner()),
            _ => None,
        }
    }
}

/// Unit of work for one worker
#[derive(Debug)]
enum Unit {
    Single(ObjectIdentifier),
    Batch {
        kind: GroupKind,
        namespace: String,
        members: Vec<ObjectIdentifier>,
    },
}

/// Groups objects sharing kind and namespace into batches.
fn plan<'a, I>(identifiers: I, batching: bool) -> Vec<Unit>
where
    I: IntoIterator<Item = &'a ObjectIdentifier>,
{
    if !batching {
        return identifiers
            .into_iter()
            .cloned()
            .map(Unit::Single)
            .collect();
    }
    let mut groups: BTreeMap<(GroupKind, String), Vec<ObjectIdentifier>> = BTreeMap::new();
    for id in identifiers {
        groups
            .entry((id.group_kind(), id.namespace.clone()))
            .or_default()
            .push(id.clone());
    }
    groups
        .into_iter()
        .map(|((kind, namespace), mut members)| {
            if members.len() == 1 {
                Unit::Single(members.remove(0))
            } else {
                Unit::Batch {
                    kind,
                    namespace,
                    members,
                }
            }
        })
        .collect()
}

fn copy_error(err: &ReadError) -> ReadError {
    let copy = anyhow::anyhow!("{:#}", err);
    if err.is_systemic() {
        ReadError::Systemic(copy)
    } else {
        ReadError::Resource(copy)
    }
}

async fn fetch_unit(reader: &dyn ClusterReader, unit: Unit) -> Vec<(ObjectIdentifier, Lookup)> {
    match unit {
        Unit::Single(id) => {
            let res = reader.get(&id).await;
            vec![(id, res)]
        }
        Unit::Batch {
            kind,
            namespace,
            members,
        } => {
            let ns = if namespace.is_empty() {
                None
            } else {
                Some(namespace.as_str())
            };
            match reader.list(&kind, ns).await {
                Ok(objects) => members
                    .into_iter()
                    .map(|id| {
                        let found = objects.iter().find(|obj| {
                            obj.name() == Some(id.name.as_str())
                                && obj.namespace().unwrap_or_default() == id.namespace
                        });
                        (id, Ok(found.cloned()))
                    })
                    .collect(),
                Err(err) => {
                    tracing::debug!(kind = %kind, "Batched lookup failed: {:#}", err);
                    let mut res = Vec::with_capacity(members.len());
                    let mut members = members.into_iter();
                    let first = members.next();
                    for id in members {
                        res.push((id, Err(copy_error(&err))));
                    }
                    if let Some(id) = first {
                        res.insert(0, (id, Err(err)));
                    }
                    res
                }
            }
        }
    }
}

/// Fetches all objects using at most `concurrency` parallel lookups.
///
/// After `cancel` fires, lookups in flight are abandoned and no new
/// lookups are started.
pub(crate) async fn fetch_all<'a, I>(
    reader: &dyn ClusterReader,
    identifiers: I,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Fetched
where
    I: IntoIterator<Item = &'a ObjectIdentifier>,
{
    let units = plan(identifiers, reader.supports_batching());
    let outputs = stream::iter(units)
        .map(|unit| async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = fetch_unit(reader, unit) => Some(res),
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut fetched = Fetched {
        results: BTreeMap::new(),
        complete: true,
    };
    for output in outputs {
        match output {
            Some(lookups) => fetched.results.extend(lookups),
            None => fetched.complete = false,
        }
    }
    fetched
}
