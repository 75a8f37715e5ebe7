//! Garbage collection of objects the agent no longer wants
//!
//! Everything carrying the agent's ownership labels is listed, indexed by
//! UID, and whatever the current pass did not reconcile is deleted. If any
//! kind cannot be listed the whole prune is abandoned: an incomplete index
//! cannot tell an orphan from an object that was simply not seen.

use std::collections::{BTreeMap, BTreeSet};

use kube::core::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::cluster::Cluster;
use crate::crd::AmazonCloudWatchAgent;
use crate::error::{Error, Result};
use crate::manifests::labels::ownership_selector;
use crate::manifests::ObjectKind;

#[derive(Clone, Debug)]
pub struct OwnedObject {
    pub kind: ObjectKind,
    pub object: DynamicObject,
}

impl OwnedObject {
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.kind,
            self.object.namespace().unwrap_or_else(|| "-".to_string()),
            self.object.name_any()
        )
    }
}

/// Objects currently owned by one agent, keyed by UID
#[derive(Clone, Debug, Default)]
pub struct OwnedObjectIndex {
    objects: BTreeMap<String, OwnedObject>,
}

impl OwnedObjectIndex {
    pub fn insert(&mut self, kind: ObjectKind, object: DynamicObject) {
        if let Some(uid) = object.metadata.uid.clone() {
            self.objects.insert(uid, OwnedObject { kind, object });
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Owned objects whose UID is not in `reconciled`
    pub fn orphans<'a>(&'a self, reconciled: &'a BTreeSet<String>) -> Vec<&'a OwnedObject> {
        self.objects
            .iter()
            .filter(|(uid, _)| !reconciled.contains(*uid))
            .map(|(_, owned)| owned)
            .collect()
    }
}

/// List every namespaced kind by the agent's ownership selector
///
/// Fails on the first kind that cannot be listed. A previously generated
/// ServiceAccount that the spec now names explicitly is left out, since the
/// pods run as it.
pub async fn list_owned_objects(
    cluster: &dyn Cluster,
    agent: &AmazonCloudWatchAgent,
) -> Result<OwnedObjectIndex> {
    let namespace = agent.namespace().unwrap_or_else(|| "default".to_string());
    let selector = ownership_selector(agent);
    let in_use = agent.spec.service_account.as_deref();
    let mut index = OwnedObjectIndex::default();

    for kind in ObjectKind::NAMESPACED {
        let objects = cluster.list(kind, &namespace, &selector).await?;
        for object in objects {
            let named_by_spec = in_use.is_some() && in_use == object.metadata.name.as_deref();
            if kind == ObjectKind::ServiceAccount && named_by_spec {
                debug!(name = %object.name_any(), "Keeping ServiceAccount named by the spec");
                continue;
            }
            index.insert(kind, object);
        }
    }

    debug!(owned = index.len(), "Indexed owned objects");
    Ok(index)
}

/// Delete every owned object the pass did not reconcile
///
/// Deletion failures do not stop the sweep; they are returned together.
/// Returns the number of objects deleted.
pub async fn prune_orphans(
    cluster: &dyn Cluster,
    index: &OwnedObjectIndex,
    reconciled: &BTreeSet<String>,
) -> Result<usize> {
    let mut deleted = 0;
    let mut errors = Vec::new();

    for orphan in index.orphans(reconciled) {
        let key = orphan.key();
        let namespace = orphan.object.namespace();
        match cluster
            .delete(orphan.kind, namespace.as_deref(), &orphan.object.name_any())
            .await
        {
            Ok(()) => {
                info!(object = %key, "Deleted orphaned object");
                deleted += 1;
            }
            Err(e) => {
                warn!(object = %key, error = %e, "Failed to delete orphaned object");
                errors.push(e.for_object(key));
            }
        }
    }

    Error::from_batch(errors)?;
    Ok(deleted)
}

/// List then prune in one step
pub async fn collect_garbage(
    cluster: &dyn Cluster,
    agent: &AmazonCloudWatchAgent,
    reconciled: &BTreeSet<String>,
) -> Result<usize> {
    let index = match list_owned_objects(cluster, agent).await {
        Ok(index) => index,
        Err(e) => {
            warn!(error = %e, "Could not list owned objects, skipping garbage collection");
            return Err(e);
        }
    };
    prune_orphans(cluster, &index, reconciled).await
}
