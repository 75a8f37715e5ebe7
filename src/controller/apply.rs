//! Drive each desired object to its target state
//!
//! Objects are processed one at a time in builder order. A failure on one
//! object is recorded and the loop moves on; the caller decides what a
//! partially applied pass means.

use std::collections::BTreeSet;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::DynamicObject;
use tracing::{debug, info, warn};

use super::cluster::Cluster;
use super::mutate::{is_unchanged, merge_immutable_fields, updated_object, ImmutableMerge};
use crate::error::{Error, Result};
use crate::manifests::DesiredObject;
use crate::retry::{retry_on_conflict, RetryConfig};

/// What happened to one desired object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationResult {
    Created,
    Updated,
    Unchanged,
    /// The live object was deleted; it is recreated on the next pass
    ImmutableConflict,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectOutcome {
    pub key: String,
    pub result: MutationResult,
    /// UID of the object as it now exists, when it exists
    pub uid: Option<String>,
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub outcomes: Vec<ObjectOutcome>,
    pub errors: Vec<Error>,
}

impl ApplyReport {
    /// UIDs of every object that is now in its desired state
    pub fn reconciled_uids(&self) -> BTreeSet<String> {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.result,
                    MutationResult::Created | MutationResult::Updated | MutationResult::Unchanged
                )
            })
            .filter_map(|o| o.uid.clone())
            .collect()
    }

    pub fn count(&self, result: MutationResult) -> usize {
        self.outcomes.iter().filter(|o| o.result == result).count()
    }

    /// Number of objects that required a write
    pub fn writes(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.result,
                    MutationResult::Created
                        | MutationResult::Updated
                        | MutationResult::ImmutableConflict
                )
            })
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

fn uid_of(object: &DynamicObject) -> Option<String> {
    object.metadata.uid.clone()
}

/// One attempt at bringing `desired` to its target state
///
/// Always starts from a fresh read, so a conflict retry sees the latest
/// resourceVersion.
async fn apply_one(
    cluster: &dyn Cluster,
    desired: &DesiredObject,
) -> Result<(MutationResult, Option<String>)> {
    let kind = desired.kind;
    let live = cluster
        .get(kind, desired.namespace(), desired.name())
        .await?;

    let Some(live) = live else {
        let created = cluster.create(kind, &desired.object).await?;
        info!(object = %desired.key(), "Created");
        return Ok((MutationResult::Created, uid_of(&created)));
    };

    let mut target = desired.object.clone();
    if let ImmutableMerge::Conflict { field } = merge_immutable_fields(kind, &live, &mut target) {
        warn!(
            object = %desired.key(),
            field,
            "Immutable field changed, deleting for recreation"
        );
        cluster
            .delete(kind, desired.namespace(), desired.name())
            .await?;
        return Ok((MutationResult::ImmutableConflict, None));
    }

    if is_unchanged(&live, &target) {
        debug!(object = %desired.key(), "Unchanged");
        return Ok((MutationResult::Unchanged, uid_of(&live)));
    }

    let updated = cluster
        .replace(kind, &updated_object(&live, &target))
        .await?;
    info!(object = %desired.key(), "Updated");
    Ok((MutationResult::Updated, uid_of(&updated)))
}

/// Apply every desired object in order
///
/// Namespaced objects get `owner` as their controller reference before they
/// are written. Write conflicts are retried per object; any other failure is
/// recorded against that object alone.
pub async fn apply_desired_objects(
    cluster: &dyn Cluster,
    owner: &OwnerReference,
    desired: Vec<DesiredObject>,
    retry: &RetryConfig,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for mut object in desired {
        if object.kind.is_namespaced() {
            object.object.metadata.owner_references = Some(vec![owner.clone()]);
        }
        let key = object.key();

        let result = retry_on_conflict(retry, &key, || apply_one(cluster, &object)).await;
        match result {
            Ok((result, uid)) => report.outcomes.push(ObjectOutcome { key, result, uid }),
            Err(e) => {
                warn!(object = %key, error = %e, "Failed to apply object");
                report.outcomes.push(ObjectOutcome {
                    key: key.clone(),
                    result: MutationResult::Failed,
                    uid: None,
                });
                report.errors.push(e.for_object(key));
            }
        }
    }

    report
}
