//! Status derived from the live workload

use kube::core::DynamicObject;
use serde_json::Value;
use tracing::debug;

use super::cluster::Cluster;
use crate::crd::{AmazonCloudWatchAgent, AmazonCloudWatchAgentStatus, DeploymentMode, ScaleStatus};
use crate::error::Result;
use crate::manifests::labels::{image_version, selector_labels};
use crate::manifests::{BuildContext, ObjectKind};

fn workload_kind(mode: DeploymentMode) -> Option<ObjectKind> {
    match mode {
        DeploymentMode::Deployment => Some(ObjectKind::Deployment),
        DeploymentMode::StatefulSet => Some(ObjectKind::StatefulSet),
        DeploymentMode::DaemonSet => Some(ObjectKind::DaemonSet),
        DeploymentMode::Sidecar => None,
    }
}

fn int_at(object: &DynamicObject, pointer: &str) -> i32 {
    object
        .data
        .pointer(pointer)
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or(0)
}

/// `k=v,k=v` in key order
pub fn selector_string<'a>(labels: impl IntoIterator<Item = (&'a String, &'a String)>) -> String {
    labels
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn live_selector(object: &DynamicObject) -> Option<String> {
    let labels = object.data.pointer("/spec/selector/matchLabels")?.as_object()?;
    let mut pairs: Vec<(&String, String)> = labels
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|v| (k, v.to_string())))
        .collect();
    pairs.sort();
    Some(
        pairs
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Scale figures for a workload object: `(replicas, ready)`
fn replica_counts(kind: ObjectKind, object: &DynamicObject) -> (i32, i32) {
    match kind {
        ObjectKind::DaemonSet => (
            int_at(object, "/status/desiredNumberScheduled"),
            int_at(object, "/status/numberReady"),
        ),
        _ => (
            int_at(object, "/status/replicas"),
            int_at(object, "/status/readyReplicas"),
        ),
    }
}

/// Read the live workload and summarise it
///
/// Sidecar mode has no workload of its own and reports a zeroed scale. A
/// workload that does not exist yet counts as zero replicas.
pub async fn compute_status(
    cluster: &dyn Cluster,
    ctx: &BuildContext<'_>,
) -> Result<AmazonCloudWatchAgentStatus> {
    let image = ctx.image();

    let Some(kind) = workload_kind(ctx.mode()) else {
        return Ok(AmazonCloudWatchAgentStatus {
            version: image_version(&image),
            image,
            scale: ScaleStatus {
                replicas: 0,
                status_replicas: "0/0".to_string(),
                selector: String::new(),
            },
        });
    };

    let namespace = ctx.namespace();
    let live = cluster.get(kind, namespace.as_deref(), &ctx.name()).await?;

    let (replicas, ready, selector, image) = match &live {
        Some(object) => {
            let (replicas, ready) = replica_counts(kind, object);
            let selector = live_selector(object)
                .unwrap_or_else(|| selector_string(&selector_labels(ctx.agent)));
            let live_image = object
                .data
                .pointer("/spec/template/spec/containers/0/image")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(image);
            (replicas, ready, selector, live_image)
        }
        None => (0, 0, selector_string(&selector_labels(ctx.agent)), image),
    };

    Ok(AmazonCloudWatchAgentStatus {
        version: image_version(&image),
        image,
        scale: ScaleStatus {
            replicas,
            status_replicas: format!("{ready}/{replicas}"),
            selector,
        },
    })
}

/// Write `status` unless the agent already reports exactly that
///
/// Returns whether a patch was sent.
pub async fn report_status(
    cluster: &dyn Cluster,
    agent: &AmazonCloudWatchAgent,
    status: &AmazonCloudWatchAgentStatus,
) -> Result<bool> {
    if agent.status.as_ref() == Some(status) {
        debug!("Status unchanged");
        return Ok(false);
    }
    cluster.patch_status(agent, status).await?;
    Ok(true)
}
