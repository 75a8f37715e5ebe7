//! Labels, annotations and owner references shared by every builder

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};

use crate::config::{FilterConfig, MANAGER_NAME};
use crate::crd::AmazonCloudWatchAgent;

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_VERSION: &str = "app.kubernetes.io/version";

pub const PART_OF: &str = "amazon-cloudwatch-agent";
pub const COMPONENT_AGENT: &str = "amazon-cloudwatch-agent";
pub const COMPONENT_MONITORING: &str = "amazon-cloudwatch-agent-monitoring";

pub const CONFIG_HASH_ANNOTATION: &str = "cloudwatch-agent-operator-config/sha256";

/// `<namespace>.<name>`, unique across the cluster
pub fn instance_name(agent: &AmazonCloudWatchAgent) -> String {
    format!(
        "{}.{}",
        agent.namespace().unwrap_or_else(|| "default".to_string()),
        agent.name_any()
    )
}

/// Label selector matching every object this CR owns, whatever its component
pub fn ownership_selector(agent: &AmazonCloudWatchAgent) -> String {
    format!(
        "{LABEL_MANAGED_BY}={MANAGER_NAME},{LABEL_INSTANCE}={}",
        instance_name(agent)
    )
}

/// Labels that select the agent pods
///
/// Only stable values go in here; a selector cannot change in place.
pub fn selector_labels(agent: &AmazonCloudWatchAgent) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGED_BY.to_string(), MANAGER_NAME.to_string()),
        (LABEL_INSTANCE.to_string(), instance_name(agent)),
        (LABEL_PART_OF.to_string(), PART_OF.to_string()),
        (LABEL_COMPONENT.to_string(), COMPONENT_AGENT.to_string()),
    ])
}

/// Full label set for a generated object
///
/// Starts from the CR's own labels minus filtered keys; operator labels
/// always take precedence.
pub fn labels(
    agent: &AmazonCloudWatchAgent,
    name: &str,
    image: &str,
    component: &str,
    filters: &FilterConfig,
) -> BTreeMap<String, String> {
    let mut labels: BTreeMap<String, String> = agent
        .labels()
        .iter()
        .filter(|(k, _)| !filters.is_label_filtered(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    labels.extend(selector_labels(agent));
    labels.insert(LABEL_COMPONENT.to_string(), component.to_string());
    labels.insert(LABEL_NAME.to_string(), name.to_string());
    labels.insert(LABEL_VERSION.to_string(), image_version(image));
    labels
}

/// CR annotations minus filtered keys
pub fn annotations(
    agent: &AmazonCloudWatchAgent,
    filters: &FilterConfig,
) -> BTreeMap<String, String> {
    agent
        .annotations()
        .iter()
        .filter(|(k, _)| !filters.is_annotation_filtered(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Hex SHA-256 over the agent and pipeline configuration
pub fn config_hash(agent: &AmazonCloudWatchAgent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(agent.spec.config.as_bytes());
    if let Some(otel) = &agent.spec.otel_config {
        hasher.update(b"\n---\n");
        hasher.update(otel.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Version implied by an image reference: the tag, or `latest`
pub fn image_version(image: &str) -> String {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last_segment = without_digest.rsplit('/').next().unwrap_or(without_digest);
    match last_segment.split_once(':') {
        Some((_, tag)) if !tag.is_empty() => tag.to_string(),
        _ => "latest".to_string(),
    }
}

/// Controller owner reference pointing back at the CR
pub fn owner_reference(agent: &AmazonCloudWatchAgent) -> OwnerReference {
    OwnerReference {
        api_version: AmazonCloudWatchAgent::api_version(&()).to_string(),
        kind: AmazonCloudWatchAgent::kind(&()).to_string(),
        name: agent.name_any(),
        uid: agent.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
