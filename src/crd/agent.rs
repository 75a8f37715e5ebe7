//! AmazonCloudWatchAgent Custom Resource Definition
//!
//! One AmazonCloudWatchAgent describes a CloudWatch agent deployment: the raw
//! agent configuration, an optional OpenTelemetry pipeline configuration, the
//! deployment mode and the optional autoscaling, disruption budget and ingress
//! features layered on top.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    AutoscalerSpec, DeploymentMode, IngressConfig, IngressRuleType, PodDisruptionBudgetSpec,
    PortOverride, ScaleStatus,
};

/// Structured validation error for `AmazonCloudWatchAgentSpec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
}

impl SpecValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cloudwatch.aws.amazon.com",
    version = "v1alpha1",
    kind = "AmazonCloudWatchAgent",
    namespaced,
    status = "AmazonCloudWatchAgentStatus",
    shortname = "cwagent",
    scale = r#"{"specReplicasPath":".spec.replicas","statusReplicasPath":".status.scale.replicas","labelSelectorPath":".status.scale.selector"}"#,
    printcolumn = r#"{"name":"Mode","type":"string","jsonPath":".spec.mode"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.scale.statusReplicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AmazonCloudWatchAgentSpec {
    #[serde(default)]
    pub mode: DeploymentMode,

    /// Raw agent configuration (JSON)
    #[serde(default)]
    pub config: String,

    /// Raw OpenTelemetry pipeline configuration (YAML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otel_config: Option<String>,

    /// Ports that replace anything inferred from the configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortOverride>,

    #[serde(default = "default_replicas")]
    pub replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Existing ServiceAccount to run as; one is generated when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(with = "Vec<serde_json::Value>")]
    pub env: Vec<EnvVar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(with = "Vec<serde_json::Value>")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub host_network: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaler: Option<AutoscalerSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_disruption_budget: Option<PodDisruptionBudgetSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressConfig>,
}

fn default_replicas() -> i32 {
    1
}

impl AmazonCloudWatchAgentSpec {
    /// Validate the spec against the selected deployment mode
    ///
    /// All problems are reported at once rather than stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.replicas < 0 {
            errors.push(SpecValidationError::new(
                "spec.replicas",
                "replicas must not be negative",
            ));
        }

        if let Some(autoscaler) = &self.autoscaler {
            if matches!(self.mode, DeploymentMode::DaemonSet | DeploymentMode::Sidecar) {
                errors.push(SpecValidationError::new(
                    "spec.autoscaler",
                    format!("autoscaling is not supported in {} mode", self.mode),
                ));
            }
            let min = autoscaler.min_replicas.unwrap_or(1);
            if min < 1 {
                errors.push(SpecValidationError::new(
                    "spec.autoscaler.minReplicas",
                    "minReplicas must be at least 1",
                ));
            }
            if autoscaler.max_replicas < min {
                errors.push(SpecValidationError::new(
                    "spec.autoscaler.maxReplicas",
                    "maxReplicas must be greater than or equal to minReplicas",
                ));
            }
            for (field, value) in [
                ("targetCPUUtilization", autoscaler.target_cpu_utilization),
                ("targetMemoryUtilization", autoscaler.target_memory_utilization),
            ] {
                if let Some(v) = value {
                    if !(1..=99).contains(&v) {
                        errors.push(SpecValidationError::new(
                            format!("spec.autoscaler.{field}"),
                            "utilization target must be between 1 and 99",
                        ));
                    }
                }
            }
        }

        if self.pod_disruption_budget.is_some() && self.mode == DeploymentMode::Sidecar {
            errors.push(SpecValidationError::new(
                "spec.podDisruptionBudget",
                "a disruption budget is not supported in Sidecar mode",
            ));
        }

        if let Some(ingress) = &self.ingress {
            if self.mode == DeploymentMode::Sidecar {
                errors.push(SpecValidationError::new(
                    "spec.ingress",
                    "ingress is not supported in Sidecar mode",
                ));
            }
            let has_host = ingress.hostname.as_deref().is_some_and(|h| !h.is_empty());
            if ingress.rule_type == IngressRuleType::Subdomain && !has_host {
                errors.push(SpecValidationError::new(
                    "spec.ingress.hostname",
                    "a hostname is required for Subdomain rules",
                ));
            }
        }

        for (i, port) in self.ports.iter().enumerate() {
            if !(1..=65535).contains(&port.port) {
                errors.push(SpecValidationError::new(
                    format!("spec.ports[{i}].port"),
                    "port must be between 1 and 65535",
                ));
            }
            if let Some(target) = port.target_port.filter(|t| !(1..=65535).contains(t)) {
                errors.push(SpecValidationError::new(
                    format!("spec.ports[{i}].targetPort"),
                    format!("targetPort {target} must be between 1 and 65535"),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Status subresource of an AmazonCloudWatchAgent
///
/// Rewritten wholesale after every fully successful reconcile pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AmazonCloudWatchAgentStatus {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub scale: ScaleStatus,
}
