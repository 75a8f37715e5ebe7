//! HorizontalPodAutoscaler and PodDisruptionBudget

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec,
    MetricTarget, ResourceMetricSource,
};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;

use super::labels::{annotations, labels, selector_labels, COMPONENT_AGENT};
use super::BuildContext;
use crate::crd::{AmazonCloudWatchAgent, DeploymentMode};

/// CPU target used when the autoscaler names no metric at all
pub const DEFAULT_CPU_UTILIZATION: i32 = 90;

fn metadata(ctx: &BuildContext<'_>) -> ObjectMeta {
    let name = ctx.name();
    let annotations = annotations(ctx.agent, &ctx.config.filters);
    ObjectMeta {
        labels: Some(labels(
            ctx.agent,
            &name,
            &ctx.image(),
            COMPONENT_AGENT,
            &ctx.config.filters,
        )),
        annotations: (!annotations.is_empty()).then_some(annotations),
        name: Some(name),
        namespace: ctx.namespace(),
        ..Default::default()
    }
}

fn utilization_metric(resource: &str, target: i32) -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: resource.to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(target),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

/// Autoscaler targeting the CR's scale subresource
///
/// Only Deployment and StatefulSet modes can scale horizontally.
pub fn build_hpa(ctx: &BuildContext<'_>) -> Option<HorizontalPodAutoscaler> {
    let autoscaler = ctx.agent.spec.autoscaler.as_ref()?;
    if !matches!(
        ctx.mode(),
        DeploymentMode::Deployment | DeploymentMode::StatefulSet
    ) {
        return None;
    }

    let mut metrics = Vec::new();
    if let Some(cpu) = autoscaler.target_cpu_utilization {
        metrics.push(utilization_metric("cpu", cpu));
    }
    if let Some(memory) = autoscaler.target_memory_utilization {
        metrics.push(utilization_metric("memory", memory));
    }
    if metrics.is_empty() {
        metrics.push(utilization_metric("cpu", DEFAULT_CPU_UTILIZATION));
    }

    Some(HorizontalPodAutoscaler {
        metadata: metadata(ctx),
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some(AmazonCloudWatchAgent::api_version(&()).to_string()),
                kind: AmazonCloudWatchAgent::kind(&()).to_string(),
                name: ctx.name(),
            },
            min_replicas: Some(autoscaler.min_replicas.unwrap_or(1)),
            max_replicas: autoscaler.max_replicas,
            metrics: Some(metrics),
            behavior: None,
        }),
        status: None,
    })
}

/// Disruption budget for the agent pods; `maxUnavailable: 1` when the
/// sub-spec names neither bound
pub fn build_pdb(ctx: &BuildContext<'_>) -> Option<PodDisruptionBudget> {
    let pdb = ctx.agent.spec.pod_disruption_budget.as_ref()?;
    if ctx.mode() == DeploymentMode::Sidecar {
        return None;
    }

    let (min_available, max_unavailable) = match (&pdb.min_available, &pdb.max_unavailable) {
        (None, None) => (None, Some(IntOrString::Int(1))),
        (min, max) => (min.clone(), max.clone()),
    };

    Some(PodDisruptionBudget {
        metadata: metadata(ctx),
        spec: Some(PodDisruptionBudgetSpec {
            selector: Some(LabelSelector {
                match_labels: Some(selector_labels(ctx.agent)),
                ..Default::default()
            }),
            min_available,
            max_unavailable,
            ..Default::default()
        }),
        status: None,
    })
}
