//! Services: the receiver Service, its headless twin and the monitoring Service

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::labels::{annotations, labels, selector_labels, COMPONENT_AGENT, COMPONENT_MONITORING};
use super::BuildContext;
use crate::crd::{DeploymentMode, Protocol};

pub const SERVING_CERT_ANNOTATION: &str = "service.beta.openshift.io/serving-cert-secret-name";
pub const MONITORING_PORT_NAME: &str = "monitoring";

fn service_ports(ctx: &BuildContext<'_>) -> Vec<ServicePort> {
    ctx.ports
        .iter()
        .map(|p| ServicePort {
            name: Some(p.name.clone()),
            port: p.port,
            protocol: Some(p.protocol.as_str().to_string()),
            target_port: Some(IntOrString::Int(p.container_port())),
            ..Default::default()
        })
        .collect()
}

fn metadata(
    ctx: &BuildContext<'_>,
    name: String,
    component: &str,
    extra_annotations: BTreeMap<String, String>,
) -> ObjectMeta {
    let mut annotations = annotations(ctx.agent, &ctx.config.filters);
    annotations.extend(extra_annotations);
    ObjectMeta {
        labels: Some(labels(
            ctx.agent,
            &name,
            &ctx.image(),
            component,
            &ctx.config.filters,
        )),
        annotations: (!annotations.is_empty()).then_some(annotations),
        name: Some(name),
        namespace: ctx.namespace(),
        ..Default::default()
    }
}

fn internal_traffic_policy(mode: DeploymentMode) -> &'static str {
    match mode {
        DeploymentMode::DaemonSet => "Local",
        _ => "Cluster",
    }
}

/// Service exposing every resolved receiver port; none without ports
pub fn build_service(ctx: &BuildContext<'_>) -> Option<Service> {
    if ctx.ports.is_empty() {
        return None;
    }
    Some(Service {
        metadata: metadata(ctx, ctx.name(), COMPONENT_AGENT, BTreeMap::new()),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(ctx.agent)),
            ports: Some(service_ports(ctx)),
            internal_traffic_policy: Some(internal_traffic_policy(ctx.mode()).to_string()),
            ..Default::default()
        }),
        status: None,
    })
}

/// Headless Service for per-pod DNS, annotated for a generated serving cert
pub fn build_headless_service(ctx: &BuildContext<'_>) -> Option<Service> {
    // A StatefulSet needs its governing Service even without ports
    if ctx.ports.is_empty() && ctx.agent.spec.mode != DeploymentMode::StatefulSet {
        return None;
    }
    let name = ctx.child_name("headless");
    let extra = BTreeMap::from([(
        SERVING_CERT_ANNOTATION.to_string(),
        format!("{name}-tls"),
    )]);
    Some(Service {
        metadata: metadata(ctx, name, COMPONENT_AGENT, extra),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(selector_labels(ctx.agent)),
            ports: (!ctx.ports.is_empty()).then(|| service_ports(ctx)),
            ..Default::default()
        }),
        status: None,
    })
}

/// Service for the agent's own telemetry endpoint, present in every mode
pub fn build_monitoring_service(ctx: &BuildContext<'_>) -> Service {
    Service {
        metadata: metadata(
            ctx,
            ctx.child_name("monitoring"),
            COMPONENT_MONITORING,
            BTreeMap::new(),
        ),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(ctx.agent)),
            ports: Some(vec![ServicePort {
                name: Some(MONITORING_PORT_NAME.to_string()),
                port: ctx.monitoring_port,
                protocol: Some(Protocol::Tcp.as_str().to_string()),
                target_port: Some(IntOrString::Int(ctx.monitoring_port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}
