//! Agent workloads: Deployment, StatefulSet or DaemonSet
//!
//! All three share one pod template; they differ only in the controller
//! wrapped around it.

use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{
    ConfigMapProjection, Container, ContainerPort, EnvVar, EnvVarSource, KeyToPath,
    ObjectFieldSelector, PodSpec, PodTemplateSpec, ProjectedVolumeSource, Volume, VolumeMount,
    VolumeProjection,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::config_map::{AGENT_CONFIG_KEY, OTEL_CONFIG_KEY};
use super::labels::{
    annotations, config_hash, labels, selector_labels, COMPONENT_AGENT, CONFIG_HASH_ANNOTATION,
};
use super::service_account::service_account_name;
use super::BuildContext;

pub const CONTAINER_NAME: &str = "cloudwatch-agent";
pub const CONFIG_VOLUME: &str = "cwagentconfig";
pub const CONFIG_MOUNT_PATH: &str = "/etc/cwagentconfig";

fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn config_volume(ctx: &BuildContext<'_>) -> Volume {
    let mut sources = vec![VolumeProjection {
        config_map: Some(ConfigMapProjection {
            name: Some(ctx.name()),
            items: Some(vec![KeyToPath {
                key: AGENT_CONFIG_KEY.to_string(),
                path: AGENT_CONFIG_KEY.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }];
    if ctx
        .agent
        .spec
        .otel_config
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty())
    {
        sources.push(VolumeProjection {
            config_map: Some(ConfigMapProjection {
                name: Some(ctx.child_name("otel")),
                items: Some(vec![KeyToPath {
                    key: OTEL_CONFIG_KEY.to_string(),
                    path: OTEL_CONFIG_KEY.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    Volume {
        name: CONFIG_VOLUME.to_string(),
        projected: Some(ProjectedVolumeSource {
            sources: Some(sources),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_container(ctx: &BuildContext<'_>) -> Container {
    let spec = &ctx.agent.spec;

    let mut env = vec![
        field_env("K8S_NODE_NAME", "spec.nodeName"),
        field_env("HOST_IP", "status.hostIP"),
        field_env("HOST_NAME", "spec.nodeName"),
        field_env("K8S_NAMESPACE", "metadata.namespace"),
    ];
    env.extend(spec.env.iter().cloned());

    let ports: Vec<ContainerPort> = ctx
        .ports
        .iter()
        .map(|p| ContainerPort {
            name: Some(p.name.clone()),
            container_port: p.container_port(),
            protocol: Some(p.protocol.as_str().to_string()),
            ..Default::default()
        })
        .collect();

    Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(ctx.image()),
        image_pull_policy: spec.image_pull_policy.clone(),
        env: Some(env),
        ports: (!ports.is_empty()).then_some(ports),
        resources: spec.resources.clone(),
        volume_mounts: Some(vec![VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn build_pod_template(ctx: &BuildContext<'_>) -> PodTemplateSpec {
    let spec = &ctx.agent.spec;

    let mut pod_annotations = annotations(ctx.agent, &ctx.config.filters);
    pod_annotations.extend(spec.pod_annotations.clone());
    pod_annotations.insert(CONFIG_HASH_ANNOTATION.to_string(), config_hash(ctx.agent));
    pod_annotations.insert("prometheus.io/scrape".to_string(), "true".to_string());
    pod_annotations.insert(
        "prometheus.io/port".to_string(),
        ctx.monitoring_port.to_string(),
    );
    pod_annotations.insert("prometheus.io/path".to_string(), "/metrics".to_string());

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels(
                ctx.agent,
                &ctx.name(),
                &ctx.image(),
                COMPONENT_AGENT,
                &ctx.config.filters,
            )),
            annotations: Some(pod_annotations),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(service_account_name(ctx)),
            containers: vec![build_container(ctx)],
            volumes: Some(vec![config_volume(ctx)]),
            host_network: spec.host_network.then_some(true),
            dns_policy: spec
                .host_network
                .then(|| "ClusterFirstWithHostNet".to_string()),
            node_selector: (!spec.node_selector.is_empty()).then(|| spec.node_selector.clone()),
            tolerations: (!spec.tolerations.is_empty()).then(|| spec.tolerations.clone()),
            priority_class_name: spec.priority_class_name.clone(),
            ..Default::default()
        }),
    }
}

fn workload_metadata(ctx: &BuildContext<'_>) -> ObjectMeta {
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

fn selector(ctx: &BuildContext<'_>) -> LabelSelector {
    LabelSelector {
        match_labels: Some(selector_labels(ctx.agent)),
        ..Default::default()
    }
}

pub fn build_deployment(ctx: &BuildContext<'_>) -> Deployment {
    Deployment {
        metadata: workload_metadata(ctx),
        spec: Some(DeploymentSpec {
            replicas: Some(ctx.agent.spec.replicas),
            selector: selector(ctx),
            template: build_pod_template(ctx),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn build_statefulset(ctx: &BuildContext<'_>) -> StatefulSet {
    StatefulSet {
        metadata: workload_metadata(ctx),
        spec: Some(StatefulSetSpec {
            replicas: Some(ctx.agent.spec.replicas),
            selector: selector(ctx),
            service_name: ctx.child_name("headless"),
            pod_management_policy: Some("Parallel".to_string()),
            template: build_pod_template(ctx),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn build_daemonset(ctx: &BuildContext<'_>) -> DaemonSet {
    DaemonSet {
        metadata: workload_metadata(ctx),
        spec: Some(DaemonSetSpec {
            selector: selector(ctx),
            template: build_pod_template(ctx),
            ..Default::default()
        }),
        status: None,
    }
}

