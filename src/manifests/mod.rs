//! Manifest builders for AmazonCloudWatchAgent
//!
//! Every builder is a pure function of the [`BuildContext`]: the same custom
//! resource, operator configuration and resolved ports always produce the same
//! object, byte for byte. The reconciliation engine relies on that to skip
//! writes for objects that have not changed, so nothing in here may read the
//! clock, generate random values or iterate a hash map.

mod autoscaling;
mod config_map;
mod ingress;
pub mod labels;
mod object;
mod service;
mod service_account;
mod workload;


use kube::ResourceExt;
use tracing::debug;

use crate::config::OperatorConfig;
use crate::crd::{AmazonCloudWatchAgent, DeploymentMode};
use crate::error::Result;
use crate::ports::{monitoring_port, PortDescriptor, PortResolver};

pub use autoscaling::{build_hpa, build_pdb};
pub use config_map::{build_config_map, build_otel_config_map, AGENT_CONFIG_KEY, OTEL_CONFIG_KEY};
pub use ingress::{build_ingress, build_routes};
pub use object::{DesiredObject, ObjectKind};
pub use service::{build_headless_service, build_monitoring_service, build_service};
pub use service_account::build_service_account;
pub use workload::{build_daemonset, build_deployment, build_statefulset, CONTAINER_NAME};

/// Everything a builder may look at
#[derive(Clone, Debug)]
pub struct BuildContext<'a> {
    pub agent: &'a AmazonCloudWatchAgent,
    pub config: &'a OperatorConfig,
    pub ports: Vec<PortDescriptor>,
    pub monitoring_port: i32,
}

impl<'a> BuildContext<'a> {
    /// Resolve ports for `agent` and capture the inputs for the builders
    pub fn new(
        agent: &'a AmazonCloudWatchAgent,
        config: &'a OperatorConfig,
        resolver: &PortResolver,
    ) -> Self {
        let spec = &agent.spec;
        let ports = resolver.resolve(&spec.config, spec.otel_config.as_deref(), &spec.ports);
        Self {
            agent,
            config,
            ports,
            monitoring_port: monitoring_port(spec.otel_config.as_deref()),
        }
    }

    pub fn name(&self) -> String {
        self.agent.name_any()
    }

    pub fn namespace(&self) -> Option<String> {
        self.agent.namespace()
    }

    pub fn mode(&self) -> DeploymentMode {
        self.agent.spec.mode
    }

    /// Image from the spec, else the operator default
    pub fn image(&self) -> String {
        self.agent
            .spec
            .image
            .clone()
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| self.config.default_agent_image.clone())
    }

    /// `<cr>-<suffix>`
    pub fn child_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.name(), suffix)
    }
}

/// Compute the full, ordered list of desired objects for one reconcile pass
///
/// The mode-specific workload comes first; builders for disabled features
/// contribute nothing.
pub fn build_desired_objects(ctx: &BuildContext<'_>) -> Result<Vec<DesiredObject>> {
    let mut desired = Vec::new();

    match ctx.mode() {
        DeploymentMode::Deployment => {
            desired.push(DesiredObject::from_typed(
                ObjectKind::Deployment,
                &build_deployment(ctx),
            )?);
        }
        DeploymentMode::StatefulSet => {
            desired.push(DesiredObject::from_typed(
                ObjectKind::StatefulSet,
                &build_statefulset(ctx),
            )?);
        }
        DeploymentMode::DaemonSet => {
            desired.push(DesiredObject::from_typed(
                ObjectKind::DaemonSet,
                &build_daemonset(ctx),
            )?);
        }
        DeploymentMode::Sidecar => {
            debug!(name = %ctx.name(), "Sidecar mode, no workload object");
        }
    }

    desired.push(DesiredObject::from_typed(
        ObjectKind::ConfigMap,
        &build_config_map(ctx),
    )?);
    push_some(&mut desired, ObjectKind::ConfigMap, build_otel_config_map(ctx))?;
    push_some(&mut desired, ObjectKind::ServiceAccount, build_service_account(ctx))?;
    push_some(&mut desired, ObjectKind::Service, build_service(ctx))?;
    push_some(&mut desired, ObjectKind::Service, build_headless_service(ctx))?;
    desired.push(DesiredObject::from_typed(
        ObjectKind::Service,
        &build_monitoring_service(ctx),
    )?);
    push_some(&mut desired, ObjectKind::Ingress, build_ingress(ctx))?;
    desired.extend(build_routes(ctx));
    push_some(
        &mut desired,
        ObjectKind::HorizontalPodAutoscaler,
        build_hpa(ctx),
    )?;
    push_some(&mut desired, ObjectKind::PodDisruptionBudget, build_pdb(ctx))?;

    Ok(desired)
}

fn push_some<K: serde::Serialize>(
    desired: &mut Vec<DesiredObject>,
    kind: ObjectKind,
    built: Option<K>,
) -> Result<()> {
    if let Some(obj) = built {
        desired.push(DesiredObject::from_typed(kind, &obj)?);
    }
    Ok(())
}
