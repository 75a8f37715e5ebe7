//! Main reconciler for AmazonCloudWatchAgent resources
//!
//! Implements the controller pattern using kube-rs runtime. One pass:
//! validate, build the desired objects, apply them, prune what is no longer
//! wanted, and only then publish status.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Resource, ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use super::apply::{apply_desired_objects, MutationResult};
use super::cluster::{Cluster, EventType, KubeCluster};
use super::prune::collect_garbage;
use super::status::{compute_status, report_status};
use crate::config::OperatorConfig;
use crate::crd::AmazonCloudWatchAgent;
use crate::error::{Error, Result};
use crate::manifests::labels::owner_reference;
use crate::manifests::{build_desired_objects, BuildContext};
use crate::ports::PortResolver;
use crate::retry::RetryConfig;

/// Default periodic resync for agents that reconciled cleanly
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub config: OperatorConfig,
    pub resolver: PortResolver,
    pub retry: RetryConfig,
    pub resync_interval: Duration,
}

impl ControllerState {
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            client,
            config,
            resolver: PortResolver::default(),
            retry: RetryConfig::default(),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let agents: Api<AmazonCloudWatchAgent> = Api::all(client.clone());

    info!("Starting AmazonCloudWatchAgent controller");

    // Verify CRD exists
    match agents.list(&Default::default()).await {
        Ok(_) => info!("AmazonCloudWatchAgent CRD is available"),
        Err(e) => {
            error!(
                "AmazonCloudWatchAgent CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "AmazonCloudWatchAgent CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(agents, Config::default())
        // Watch owned resources for changes
        .owns::<Deployment>(Api::all(client.clone()), Config::default())
        .owns::<StatefulSet>(Api::all(client.clone()), Config::default())
        .owns::<DaemonSet>(Api::all(client.clone()), Config::default())
        .owns::<Service>(Api::all(client.clone()), Config::default())
        .owns::<ConfigMap>(Api::all(client.clone()), Config::default())
        .owns::<ServiceAccount>(Api::all(client.clone()), Config::default())
        .owns::<Ingress>(Api::all(client.clone()), Config::default())
        .owns::<HorizontalPodAutoscaler>(Api::all(client.clone()), Config::default())
        .owns::<PodDisruptionBudget>(Api::all(client.clone()), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// Summary of one successful pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub recreated: usize,
    pub pruned: usize,
    pub status_patched: bool,
}

impl PassReport {
    pub fn changed_anything(&self) -> bool {
        self.created + self.updated + self.recreated + self.pruned > 0
    }
}

async fn publish_event(
    cluster: &dyn Cluster,
    agent: &AmazonCloudWatchAgent,
    event_type: EventType,
    reason: &str,
    message: &str,
) {
    if let Err(e) = cluster
        .publish_event(agent, event_type, reason, message)
        .await
    {
        warn!(reason, error = %e, "Failed to publish event");
    }
}

/// One reconcile pass against `cluster`
///
/// Status is written only when every object was applied and garbage
/// collection completed; on any failure a warning event is published and
/// the previous status is left in place.
pub async fn reconcile_agent(
    cluster: &dyn Cluster,
    agent: &AmazonCloudWatchAgent,
    config: &OperatorConfig,
    resolver: &PortResolver,
    retry: &RetryConfig,
) -> Result<PassReport> {
    if let Err(errors) = agent.spec.validate() {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        publish_event(cluster, agent, EventType::Warning, "InvalidSpec", &message).await;
        return Err(Error::ValidationError(message));
    }

    let ctx = BuildContext::new(agent, config, resolver);
    debug!(ports = ctx.ports.len(), "Resolved ports");
    let desired = build_desired_objects(&ctx)?;

    let mut applied =
        apply_desired_objects(cluster, &owner_reference(agent), desired, retry).await;
    if let Err(e) = Error::from_batch(mem::take(&mut applied.errors)) {
        publish_event(
            cluster,
            agent,
            EventType::Warning,
            "ReconcileFailed",
            &e.to_string(),
        )
        .await;
        return Err(e);
    }

    let pruned = match collect_garbage(cluster, agent, &applied.reconciled_uids()).await {
        Ok(pruned) => pruned,
        Err(e) => {
            publish_event(
                cluster,
                agent,
                EventType::Warning,
                "GarbageCollectionFailed",
                &e.to_string(),
            )
            .await;
            return Err(e);
        }
    };

    let status = compute_status(cluster, &ctx).await?;
    let status_patched = report_status(cluster, agent, &status).await?;

    let report = PassReport {
        created: applied.count(MutationResult::Created),
        updated: applied.count(MutationResult::Updated),
        unchanged: applied.count(MutationResult::Unchanged),
        recreated: applied.count(MutationResult::ImmutableConflict),
        pruned,
        status_patched,
    };

    if report.changed_anything() {
        let message = format!(
            "created {}, updated {}, recreated {}, pruned {}",
            report.created, report.updated, report.recreated, report.pruned
        );
        publish_event(cluster, agent, EventType::Normal, "Reconciled", &message).await;
    }

    Ok(report)
}

/// The main reconciliation function
///
/// This function is called whenever:
/// - An AmazonCloudWatchAgent is created, updated, or deleted
/// - An owned resource changes
/// - The requeue timer expires
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<AmazonCloudWatchAgent>, ctx: Arc<ControllerState>) -> Result<Action> {
    if obj.meta().deletion_timestamp.is_some() {
        // Owner references take care of the children
        debug!("Agent is being deleted");
        return Ok(Action::await_change());
    }

    let cluster = KubeCluster::new(ctx.client.clone());
    let report = reconcile_agent(&cluster, &obj, &ctx.config, &ctx.resolver, &ctx.retry).await?;

    info!(
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        recreated = report.recreated,
        pruned = report.pruned,
        "Reconcile pass complete"
    );

    // Requeue promptly so objects deleted for recreation come back
    if report.recreated > 0 {
        return Ok(Action::requeue(Duration::from_secs(1)));
    }
    Ok(Action::requeue(ctx.resync_interval))
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(
    agent: Arc<AmazonCloudWatchAgent>,
    error: &Error,
    _ctx: Arc<ControllerState>,
) -> Action {
    error!("Reconciliation error for {}: {:?}", agent.name_any(), error);

    // Use shorter retry for retriable errors
    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}
