//! The narrow slice of the Kubernetes API the reconciler depends on
//!
//! [`Cluster`] is object-safe so the engine can be driven by the real API
//! server in production and by an in-memory store in tests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::core::DynamicObject;
use kube::{Client, Resource, ResourceExt};
use serde_json::json;

use crate::config::MANAGER_NAME;
use crate::crd::{AmazonCloudWatchAgent, AmazonCloudWatchAgentStatus};
use crate::error::{Error, Result};
use crate::manifests::ObjectKind;

/// Event severities understood by the API server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

#[async_trait]
pub trait Cluster: Send + Sync {
    /// Fetch one object; `None` when it does not exist
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    /// List objects of `kind` in `namespace` matching a label selector
    ///
    /// A kind the API server does not serve lists as empty.
    async fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>>;

    async fn create(&self, kind: ObjectKind, object: &DynamicObject) -> Result<DynamicObject>;

    /// Full replace; `object` must carry the live resourceVersion
    async fn replace(&self, kind: ObjectKind, object: &DynamicObject) -> Result<DynamicObject>;

    /// Delete with background propagation; deleting a missing object succeeds
    async fn delete(&self, kind: ObjectKind, namespace: Option<&str>, name: &str) -> Result<()>;

    /// Merge-patch the status subresource of the agent
    async fn patch_status(
        &self,
        agent: &AmazonCloudWatchAgent,
        status: &AmazonCloudWatchAgentStatus,
    ) -> Result<()>;

    async fn publish_event(
        &self,
        agent: &AmazonCloudWatchAgent,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()>;
}

/// [`Cluster`] backed by a kube client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ObjectKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = kind.api_resource();
        match namespace {
            Some(ns) if kind.is_namespaced() => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(MANAGER_NAME.to_string()),
            ..Default::default()
        }
    }
}

fn object_name(object: &DynamicObject) -> Result<String> {
    object
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::ValidationError("object has no name".to_string()))
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(self.api(kind, namespace).get_opt(name).await?)
    }

    async fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>> {
        let params = ListParams::default().labels(label_selector);
        match self.api(kind, Some(namespace)).list(&params).await {
            Ok(list) => Ok(list.items),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, kind: ObjectKind, object: &DynamicObject) -> Result<DynamicObject> {
        let api = self.api(kind, object.metadata.namespace.as_deref());
        Ok(api.create(&Self::post_params(), object).await?)
    }

    async fn replace(&self, kind: ObjectKind, object: &DynamicObject) -> Result<DynamicObject> {
        let api = self.api(kind, object.metadata.namespace.as_deref());
        let name = object_name(object)?;
        Ok(api.replace(&name, &Self::post_params(), object).await?)
    }

    async fn delete(&self, kind: ObjectKind, namespace: Option<&str>, name: &str) -> Result<()> {
        match self
            .api(kind, namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_status(
        &self,
        agent: &AmazonCloudWatchAgent,
        status: &AmazonCloudWatchAgentStatus,
    ) -> Result<()> {
        let namespace = agent.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<AmazonCloudWatchAgent> = Api::namespaced(self.client.clone(), &namespace);
        let patch = json!({ "status": status });

        api.patch_status(
            &agent.name_any(),
            &PatchParams::apply(MANAGER_NAME),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn publish_event(
        &self,
        agent: &AmazonCloudWatchAgent,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        let namespace = agent.namespace().unwrap_or_else(|| "default".to_string());
        let events: Api<Event> = Api::namespaced(self.client.clone(), &namespace);

        let time = chrono::Utc::now();
        let event = Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", agent.name_any())),
                ..Default::default()
            },
            type_: Some(event_type.as_str().to_string()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            involved_object: agent.object_ref(&()),
            reporting_component: Some(MANAGER_NAME.to_string()),
            first_timestamp: Some(Time(time)),
            last_timestamp: Some(Time(time)),
            count: Some(1),
            ..Default::default()
        };

        events.create(&PostParams::default(), &event).await?;
        Ok(())
    }
}
