//! Kind-erased desired objects
//!
//! Builders produce typed k8s-openapi values; the reconciliation engine works
//! on [`DesiredObject`] so that one code path handles every kind.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use serde::Serialize;

use crate::error::Result;

/// Every kind the operator can create
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    ConfigMap,
    ServiceAccount,
    Service,
    Deployment,
    StatefulSet,
    DaemonSet,
    Ingress,
    Route,
    HorizontalPodAutoscaler,
    PodDisruptionBudget,
    ClusterRole,
    ClusterRoleBinding,
}

impl ObjectKind {
    /// Namespaced kinds, in the order the garbage collector lists them
    pub const NAMESPACED: [ObjectKind; 10] = [
        ObjectKind::ConfigMap,
        ObjectKind::ServiceAccount,
        ObjectKind::Service,
        ObjectKind::Deployment,
        ObjectKind::StatefulSet,
        ObjectKind::DaemonSet,
        ObjectKind::Ingress,
        ObjectKind::Route,
        ObjectKind::HorizontalPodAutoscaler,
        ObjectKind::PodDisruptionBudget,
    ];

    pub fn api_resource(&self) -> ApiResource {
        match self {
            ObjectKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
            ObjectKind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
            ObjectKind::Service => ApiResource::erase::<Service>(&()),
            ObjectKind::Deployment => ApiResource::erase::<Deployment>(&()),
            ObjectKind::StatefulSet => ApiResource::erase::<StatefulSet>(&()),
            ObjectKind::DaemonSet => ApiResource::erase::<DaemonSet>(&()),
            ObjectKind::Ingress => ApiResource::erase::<Ingress>(&()),
            ObjectKind::Route => ApiResource::from_gvk_with_plural(
                &GroupVersionKind::gvk("route.openshift.io", "v1", "Route"),
                "routes",
            ),
            ObjectKind::HorizontalPodAutoscaler => {
                ApiResource::erase::<HorizontalPodAutoscaler>(&())
            }
            ObjectKind::PodDisruptionBudget => ApiResource::erase::<PodDisruptionBudget>(&()),
            ObjectKind::ClusterRole => ApiResource::erase::<ClusterRole>(&()),
            ObjectKind::ClusterRoleBinding => ApiResource::erase::<ClusterRoleBinding>(&()),
        }
    }

    /// Cluster-scoped kinds are never given an owner reference
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ObjectKind::ClusterRole | ObjectKind::ClusterRoleBinding)
    }

    /// Fields the API server refuses to change in place, as JSON pointers
    pub fn immutable_fields(&self) -> &'static [&'static str] {
        match self {
            ObjectKind::Service => &["/spec/clusterIP", "/spec/clusterIPs"],
            ObjectKind::Deployment | ObjectKind::DaemonSet => &["/spec/selector"],
            ObjectKind::StatefulSet => &[
                "/spec/selector",
                "/spec/serviceName",
                "/spec/volumeClaimTemplates",
                "/spec/podManagementPolicy",
            ],
            _ => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::ServiceAccount => "ServiceAccount",
            ObjectKind::Service => "Service",
            ObjectKind::Deployment => "Deployment",
            ObjectKind::StatefulSet => "StatefulSet",
            ObjectKind::DaemonSet => "DaemonSet",
            ObjectKind::Ingress => "Ingress",
            ObjectKind::Route => "Route",
            ObjectKind::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            ObjectKind::PodDisruptionBudget => "PodDisruptionBudget",
            ObjectKind::ClusterRole => "ClusterRole",
            ObjectKind::ClusterRoleBinding => "ClusterRoleBinding",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully formed target object
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredObject {
    pub kind: ObjectKind,
    pub object: DynamicObject,
}

impl DesiredObject {
    /// Erase a typed object
    pub fn from_typed<K: Serialize>(kind: ObjectKind, typed: &K) -> Result<Self> {
        let value = serde_json::to_value(typed)?;
        Ok(Self {
            kind,
            object: serde_json::from_value(value)?,
        })
    }

    pub fn name(&self) -> &str {
        self.object.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.object.metadata.namespace.as_deref()
    }

    /// `Kind/namespace/name`, for logs and error messages
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.kind,
            self.namespace().unwrap_or("-"),
            self.name()
        )
    }

    /// Canonical serialized form, used to compare builder output
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.object)?)
    }
}
