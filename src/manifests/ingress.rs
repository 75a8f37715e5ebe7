//! External exposure: one Ingress with a rule per port, or one Route per port

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde_json::json;

use super::labels::{annotations, labels, COMPONENT_AGENT};
use super::{BuildContext, DesiredObject, ObjectKind};
use crate::crd::{IngressConfig, IngressRuleType, IngressType};
use crate::ports::PortDescriptor;

fn ingress_config<'a>(ctx: &'a BuildContext<'_>, type_: IngressType) -> Option<&'a IngressConfig> {
    ctx.agent
        .spec
        .ingress
        .as_ref()
        .filter(|cfg| cfg.type_ == type_ && !ctx.ports.is_empty())
}

fn metadata(ctx: &BuildContext<'_>, name: String, cfg: &IngressConfig) -> ObjectMeta {
    let mut annotations = annotations(ctx.agent, &ctx.config.filters);
    annotations.extend(cfg.annotations.clone());
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

fn subdomain(port: &PortDescriptor, hostname: &str) -> String {
    format!("{}.{}", port.name, hostname)
}

fn backend(ctx: &BuildContext<'_>, port: &PortDescriptor) -> IngressBackend {
    IngressBackend {
        service: Some(IngressServiceBackend {
            name: ctx.name(),
            port: Some(ServiceBackendPort {
                name: Some(port.name.clone()),
                number: None,
            }),
        }),
        ..Default::default()
    }
}

/// Ingress routing to the receiver Service
///
/// Path rules put every port under one host as `/<port-name>`; subdomain
/// rules give each port its own `<port-name>.<hostname>` host.
pub fn build_ingress(ctx: &BuildContext<'_>) -> Option<Ingress> {
    let cfg = ingress_config(ctx, IngressType::Ingress)?;
    let hostname = cfg.hostname.clone().filter(|h| !h.is_empty());

    let rules: Vec<IngressRule> = match cfg.rule_type {
        IngressRuleType::Path => vec![IngressRule {
            host: hostname.clone(),
            http: Some(HTTPIngressRuleValue {
                paths: ctx
                    .ports
                    .iter()
                    .map(|p| HTTPIngressPath {
                        path: Some(format!("/{}", p.name)),
                        path_type: "Prefix".to_string(),
                        backend: backend(ctx, p),
                    })
                    .collect(),
            }),
        }],
        IngressRuleType::Subdomain => {
            let hostname = hostname.as_deref()?;
            ctx.ports
                .iter()
                .map(|p| IngressRule {
                    host: Some(subdomain(p, hostname)),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: backend(ctx, p),
                        }],
                    }),
                })
                .collect()
        }
    };

    let tls = cfg.tls_secret_name.as_ref().map(|secret| {
        let hosts: Vec<String> = rules.iter().filter_map(|r| r.host.clone()).collect();
        vec![IngressTLS {
            hosts: (!hosts.is_empty()).then_some(hosts),
            secret_name: Some(secret.clone()),
        }]
    });

    Some(Ingress {
        metadata: metadata(ctx, ctx.child_name("ingress"), cfg),
        spec: Some(IngressSpec {
            ingress_class_name: cfg.ingress_class_name.clone(),
            rules: Some(rules),
            tls,
            ..Default::default()
        }),
        status: None,
    })
}

/// One OpenShift Route per exposed port
///
/// Routes have no typed binding, so they are built directly as dynamic
/// objects.
pub fn build_routes(ctx: &BuildContext<'_>) -> Vec<DesiredObject> {
    let Some(cfg) = ingress_config(ctx, IngressType::Route) else {
        return Vec::new();
    };
    let hostname = cfg.hostname.clone().unwrap_or_default();
    let api = ObjectKind::Route.api_resource();

    ctx.ports
        .iter()
        .map(|port| {
            let (host, path) = match cfg.rule_type {
                IngressRuleType::Path => (hostname.clone(), format!("/{}", port.name)),
                IngressRuleType::Subdomain => (subdomain(port, &hostname), "/".to_string()),
            };
            let mut spec = json!({
                "to": {"kind": "Service", "name": ctx.name()},
                "port": {"targetPort": port.name},
                "path": path,
                "wildcardPolicy": "None",
            });
            if !host.is_empty() {
                spec["host"] = json!(host);
            }
            if cfg.tls_secret_name.is_some() {
                spec["tls"] = json!({
                    "termination": "edge",
                    "insecureEdgeTerminationPolicy": "Redirect",
                });
            }

            let mut object = DynamicObject::new(&ctx.child_name(&port.name), &api)
                .data(json!({ "spec": spec }));
            object.metadata = metadata(ctx, ctx.child_name(&port.name), cfg);
            DesiredObject {
                kind: ObjectKind::Route,
                object,
            }
        })
        .collect()
}
