use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::labels::{annotations, labels, COMPONENT_AGENT};
use super::BuildContext;

/// Name of the ServiceAccount the agent pods run as
pub(crate) fn service_account_name(ctx: &BuildContext<'_>) -> String {
    ctx.agent
        .spec
        .service_account
        .clone()
        .filter(|sa| !sa.is_empty())
        .unwrap_or_else(|| ctx.name())
}

/// Generated ServiceAccount; none when the spec points at an existing one
pub fn build_service_account(ctx: &BuildContext<'_>) -> Option<ServiceAccount> {
    if ctx
        .agent
        .spec
        .service_account
        .as_deref()
        .is_some_and(|sa| !sa.is_empty())
    {
        return None;
    }

    let name = service_account_name(ctx);
    let annotations = annotations(ctx.agent, &ctx.config.filters);
    Some(ServiceAccount {
        metadata: ObjectMeta {
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
        },
        ..Default::default()
    })
}
