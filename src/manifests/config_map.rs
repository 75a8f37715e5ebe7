//! Agent configuration ConfigMaps

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::labels::{annotations, labels, COMPONENT_AGENT};
use super::BuildContext;

/// Key holding the agent JSON
pub const AGENT_CONFIG_KEY: &str = "cwagentconfig.json";
/// Key holding the OpenTelemetry pipeline YAML
pub const OTEL_CONFIG_KEY: &str = "cwagentotelconfig.yaml";

fn config_map(ctx: &BuildContext<'_>, name: String, key: &str, value: &str) -> ConfigMap {
    let annotations = annotations(ctx.agent, &ctx.config.filters);
    ConfigMap {
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
        data: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
        ..Default::default()
    }
}

/// ConfigMap carrying the agent JSON, always present
pub fn build_config_map(ctx: &BuildContext<'_>) -> ConfigMap {
    config_map(ctx, ctx.name(), AGENT_CONFIG_KEY, &ctx.agent.spec.config)
}

/// ConfigMap carrying the pipeline YAML, only when one is set
pub fn build_otel_config_map(ctx: &BuildContext<'_>) -> Option<ConfigMap> {
    let otel = ctx.agent.spec.otel_config.as_deref()?;
    if otel.trim().is_empty() {
        return None;
    }
    Some(config_map(ctx, ctx.child_name("otel"), OTEL_CONFIG_KEY, otel))
}
