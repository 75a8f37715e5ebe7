//! Receivers enabled in the OpenTelemetry pipeline configuration
//!
//! Only receivers referenced by at least one `service.pipelines.*.receivers`
//! list are considered enabled. The receiver type is the part of the name
//! before any `/` (`otlp/internal` is an `otlp` receiver).

use std::collections::BTreeSet;

use serde_yaml::Value;
use tracing::{debug, warn};

use super::{extract_port, PortDescriptor, PortGroup};
use crate::crd::Protocol;

/// Default port of the agent's own telemetry endpoint
pub const DEFAULT_MONITORING_PORT: i32 = 8888;

const FEATURE: &str = "otel";

/// Fixed-port receivers: (type, default port, protocol)
const SINGLE_PORT_RECEIVERS: &[(&str, i32, Protocol)] = &[
    ("zipkin", 9411, Protocol::Tcp),
    ("statsd", 8125, Protocol::Udp),
    ("awsxray", 2000, Protocol::Udp),
    ("fluentforward", 8006, Protocol::Tcp),
    ("carbon", 2003, Protocol::Tcp),
    ("collectd", 8081, Protocol::Tcp),
];

/// Multi-protocol receivers: (type, protocol key, default port, transport)
const PROTOCOL_RECEIVERS: &[(&str, &str, i32, Protocol)] = &[
    ("otlp", "grpc", 4317, Protocol::Tcp),
    ("otlp", "http", 4318, Protocol::Tcp),
    ("jaeger", "grpc", 14250, Protocol::Tcp),
    ("jaeger", "thrift_http", 14268, Protocol::Tcp),
    ("jaeger", "thrift_compact", 6831, Protocol::Udp),
    ("jaeger", "thrift_binary", 6832, Protocol::Udp),
];

fn parse_yaml(raw: &str) -> Option<Value> {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(error = %e, "Pipeline configuration is not valid YAML, ignoring it");
            None
        }
    }
}

/// Port groups for every receiver wired into a pipeline
///
/// Each port is its own group; receivers in the pipeline file never register
/// atomically.
pub fn parse_collector_config(raw: &str) -> Vec<PortGroup> {
    let Some(doc) = parse_yaml(raw) else {
        return Vec::new();
    };
    let Some(receivers) = doc.get("receivers").and_then(Value::as_mapping) else {
        return Vec::new();
    };
    let enabled = enabled_receivers(&doc);

    let mut groups = Vec::new();
    for (key, config) in receivers {
        let Some(name) = key.as_str() else { continue };
        if !enabled.contains(name) {
            debug!(receiver = name, "Receiver not referenced by any pipeline");
            continue;
        }
        groups.extend(receiver_ports(name, config).into_iter().map(|p| vec![p]));
    }
    groups
}

fn enabled_receivers(doc: &Value) -> BTreeSet<String> {
    doc.get("service")
        .and_then(|s| s.get("pipelines"))
        .and_then(Value::as_mapping)
        .into_iter()
        .flat_map(|pipelines| pipelines.values())
        .filter_map(|pipeline| pipeline.get("receivers").and_then(Value::as_sequence))
        .flatten()
        .filter_map(|r| r.as_str().map(str::to_string))
        .collect()
}

fn endpoint_port(config: &Value) -> Option<i32> {
    config
        .get("endpoint")
        .and_then(Value::as_str)
        .and_then(extract_port)
}

fn receiver_ports(name: &str, config: &Value) -> Vec<PortDescriptor> {
    let kind = name.split('/').next().unwrap_or(name);
    let base = name.replace('/', "-");

    if PROTOCOL_RECEIVERS.iter().any(|(k, ..)| *k == kind) {
        let protocols = config.get("protocols");
        return PROTOCOL_RECEIVERS
            .iter()
            .filter(|(k, ..)| *k == kind)
            .filter_map(|(_, proto, default, transport)| {
                let block = protocols?.get(*proto)?;
                let port = endpoint_port(block).unwrap_or(*default);
                let suffix = proto.replace('_', "-");
                Some(PortDescriptor::new(
                    &format!("{base}-{suffix}"),
                    port,
                    *transport,
                    FEATURE,
                ))
            })
            .collect();
    }

    if let Some((_, default, transport)) = SINGLE_PORT_RECEIVERS.iter().find(|(k, ..)| *k == kind)
    {
        let port = endpoint_port(config).unwrap_or(*default);
        return vec![PortDescriptor::new(&base, port, *transport, FEATURE)];
    }

    match endpoint_port(config) {
        Some(port) => vec![PortDescriptor::new(&base, port, Protocol::Tcp, FEATURE)],
        None => {
            debug!(receiver = name, "Receiver exposes no port");
            Vec::new()
        }
    }
}

/// Port of the agent's self-telemetry endpoint
///
/// Read from `service.telemetry.metrics.address`, falling back to 8888.
pub fn monitoring_port(otel_config: Option<&str>) -> i32 {
    otel_config
        .filter(|c| !c.trim().is_empty())
        .and_then(parse_yaml)
        .and_then(|doc| {
            doc.get("service")?
                .get("telemetry")?
                .get("metrics")?
                .get("address")?
                .as_str()
                .and_then(extract_port)
        })
        .unwrap_or(DEFAULT_MONITORING_PORT)
}
