//! Receiver families recognised in the CloudWatch agent JSON configuration
//!
//! Each family owns one block of the agent document. When the block is present
//! the family's parse function returns the port groups it implies. The table
//! order is the registration order, so earlier families win port collisions.

use serde_json::Value;
use tracing::warn;

use super::{extract_port, PortDescriptor, PortGroup};
use crate::crd::Protocol;

pub const STATSD_PORT: i32 = 8125;
pub const COLLECTD_PORT: i32 = 25826;
pub const JMX_HTTP_PORT: i32 = 4314;
pub const OTLP_GRPC_PORT: i32 = 4317;
pub const OTLP_HTTP_PORT: i32 = 4318;
pub const EMF_PORT: i32 = 25888;
pub const XRAY_PORT: i32 = 2000;
pub const APP_SIGNALS_GRPC_PORT: i32 = 4315;
pub const APP_SIGNALS_HTTP_PORT: i32 = 4316;
pub const APP_SIGNALS_PROXY_PORT: i32 = 2000;

/// Parse function for one family: receives the family's config block
pub type ParseFn = fn(&Value, &'static str) -> Vec<PortGroup>;

/// One entry of the family table
#[derive(Clone, Debug)]
pub struct AgentFamily {
    pub tag: &'static str,
    /// Candidate locations of the block; the first present one is used
    pub paths: &'static [&'static [&'static str]],
    pub parse: ParseFn,
}

/// The families the operator knows about, in registration order
pub fn default_families() -> Vec<AgentFamily> {
    vec![
        AgentFamily {
            tag: "application_signals",
            paths: &[
                &["logs", "metrics_collected", "application_signals"],
                &["traces", "traces_collected", "application_signals"],
            ],
            parse: parse_application_signals,
        },
        AgentFamily {
            tag: "statsd",
            paths: &[&["metrics", "metrics_collected", "statsd"]],
            parse: parse_statsd,
        },
        AgentFamily {
            tag: "collectd",
            paths: &[&["metrics", "metrics_collected", "collectd"]],
            parse: parse_collectd,
        },
        AgentFamily {
            tag: "jmx",
            paths: &[&["metrics", "metrics_collected", "jmx"]],
            parse: parse_jmx,
        },
        AgentFamily {
            tag: "otlp-metrics",
            paths: &[&["metrics", "metrics_collected", "otlp"]],
            parse: parse_otlp,
        },
        AgentFamily {
            tag: "emf",
            paths: &[&["logs", "metrics_collected", "emf"]],
            parse: parse_emf,
        },
        AgentFamily {
            tag: "otlp-logs",
            paths: &[&["logs", "metrics_collected", "otlp"]],
            parse: parse_otlp,
        },
        AgentFamily {
            tag: "xray",
            paths: &[&["traces", "traces_collected", "xray"]],
            parse: parse_xray,
        },
        AgentFamily {
            tag: "otlp-traces",
            paths: &[&["traces", "traces_collected", "otlp"]],
            parse: parse_otlp,
        },
    ]
}

/// Walk the agent document with the given family table
///
/// A document that is not valid JSON yields no ports.
pub fn parse_agent_config(raw: &str, families: &[AgentFamily]) -> Vec<PortGroup> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let doc: Value = match serde_json::from_str(raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "Agent configuration is not valid JSON, no ports inferred");
            return Vec::new();
        }
    };

    families
        .iter()
        .filter_map(|family| {
            family
                .paths
                .iter()
                .find_map(|path| lookup(&doc, path))
                .map(|block| (family.parse)(block, family.tag))
        })
        .flatten()
        .collect()
}

fn lookup<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(doc, |node, key| node.get(key))
        .filter(|v| !v.is_null())
}

fn address_port(block: &Value, key: &str, default: i32) -> i32 {
    block
        .get(key)
        .and_then(Value::as_str)
        .and_then(extract_port)
        .unwrap_or(default)
}

fn parse_statsd(block: &Value, tag: &'static str) -> Vec<PortGroup> {
    let port = address_port(block, "service_address", STATSD_PORT);
    vec![vec![PortDescriptor::new("statsd", port, Protocol::Udp, tag)]]
}

fn parse_collectd(block: &Value, tag: &'static str) -> Vec<PortGroup> {
    let port = address_port(block, "service_address", COLLECTD_PORT);
    vec![vec![PortDescriptor::new("collectd", port, Protocol::Udp, tag)]]
}

fn parse_jmx(_block: &Value, tag: &'static str) -> Vec<PortGroup> {
    vec![vec![PortDescriptor::new(
        "jmx-http",
        JMX_HTTP_PORT,
        Protocol::Tcp,
        tag,
    )]]
}

/// gRPC and HTTP register independently; both are always enabled
fn parse_otlp(block: &Value, tag: &'static str) -> Vec<PortGroup> {
    let grpc = address_port(block, "grpc_endpoint", OTLP_GRPC_PORT);
    let http = address_port(block, "http_endpoint", OTLP_HTTP_PORT);
    vec![
        vec![PortDescriptor::new("otlp-grpc", grpc, Protocol::Tcp, tag)],
        vec![PortDescriptor::new("otlp-http", http, Protocol::Tcp, tag)],
    ]
}

fn parse_emf(block: &Value, tag: &'static str) -> Vec<PortGroup> {
    let port = address_port(block, "service_address", EMF_PORT);
    vec![vec![
        PortDescriptor::new("emf-tcp", port, Protocol::Tcp, tag),
        PortDescriptor::new("emf-udp", port, Protocol::Udp, tag),
    ]]
}

fn parse_xray(block: &Value, tag: &'static str) -> Vec<PortGroup> {
    let traces = address_port(block, "bind_address", XRAY_PORT);
    let proxy = block
        .get("tcp_proxy")
        .map(|p| address_port(p, "bind_address", XRAY_PORT))
        .unwrap_or(XRAY_PORT);
    vec![vec![
        PortDescriptor::new("aws-traces", traces, Protocol::Udp, tag),
        PortDescriptor::new("aws-proxy", proxy, Protocol::Tcp, tag),
    ]]
}

/// Application Signals listens on fixed ports
fn parse_application_signals(_block: &Value, tag: &'static str) -> Vec<PortGroup> {
    vec![vec![
        PortDescriptor::new("appsig-grpc", APP_SIGNALS_GRPC_PORT, Protocol::Tcp, tag),
        PortDescriptor::new("appsig-http", APP_SIGNALS_HTTP_PORT, Protocol::Tcp, tag),
        PortDescriptor::new("appsig-xray", APP_SIGNALS_PROXY_PORT, Protocol::Tcp, tag),
    ]]
}
