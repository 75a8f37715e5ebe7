//! Tests for end-to-end port resolution
//!
//! Run with: `cargo test ports_test`

use serde_json::json;

use super::*;
use crate::crd::{PortOverride, Protocol};

fn resolve(agent: serde_json::Value) -> Vec<PortDescriptor> {
    PortResolver::default().resolve(&agent.to_string(), None, &[])
}

fn summary(ports: &[PortDescriptor]) -> Vec<(&str, i32, Protocol)> {
    ports
        .iter()
        .map(|p| (p.name.as_str(), p.port, p.protocol))
        .collect()
}

#[test]
fn test_emf_yields_tcp_and_udp() {
    let ports = resolve(json!({"logs": {"metrics_collected": {"emf": {}}}}));
    assert_eq!(
        summary(&ports),
        vec![
            ("emf-tcp", 25888, Protocol::Tcp),
            ("emf-udp", 25888, Protocol::Udp),
        ]
    );
}

#[test]
fn test_application_signals_group() {
    for agent in [
        json!({"logs": {"metrics_collected": {"application_signals": {}}}}),
        json!({"traces": {"traces_collected": {"application_signals": {}}}}),
    ] {
        let ports = resolve(agent);
        assert_eq!(
            summary(&ports),
            vec![
                ("appsig-xray", 2000, Protocol::Tcp),
                ("appsig-grpc", 4315, Protocol::Tcp),
                ("appsig-http", 4316, Protocol::Tcp),
            ]
        );
    }
}

#[test]
fn test_application_signals_wins_over_xray() {
    // Keys deliberately listed with xray first; registration follows the table.
    let ports = resolve(json!({
        "traces": {"traces_collected": {
            "xray": {},
            "application_signals": {}
        }}
    }));
    assert!(ports.iter().all(|p| p.feature == "application_signals"));
    assert_eq!(ports.len(), 3);
}

#[test]
fn test_no_duplicate_number_protocol_pairs() {
    let ports = resolve(json!({
        "metrics": {"metrics_collected": {
            "statsd": {},
            "collectd": {"service_address": "udp://127.0.0.1:8125"},
            "otlp": {}
        }},
        "logs": {"metrics_collected": {"emf": {}, "otlp": {}}},
        "traces": {"traces_collected": {"xray": {}, "otlp": {}}}
    }));
    let mut keys: Vec<_> = ports.iter().map(|p| (p.port, p.protocol)).collect();
    let before = keys.len();
    keys.dedup();
    assert_eq!(before, keys.len());

    // statsd registered first and keeps 8125; collectd was dropped
    assert!(ports.iter().any(|p| p.name == "statsd" && p.port == 8125));
    assert!(!ports.iter().any(|p| p.name == "collectd"));
    // otlp from logs and traces collapse onto the metrics registration
    assert_eq!(ports.iter().filter(|p| p.port == 4317).count(), 1);
    assert_eq!(ports.iter().find(|p| p.port == 4317).unwrap().feature, "otlp-metrics");
}

#[test]
fn test_name_collision_falls_back_to_number() {
    let ports = resolve(json!({
        "metrics": {"metrics_collected": {"otlp": {}}},
        "traces": {"traces_collected": {"otlp": {
            "grpc_endpoint": "0.0.0.0:5317",
            "http_endpoint": "0.0.0.0:5318"
        }}}
    }));
    let names: Vec<_> = ports.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["otlp-grpc", "otlp-http", "port-5317", "port-5318"]);
}

#[test]
fn test_fallback_collision_drops_port() {
    let overrides = vec![PortOverride {
        name: "port-5317".into(),
        port: 9000,
        protocol: Protocol::Tcp,
        target_port: None,
    }];
    let agent = json!({
        "metrics": {"metrics_collected": {"otlp": {}}},
        "traces": {"traces_collected": {"otlp": {"grpc_endpoint": ":5317"}}}
    });
    let ports = PortResolver::default().resolve(&agent.to_string(), None, &overrides);
    assert!(!ports.iter().any(|p| p.port == 5317));
    assert!(ports.iter().any(|p| p.name == "port-5317" && p.port == 9000));
}

#[test]
fn test_override_replaces_same_name() {
    let overrides = vec![PortOverride {
        name: "statsd".into(),
        port: 18125,
        protocol: Protocol::Udp,
        target_port: Some(8125),
    }];
    let agent = json!({"metrics": {"metrics_collected": {"statsd": {}}}});
    let ports = PortResolver::default().resolve(&agent.to_string(), None, &overrides);
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].port, 18125);
    assert_eq!(ports[0].container_port(), 8125);
    assert_eq!(ports[0].feature, OVERRIDE_FEATURE);
}

#[test]
fn test_override_with_out_of_range_target_port_is_dropped() {
    let overrides = vec![
        PortOverride {
            name: "custom".into(),
            port: 9000,
            protocol: Protocol::Tcp,
            target_port: Some(0),
        },
        PortOverride {
            name: "too-high".into(),
            port: 9001,
            protocol: Protocol::Tcp,
            target_port: Some(70000),
        },
    ];
    let agent = json!({"metrics": {"metrics_collected": {"statsd": {}}}});
    let ports = PortResolver::default().resolve(&agent.to_string(), None, &overrides);
    assert_eq!(summary(&ports), vec![("statsd", 8125, Protocol::Udp)]);
}

#[test]
fn test_override_replaces_same_number_and_protocol() {
    let overrides = vec![PortOverride {
        name: "my-emf".into(),
        port: 25888,
        protocol: Protocol::Tcp,
        target_port: None,
    }];
    let agent = json!({"logs": {"metrics_collected": {"emf": {}}}});
    let ports = PortResolver::default().resolve(&agent.to_string(), None, &overrides);
    assert_eq!(
        summary(&ports),
        vec![
            ("my-emf", 25888, Protocol::Tcp),
            ("emf-udp", 25888, Protocol::Udp),
        ]
    );
}

#[test]
fn test_malformed_agent_config_yields_empty_set() {
    let ports = PortResolver::default().resolve("{not json", None, &[]);
    assert!(ports.is_empty());
}

#[test]
fn test_pipeline_ports_merge_without_collisions() {
    let agent = json!({"metrics": {"metrics_collected": {"otlp": {}}}});
    let pipeline = r#"
receivers:
  otlp:
    protocols:
      grpc:
  zipkin:
service:
  pipelines:
    traces:
      receivers: [otlp, zipkin]
"#;
    let ports = PortResolver::default().resolve(&agent.to_string(), Some(pipeline), &[]);
    assert_eq!(
        summary(&ports),
        vec![
            ("otlp-grpc", 4317, Protocol::Tcp),
            ("otlp-http", 4318, Protocol::Tcp),
            ("zipkin", 9411, Protocol::Tcp),
        ]
    );
    assert_eq!(ports[0].feature, "otlp-metrics");
}

#[test]
fn test_long_names_are_truncated() {
    let pipeline = r#"
receivers:
  jaeger:
    protocols:
      thrift_compact:
      thrift_binary:
service:
  pipelines:
    traces:
      receivers: [jaeger]
"#;
    let ports = PortResolver::default().resolve("", Some(pipeline), &[]);
    let names: Vec<_> = ports.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["jaeger-thrift-c", "jaeger-thrift-b"]);
}

#[test]
fn test_invalid_names_are_dropped() {
    let overrides = vec![
        PortOverride {
            name: "Bad_Name".into(),
            port: 9001,
            ..Default::default()
        },
        PortOverride {
            name: "good".into(),
            port: 9002,
            ..Default::default()
        },
    ];
    let ports = PortResolver::default().resolve("{}", None, &overrides);
    assert_eq!(summary(&ports), vec![("good", 9002, Protocol::Tcp)]);
}

#[test]
fn test_custom_family_table() {
    let families: Vec<AgentFamily> = default_families()
        .into_iter()
        .filter(|f| f.tag == "emf")
        .collect();
    let agent = json!({
        "metrics": {"metrics_collected": {"statsd": {}}},
        "logs": {"metrics_collected": {"emf": {}}}
    });
    let ports = PortResolver::new(families).resolve(&agent.to_string(), None, &[]);
    assert!(ports.iter().all(|p| p.feature == "emf"));
}

#[test]
fn test_resolution_is_deterministic() {
    let agent = json!({
        "metrics": {"metrics_collected": {"statsd": {}, "jmx": {}, "otlp": {}}},
        "logs": {"metrics_collected": {"emf": {}}},
        "traces": {"traces_collected": {"xray": {}}}
    })
    .to_string();
    let resolver = PortResolver::default();
    assert_eq!(resolver.resolve(&agent, None, &[]), resolver.resolve(&agent, None, &[]));
}

#[test]
fn test_port_name_rules() {
    assert!(is_valid_port_name("otlp-grpc"));
    assert!(!is_valid_port_name("8080"));
    assert!(!is_valid_port_name("-lead"));
    assert!(!is_valid_port_name("trail-"));
    assert!(!is_valid_port_name("dou--ble"));
    assert!(!is_valid_port_name("UPPER"));
    assert!(!is_valid_port_name("sixteen-chars-xx"));
}

#[test]
fn test_extract_port() {
    assert_eq!(extract_port(":8125"), Some(8125));
    assert_eq!(extract_port("udp://[::1]:25826"), Some(25826));
    assert_eq!(extract_port("0.0.0.0:99999"), None);
    assert_eq!(extract_port("localhost"), None);
}
