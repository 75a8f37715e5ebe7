//! End-to-end check of the public builder API: a custom resource as a user
//! would write it, through port resolution, to the full desired object set.
//!
//! Run with: `cargo test --test agent_manifests`

use cwagent_operator::config::OperatorConfig;
use cwagent_operator::crd::AmazonCloudWatchAgent;
use cwagent_operator::manifests::{build_desired_objects, BuildContext, ObjectKind};
use cwagent_operator::ports::PortResolver;
use serde_json::json;

const AGENT_YAML: &str = r#"
apiVersion: cloudwatch.aws.amazon.com/v1alpha1
kind: AmazonCloudWatchAgent
metadata:
  name: cloudwatch-agent
  namespace: amazon-cloudwatch
  uid: 6a1b2c3d
spec:
  mode: DaemonSet
  hostNetwork: true
  config: |
    {
      "logs": {"metrics_collected": {"emf": {}, "application_signals": {}}},
      "traces": {"traces_collected": {"xray": {}}}
    }
  otelConfig: |
    receivers:
      otlp:
        protocols:
          grpc: {}
    service:
      pipelines:
        traces:
          receivers: [otlp]
  ports:
    - name: custom-metrics
      port: 9100
"#;

fn agent() -> AmazonCloudWatchAgent {
    serde_yaml::from_str(AGENT_YAML).expect("valid agent manifest")
}

#[test]
fn daemonset_agent_resolves_ports_and_objects() {
    let agent = agent();
    agent.spec.validate().expect("spec is valid");

    let config = OperatorConfig::default();
    let ctx = BuildContext::new(&agent, &config, &PortResolver::default());

    let ports: Vec<(&str, i32, &str)> = ctx
        .ports
        .iter()
        .map(|p| (p.name.as_str(), p.port, p.protocol.as_str()))
        .collect();
    // xray loses port 2000 to application signals; the pipeline's OTLP
    // receiver takes 4317 since the agent config does not claim it
    assert_eq!(
        ports,
        vec![
            ("appsig-xray", 2000, "TCP"),
            ("appsig-grpc", 4315, "TCP"),
            ("appsig-http", 4316, "TCP"),
            ("otlp-grpc", 4317, "TCP"),
            ("custom-metrics", 9100, "TCP"),
            ("emf-tcp", 25888, "TCP"),
            ("emf-udp", 25888, "UDP"),
        ]
    );

    let objects = build_desired_objects(&ctx).expect("objects build");
    let summary: Vec<(ObjectKind, &str)> = objects.iter().map(|o| (o.kind, o.name())).collect();
    assert_eq!(
        summary,
        vec![
            (ObjectKind::DaemonSet, "cloudwatch-agent"),
            (ObjectKind::ConfigMap, "cloudwatch-agent"),
            (ObjectKind::ConfigMap, "cloudwatch-agent-otel"),
            (ObjectKind::ServiceAccount, "cloudwatch-agent"),
            (ObjectKind::Service, "cloudwatch-agent"),
            (ObjectKind::Service, "cloudwatch-agent-headless"),
            (ObjectKind::Service, "cloudwatch-agent-monitoring"),
        ]
    );

    let daemonset = &objects[0].object.data;
    assert_eq!(daemonset["spec"]["template"]["spec"]["hostNetwork"], json!(true));
    assert_eq!(
        daemonset["spec"]["template"]["spec"]["dnsPolicy"],
        json!("ClusterFirstWithHostNet")
    );
    assert_eq!(
        daemonset["spec"]["selector"]["matchLabels"]["app.kubernetes.io/instance"],
        json!("amazon-cloudwatch.cloudwatch-agent")
    );
}

#[test]
fn rebuilding_is_byte_identical() {
    let agent = agent();
    let config = OperatorConfig::default();
    let resolver = PortResolver::default();

    let render = || -> Vec<String> {
        let ctx = BuildContext::new(&agent, &config, &resolver);
        build_desired_objects(&ctx)
            .unwrap()
            .iter()
            .map(|o| o.to_json().unwrap())
            .collect()
    };
    assert_eq!(render(), render());
}
