//! Unit tests for AmazonCloudWatchAgentSpec validation and wire format

#[cfg(test)]
mod agent_spec_validation {
    use crate::crd::{
        AmazonCloudWatchAgentSpec, AutoscalerSpec, DeploymentMode, IngressConfig,
        IngressRuleType, PodDisruptionBudgetSpec, PortOverride, Protocol,
    };

    fn spec(mode: DeploymentMode) -> AmazonCloudWatchAgentSpec {
        AmazonCloudWatchAgentSpec {
            mode,
            config: "{}".to_string(),
            replicas: 1,
            ..Default::default()
        }
    }

    fn fields(spec: &AmazonCloudWatchAgentSpec) -> Vec<String> {
        spec.validate()
            .err()
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.field)
            .collect()
    }

    #[test]
    fn test_minimal_spec_is_valid() {
        for mode in [
            DeploymentMode::Deployment,
            DeploymentMode::StatefulSet,
            DeploymentMode::DaemonSet,
            DeploymentMode::Sidecar,
        ] {
            assert!(spec(mode).validate().is_ok(), "{mode} should be valid");
        }
    }

    #[test]
    fn test_autoscaler_rejected_for_daemonset() {
        let mut s = spec(DeploymentMode::DaemonSet);
        s.autoscaler = Some(AutoscalerSpec {
            max_replicas: 3,
            ..Default::default()
        });
        assert_eq!(fields(&s), vec!["spec.autoscaler"]);
    }

    #[test]
    fn test_autoscaler_bounds() {
        let mut s = spec(DeploymentMode::Deployment);
        s.autoscaler = Some(AutoscalerSpec {
            min_replicas: Some(4),
            max_replicas: 2,
            target_cpu_utilization: Some(120),
            target_memory_utilization: None,
        });
        let f = fields(&s);
        assert!(f.contains(&"spec.autoscaler.maxReplicas".to_string()));
        assert!(f.contains(&"spec.autoscaler.targetCPUUtilization".to_string()));
    }

    #[test]
    fn test_sidecar_rejects_pdb_and_ingress() {
        let mut s = spec(DeploymentMode::Sidecar);
        s.pod_disruption_budget = Some(PodDisruptionBudgetSpec::default());
        s.ingress = Some(IngressConfig {
            hostname: Some("example.com".into()),
            ..Default::default()
        });
        let f = fields(&s);
        assert!(f.contains(&"spec.podDisruptionBudget".to_string()));
        assert!(f.contains(&"spec.ingress".to_string()));
    }

    #[test]
    fn test_subdomain_rules_need_hostname() {
        let mut s = spec(DeploymentMode::Deployment);
        s.ingress = Some(IngressConfig {
            rule_type: IngressRuleType::Subdomain,
            ..Default::default()
        });
        assert_eq!(fields(&s), vec!["spec.ingress.hostname"]);
    }

    #[test]
    fn test_override_port_range() {
        let mut s = spec(DeploymentMode::Deployment);
        s.ports = vec![PortOverride {
            name: "custom".into(),
            port: 70000,
            protocol: Protocol::Tcp,
            target_port: None,
        }];
        assert_eq!(fields(&s), vec!["spec.ports[0].port"]);
    }

    #[test]
    fn test_override_target_port_range() {
        let mut s = spec(DeploymentMode::Deployment);
        s.ports = vec![
            PortOverride {
                name: "custom".into(),
                port: 9000,
                protocol: Protocol::Tcp,
                target_port: Some(0),
            },
            PortOverride {
                name: "other".into(),
                port: 9001,
                protocol: Protocol::Tcp,
                target_port: Some(9101),
            },
        ];
        assert_eq!(fields(&s), vec!["spec.ports[0].targetPort"]);
    }

    #[test]
    fn test_spec_deserializes_from_camel_case() {
        let raw = serde_json::json!({
            "mode": "DaemonSet",
            "config": "{\"logs\":{}}",
            "otelConfig": "receivers: {}",
            "ports": [{"name": "custom", "port": 9000, "protocol": "UDP"}],
            "autoscaler": {"maxReplicas": 4, "targetCPUUtilization": 70},
            "ingress": {"type": "Route", "ruleType": "Subdomain", "hostname": "a.example"}
        });
        let s: AmazonCloudWatchAgentSpec = serde_json::from_value(raw).unwrap();
        assert_eq!(s.mode, DeploymentMode::DaemonSet);
        assert_eq!(s.replicas, 1);
        assert_eq!(s.ports[0].protocol, Protocol::Udp);
        assert_eq!(s.autoscaler.unwrap().target_cpu_utilization, Some(70));
        assert_eq!(s.otel_config.as_deref(), Some("receivers: {}"));
    }
}
