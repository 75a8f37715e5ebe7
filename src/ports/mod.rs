//! Port inference from agent configuration
//!
//! The agent configuration does not list ports directly. Which receivers are
//! enabled is implied by which blocks are present, and each receiver either
//! names its listen address or falls back to a well-known default. This module
//! turns that implicit description into an explicit, de-duplicated port list.
//!
//! Resolution runs in three stages:
//!
//! 1. the agent JSON is walked with the family table from [`agent_config`];
//! 2. receivers enabled in the optional pipeline YAML are added by
//!    [`collector_config`] where they do not collide;
//! 3. user overrides from the spec replace derived ports of the same name or
//!    the same number/protocol pair.
//!
//! Every stage is lossy: duplicates are dropped with a log line and never fail
//! the reconcile pass.

pub mod agent_config;
pub mod collector_config;

#[cfg(test)]
mod ports_test;

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::crd::{PortOverride, Protocol};

pub use agent_config::{default_families, AgentFamily};
pub use collector_config::monitoring_port;

/// Maximum length of a Service/container port name
pub const MAX_PORT_NAME_LEN: usize = 15;

/// Feature tag recorded on ports that came from `spec.ports`
pub const OVERRIDE_FEATURE: &str = "override";

/// A single exposed port and the feature that asked for it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    pub port: i32,
    pub protocol: Protocol,
    /// Container port, when it differs from `port`
    pub target_port: Option<i32>,
    pub feature: String,
}

impl PortDescriptor {
    pub fn new(name: &str, port: i32, protocol: Protocol, feature: &str) -> Self {
        Self {
            name: name.to_string(),
            port,
            protocol,
            target_port: None,
            feature: feature.to_string(),
        }
    }

    /// Port the container actually listens on
    pub fn container_port(&self) -> i32 {
        self.target_port.unwrap_or(self.port)
    }

    fn key(&self) -> (i32, Protocol) {
        (self.port, self.protocol)
    }
}

impl From<&PortOverride> for PortDescriptor {
    fn from(o: &PortOverride) -> Self {
        Self {
            name: o.name.clone(),
            port: o.port,
            protocol: o.protocol,
            target_port: o.target_port,
            feature: OVERRIDE_FEATURE.to_string(),
        }
    }
}

/// Ports registered together or not at all
pub type PortGroup = Vec<PortDescriptor>;

/// Number-keyed accumulator; the first claim on a port number wins
#[derive(Debug, Default)]
pub struct PortRegistry {
    claimed: BTreeSet<i32>,
    ports: Vec<PortDescriptor>,
}

impl PortRegistry {
    /// Register a group atomically
    ///
    /// If any member's number is already claimed the whole group is dropped.
    /// Members of one group may share a number (e.g. TCP and UDP on 25888).
    pub fn register(&mut self, group: PortGroup) -> bool {
        if let Some(taken) = group.iter().find(|p| self.claimed.contains(&p.port)) {
            let owner = self
                .ports
                .iter()
                .find(|p| p.port == taken.port)
                .map(|p| p.feature.as_str())
                .unwrap_or_default();
            info!(
                port = taken.port,
                feature = %taken.feature,
                claimed_by = owner,
                "Port already claimed by another receiver, dropping"
            );
            return false;
        }
        for port in group {
            self.claimed.insert(port.port);
            self.ports.push(port);
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn into_ports(self) -> Vec<PortDescriptor> {
        self.ports
    }
}

/// Resolves the port set implied by an agent's configuration
///
/// The family table is owned by the resolver so that registration order is
/// explicit and can be replaced in tests.
#[derive(Clone, Debug)]
pub struct PortResolver {
    families: Vec<AgentFamily>,
}

impl Default for PortResolver {
    fn default() -> Self {
        Self::new(default_families())
    }
}

impl PortResolver {
    pub fn new(families: Vec<AgentFamily>) -> Self {
        Self { families }
    }

    /// Resolve the final, validated port list
    ///
    /// Output is sorted by number, protocol and name so that repeated calls
    /// with the same input are identical.
    pub fn resolve(
        &self,
        agent_config: &str,
        otel_config: Option<&str>,
        overrides: &[PortOverride],
    ) -> Vec<PortDescriptor> {
        let mut registry = PortRegistry::default();

        for group in agent_config::parse_agent_config(agent_config, &self.families) {
            registry.register(group);
        }
        if let Some(yaml) = otel_config.filter(|c| !c.trim().is_empty()) {
            for group in collector_config::parse_collector_config(yaml) {
                registry.register(group);
            }
        }

        let derived = registry.into_ports();
        let overrides: Vec<PortDescriptor> = overrides.iter().map(PortDescriptor::from).collect();
        let derived = derived.into_iter().filter(|d| {
            let replaced = overrides
                .iter()
                .any(|o| o.name == d.name || o.key() == d.key());
            if replaced {
                info!(name = %d.name, port = d.port, "Derived port replaced by override");
            }
            !replaced
        });

        let mut ports = finalize(overrides.iter().cloned().chain(derived));
        ports.sort_by(|a, b| {
            (a.port, a.protocol, &a.name).cmp(&(b.port, b.protocol, &b.name))
        });
        ports
    }
}

/// Enforce naming rules and uniqueness, in priority order
fn finalize(candidates: impl Iterator<Item = PortDescriptor>) -> Vec<PortDescriptor> {
    let mut names = BTreeSet::new();
    let mut keys = BTreeSet::new();
    let mut out = Vec::new();

    for mut port in candidates {
        if !(1..=65535).contains(&port.port) {
            warn!(name = %port.name, port = port.port, "Port number out of range, dropping");
            continue;
        }
        if !(1..=65535).contains(&port.container_port()) {
            warn!(
                name = %port.name,
                target_port = port.container_port(),
                "Target port out of range, dropping"
            );
            continue;
        }
        if keys.contains(&port.key()) {
            info!(
                name = %port.name,
                port = port.port,
                protocol = %port.protocol,
                "Duplicate port and protocol, dropping"
            );
            continue;
        }

        let name = truncate_name(&port.name);
        if !is_valid_port_name(&name) {
            warn!(name = %port.name, "Invalid port name, dropping");
            continue;
        }
        port.name = if names.contains(&name) {
            let fallback = format!("port-{}", port.port);
            if names.contains(&fallback) {
                warn!(
                    name = %name,
                    fallback = %fallback,
                    "Port name collides and fallback name is taken, dropping"
                );
                continue;
            }
            fallback
        } else {
            name
        };

        names.insert(port.name.clone());
        keys.insert(port.key());
        out.push(port);
    }
    out
}

fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_PORT_NAME_LEN).collect()
}

/// IANA service name rules as enforced for Kubernetes port names
pub fn is_valid_port_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PORT_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && name.chars().any(|c| c.is_ascii_lowercase())
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
}

fn port_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r":(\d+)").expect("static port pattern compiles"))
}

/// Extract the port from an address such as `:8125`, `0.0.0.0:4317` or
/// `udp://[::1]:25826`
///
/// The last `:<digits>` occurrence is used; anything outside 1..=65535 is
/// treated as absent.
pub fn extract_port(address: &str) -> Option<i32> {
    port_pattern()
        .captures_iter(address)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .filter(|p| (1..=65535).contains(p))
}
