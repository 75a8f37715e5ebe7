//! cwagent-operator: Kubernetes operator for the Amazon CloudWatch agent
//!
//! This crate turns AmazonCloudWatchAgent custom resources into the
//! workloads, Services, ConfigMaps and auxiliary objects that run the agent,
//! inferring receiver ports from the agent's own configuration.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod manifests;
pub mod ports;
pub mod retry;

pub use crate::error::{Error, Result};
