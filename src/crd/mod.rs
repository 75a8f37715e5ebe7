//! Custom Resource Definitions for the CloudWatch agent operator

mod agent;
pub mod types;

#[cfg(test)]
mod tests;

pub use agent::{
    AmazonCloudWatchAgent, AmazonCloudWatchAgentSpec, AmazonCloudWatchAgentStatus,
    SpecValidationError,
};
pub use types::*;
