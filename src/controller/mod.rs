//! Controller module for AmazonCloudWatchAgent reconciliation
//!
//! This module contains the main controller loop, the per-object apply
//! engine, garbage collection of orphaned children and status reporting.

mod apply;
pub mod cluster;
#[cfg(test)]
mod fake_cluster;
mod mutate;
mod prune;
mod reconciler;
mod status;

pub use apply::{apply_desired_objects, ApplyReport, MutationResult, ObjectOutcome};
pub use cluster::{Cluster, EventType, KubeCluster};
pub use mutate::{contains, is_unchanged, merge_immutable_fields, updated_object, ImmutableMerge};
pub use prune::{
    collect_garbage, list_owned_objects, prune_orphans, OwnedObject, OwnedObjectIndex,
};
pub use reconciler::{
    reconcile_agent, run_controller, ControllerState, PassReport, DEFAULT_RESYNC_INTERVAL,
};
pub use status::{compute_status, report_status, selector_string};
