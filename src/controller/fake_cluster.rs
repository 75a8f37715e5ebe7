//! In-memory [`Cluster`] for engine tests
//!
//! Assigns UIDs and resourceVersions, allocates ClusterIPs the way the API
//! server does, and counts every write. Failures can be injected per object
//! or per kind.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use kube::core::{DynamicObject, ErrorResponse};
use serde_json::{json, Value};

use super::cluster::{Cluster, EventType};
use crate::crd::{AmazonCloudWatchAgent, AmazonCloudWatchAgentStatus};
use crate::error::{Error, Result};
use crate::manifests::ObjectKind;

type Key = (ObjectKind, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, DynamicObject>,
    next_id: u64,
    writes: usize,
    deletes: Vec<Key>,
    status_patches: Vec<AmazonCloudWatchAgentStatus>,
    events: Vec<(EventType, String, String)>,
    conflicts: HashMap<String, u32>,
    failing: HashSet<String>,
    unlistable: HashSet<ObjectKind>,
    omit_empty: bool,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

pub fn api_error(code: u16, reason: &str) -> Error {
    Error::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected {reason}"),
        reason: reason.to_string(),
        code,
    }))
}

fn key(kind: ObjectKind, namespace: Option<&str>, name: &str) -> Key {
    (kind, namespace.unwrap_or_default().to_string(), name.to_string())
}

fn object_key(kind: ObjectKind, object: &DynamicObject) -> Key {
    key(
        kind,
        object.metadata.namespace.as_deref(),
        object.metadata.name.as_deref().unwrap_or_default(),
    )
}

fn matches_selector(object: &DynamicObject, selector: &str) -> bool {
    let labels = object.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` writes to `name` with a 409
    pub fn conflict_on(&self, name: &str, times: u32) {
        self.lock().conflicts.insert(name.to_string(), times);
    }

    /// Fail every write to `name` with a 500
    pub fn fail_on(&self, name: &str) {
        self.lock().failing.insert(name.to_string());
    }

    pub fn fail_list(&self, kind: ObjectKind) {
        self.lock().unlistable.insert(kind);
    }

    /// Store objects with empty fields removed, as a real API server returns them
    pub fn omit_empty(&self) {
        self.lock().omit_empty = true;
    }

    /// Insert an object directly, as if someone else had created it
    pub fn seed(&self, kind: ObjectKind, mut object: DynamicObject) -> String {
        let mut state = self.lock();
        state.next_id += 1;
        let uid = format!("uid-{}", state.next_id);
        object.metadata.uid = Some(uid.clone());
        object.metadata.resource_version = Some(state.next_id.to_string());
        state.objects.insert(object_key(kind, &object), object);
        uid
    }

    /// Mutate a stored object without counting a write
    pub fn edit(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut DynamicObject),
    ) {
        let mut state = self.lock();
        if let Some(object) = state.objects.get_mut(&key(kind, Some(namespace), name)) {
            f(object);
        }
    }

    pub fn object(&self, kind: ObjectKind, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.lock()
            .objects
            .get(&key(kind, Some(namespace), name))
            .cloned()
    }

    pub fn names(&self, kind: ObjectKind) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    pub fn deleted(&self) -> Vec<(ObjectKind, String)> {
        self.lock()
            .deletes
            .iter()
            .map(|(kind, _, name)| (*kind, name.clone()))
            .collect()
    }

    pub fn status_patches(&self) -> Vec<AmazonCloudWatchAgentStatus> {
        self.lock().status_patches.clone()
    }

    pub fn events(&self) -> Vec<(EventType, String, String)> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl State {
    fn check_injected(&mut self, name: &str) -> Result<()> {
        if self.failing.contains(name) {
            return Err(api_error(500, "InternalError"));
        }
        if let Some(remaining) = self.conflicts.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(api_error(409, "Conflict"));
            }
        }
        Ok(())
    }

    fn stamp(&mut self, object: &mut DynamicObject) {
        self.next_id += 1;
        object.metadata.resource_version = Some(self.next_id.to_string());
    }
}

/// Drop empty strings, arrays and objects the way `omitempty` does
fn strip_empty(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.values_mut().for_each(strip_empty);
            map.retain(|_, v| match v {
                Value::Null => false,
                Value::String(s) => !s.is_empty(),
                Value::Array(a) => !a.is_empty(),
                Value::Object(o) => !o.is_empty(),
                _ => true,
            });
        }
        Value::Array(items) => items.iter_mut().for_each(strip_empty),
        _ => {}
    }
}

/// Server-side defaulting for Services
fn allocate_cluster_ip(kind: ObjectKind, object: &mut DynamicObject, id: u64) {
    if kind != ObjectKind::Service {
        return;
    }
    let spec = &mut object.data["spec"];
    if spec.get("clusterIP").map_or(true, Value::is_null) {
        let ip = format!("10.96.0.{id}");
        spec["clusterIP"] = json!(ip);
        spec["clusterIPs"] = json!([ip]);
    } else if spec.get("clusterIPs").map_or(true, Value::is_null) {
        spec["clusterIPs"] = json!([spec["clusterIP"].clone()]);
    }
    spec["type"] = json!("ClusterIP");
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(self.lock().objects.get(&key(kind, namespace, name)).cloned())
    }

    async fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>> {
        let state = self.lock();
        if state.unlistable.contains(&kind) {
            return Err(api_error(503, "ServiceUnavailable"));
        }
        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), o)| {
                *k == kind && ns == namespace && matches_selector(o, label_selector)
            })
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn create(&self, kind: ObjectKind, object: &DynamicObject) -> Result<DynamicObject> {
        let mut state = self.lock();
        let name = object.metadata.name.clone().unwrap_or_default();
        state.check_injected(&name)?;
        let key = object_key(kind, object);
        if state.objects.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }

        let mut created = object.clone();
        state.stamp(&mut created);
        created.metadata.uid = Some(format!("uid-{}", state.next_id));
        allocate_cluster_ip(kind, &mut created, state.next_id);
        if state.omit_empty {
            strip_empty(&mut created.data);
        }
        state.writes += 1;
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn replace(&self, kind: ObjectKind, object: &DynamicObject) -> Result<DynamicObject> {
        let mut state = self.lock();
        let name = object.metadata.name.clone().unwrap_or_default();
        state.check_injected(&name)?;
        let key = object_key(kind, object);
        let Some(live) = state.objects.get(&key).cloned() else {
            return Err(api_error(404, "NotFound"));
        };
        if live.metadata.resource_version != object.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }
        if kind == ObjectKind::Service
            && object.data.pointer("/spec/clusterIP") != live.data.pointer("/spec/clusterIP")
        {
            return Err(api_error(422, "Invalid"));
        }

        let mut replaced = object.clone();
        replaced.metadata.uid = live.metadata.uid.clone();
        state.stamp(&mut replaced);
        if state.omit_empty {
            strip_empty(&mut replaced.data);
        }
        state.writes += 1;
        state.objects.insert(key, replaced.clone());
        Ok(replaced)
    }

    async fn delete(&self, kind: ObjectKind, namespace: Option<&str>, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.check_injected(name)?;
        let key = key(kind, namespace, name);
        if state.objects.remove(&key).is_some() {
            state.writes += 1;
            state.deletes.push(key);
        }
        Ok(())
    }

    async fn patch_status(
        &self,
        _agent: &AmazonCloudWatchAgent,
        status: &AmazonCloudWatchAgentStatus,
    ) -> Result<()> {
        let mut state = self.lock();
        state.writes += 1;
        state.status_patches.push(status.clone());
        Ok(())
    }

    async fn publish_event(
        &self,
        _agent: &AmazonCloudWatchAgent,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        self.lock()
            .events
            .push((event_type, reason.to_string(), message.to_string()));
        Ok(())
    }
}
