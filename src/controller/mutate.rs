//! Reconciling a desired object against its live counterpart
//!
//! Three pure steps: carry immutable fields over from the live object,
//! decide whether anything still differs, and build the object to write.

use std::collections::BTreeMap;

use kube::core::DynamicObject;
use serde_json::{Map, Value};

use crate::manifests::ObjectKind;

/// Outcome of [`merge_immutable_fields`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImmutableMerge {
    /// The desired object can be written in place
    Compatible,
    /// Desired and live disagree on a field the server will not change
    Conflict { field: &'static str },
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        _ => false,
    }
}

/// Values the API server drops on serialization (`omitempty`)
fn is_omitted_when_empty(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        v => is_empty(Some(v)),
    }
}

/// Set `value` at a JSON pointer, creating intermediate objects
fn set_pointer(root: &mut Value, pointer: &str, value: Value) {
    let mut current = root;
    let mut segments = pointer.split('/').skip(1).peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Copy server-owned immutable fields into `desired`
///
/// A field left empty in the desired object takes the live value; a field
/// both sides set to different values is a conflict that only a
/// delete-and-recreate can resolve.
pub fn merge_immutable_fields(
    kind: ObjectKind,
    live: &DynamicObject,
    desired: &mut DynamicObject,
) -> ImmutableMerge {
    for &field in kind.immutable_fields() {
        let live_value = live.data.pointer(field);
        if is_empty(live_value) {
            continue;
        }
        if is_empty(desired.data.pointer(field)) {
            if let Some(v) = live_value {
                set_pointer(&mut desired.data, field, v.clone());
            }
        } else if desired.data.pointer(field) != live_value {
            return ImmutableMerge::Conflict { field };
        }
    }
    ImmutableMerge::Compatible
}

/// Whether every field set in `desired` has the same value in `live`
///
/// Objects are compared key by key, arrays element by element; anything
/// the live object carries beyond the desired fields is ignored. A desired
/// zero value (`""`, `[]`, `{}`, `false`, `0`) matches a missing live key.
pub fn contains(live: &Value, desired: &Value) -> bool {
    match (live, desired) {
        (_, Value::Null) => true,
        (Value::Object(l), Value::Object(d)) => d
            .iter()
            .all(|(k, dv)| l.get(k).map_or(is_omitted_when_empty(dv), |lv| contains(lv, dv))),
        (Value::Array(l), Value::Array(d)) => {
            l.len() == d.len() && l.iter().zip(d).all(|(lv, dv)| contains(lv, dv))
        }
        (l, d) => l == d,
    }
}

fn map_contains(
    live: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    desired
        .iter()
        .all(|(k, v)| live.and_then(|l| l.get(k)) == Some(v))
}

/// Whether writing `desired` would change nothing on `live`
pub fn is_unchanged(live: &DynamicObject, desired: &DynamicObject) -> bool {
    let (lm, dm) = (&live.metadata, &desired.metadata);
    let owners_match = dm.owner_references.as_ref().map_or(true, |desired_refs| {
        let live_refs = lm.owner_references.clone().unwrap_or_default();
        desired_refs.iter().all(|r| live_refs.contains(r))
    });

    owners_match
        && map_contains(lm.labels.as_ref(), dm.labels.as_ref())
        && map_contains(lm.annotations.as_ref(), dm.annotations.as_ref())
        && contains(&live.data, &desired.data)
}

/// The object to send on update
///
/// Starts from the live object so identity, resourceVersion and labels or
/// annotations set by others survive; desired metadata maps are layered on
/// top and every top-level body field the desired object sets is replaced.
pub fn updated_object(live: &DynamicObject, desired: &DynamicObject) -> DynamicObject {
    let mut updated = live.clone();
    let meta = &mut updated.metadata;

    if let Some(labels) = &desired.metadata.labels {
        meta.labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());
    }
    if let Some(annotations) = &desired.metadata.annotations {
        meta.annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.clone());
    }
    if desired.metadata.owner_references.is_some() {
        meta.owner_references = desired.metadata.owner_references.clone();
    }

    if let Value::Object(fields) = &desired.data {
        for (key, value) in fields {
            set_pointer(&mut updated.data, &format!("/{key}"), value.clone());
        }
    }
    updated.types = desired.types.clone().or(updated.types);
    updated
}
