//! Watched resources and the annotation patch helpers used to persist state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A watched resource: a JSON object with Kubernetes style `metadata`
/// (`name`, `namespace`, `labels`, `annotations`).
///
/// The whole object is exposed to conditions and templates; only metadata is
/// interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource {
    object: Value,
}

impl Resource {
    /// Wraps a JSON object.
    pub fn new(object: Value) -> Self {
        Self { object }
    }

    /// The resource name, or an empty string if unset.
    pub fn name(&self) -> &str {
        self.metadata_str("name").unwrap_or_default()
    }

    /// The resource namespace, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace").filter(|ns| !ns.is_empty())
    }

    /// Store key: `namespace/name`, or just `name` for cluster scoped
    /// resources.
    pub fn key(&self) -> String {
        match self.namespace() {
            Some(namespace) => format!("{namespace}/{}", self.name()),
            None => self.name().to_string(),
        }
    }

    /// Resource labels.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.string_map("labels")
    }

    /// Resource annotations.
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.string_map("annotations")
    }

    /// A single annotation value.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.object.pointer("/metadata/annotations")?.get(key)?.as_str()
    }

    /// The nested value at `path`, e.g. `["spec", "project"]`.
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.object, |value, segment| value.get(segment))
    }

    /// The representation bound into conditions and templates.
    pub fn as_variable_map(&self) -> &Value {
        &self.object
    }

    /// Mutable access to the underlying object.
    pub fn object_mut(&mut self) -> &mut Value {
        &mut self.object
    }

    /// Consumes the resource, returning the JSON object.
    pub fn into_object(self) -> Value {
        self.object
    }

    /// Applies a JSON merge patch (RFC 7386) to the resource.
    pub fn apply_merge_patch(&mut self, patch: &Value) {
        json_patch::merge(&mut self.object, patch);
    }

    fn metadata_str(&self, field: &str) -> Option<&str> {
        self.object.get("metadata")?.get(field)?.as_str()
    }

    fn string_map(&self, field: &str) -> BTreeMap<String, String> {
        self.object
            .get("metadata")
            .and_then(|metadata| metadata.get(field))
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Builds a merge patch that turns the `original` annotations into `updated`.
///
/// Only keys that were added, changed or removed appear in the patch; removed
/// keys are set to `null`. Returns `None` when nothing changed.
pub fn annotations_patch(
    original: &BTreeMap<String, String>,
    updated: &BTreeMap<String, String>,
) -> Option<Value> {
    let mut changes = Map::new();
    for (key, value) in updated {
        if original.get(key) != Some(value) {
            changes.insert(key.clone(), Value::String(value.clone()));
        }
    }
    for key in original.keys() {
        if !updated.contains_key(key) {
            changes.insert(key.clone(), Value::Null);
        }
    }
    if changes.is_empty() {
        return None;
    }
    Some(serde_json::json!({ "metadata": { "annotations": changes } }))
}
