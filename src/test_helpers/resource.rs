use serde_json::{Map, Value, json};

use crate::{models::Resource, subscriptions::subscribe_annotation_key};

const DEFAULT_PREFIX: &str = "notifications.herald.io";

/// A builder for creating `Resource` instances for testing.
#[derive(Debug, Clone)]
pub struct ResourceBuilder {
    name: String,
    namespace: Option<String>,
    labels: Map<String, Value>,
    annotations: Map<String, Value>,
    object: Value,
}

impl ResourceBuilder {
    /// Creates a builder for a resource called `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: None,
            labels: Map::new(),
            annotations: Map::new(),
            object: json!({}),
        }
    }

    /// Sets the namespace.
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Adds a label.
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), json!(value));
        self
    }

    /// Adds an annotation.
    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), json!(value));
        self
    }

    /// Subscribes `recipient` of `service` to `trigger` with the default
    /// annotation prefix.
    pub fn subscribe(self, trigger: &str, service: &str, recipient: &str) -> Self {
        let key = subscribe_annotation_key(DEFAULT_PREFIX, trigger, service);
        self.annotation(&key, recipient)
    }

    /// Sets the value at `path`, creating intermediate objects.
    pub fn field(mut self, path: &[&str], value: Value) -> Self {
        let mut current = &mut self.object;
        for (i, segment) in path.iter().enumerate() {
            if !current.is_object() {
                *current = json!({});
            }
            let map = current.as_object_mut().unwrap();
            if i == path.len() - 1 {
                map.insert(segment.to_string(), value);
                break;
            }
            current = map.entry(segment.to_string()).or_insert_with(|| json!({}));
        }
        self
    }

    /// Sets `status.phase`.
    pub fn phase(self, phase: &str) -> Self {
        self.field(&["status", "phase"], json!(phase))
    }

    /// Builds the resource.
    pub fn build(self) -> Resource {
        let mut object = self.object;
        if !object.is_object() {
            object = json!({});
        }
        let mut metadata = Map::new();
        metadata.insert("name".into(), json!(self.name));
        if let Some(namespace) = self.namespace {
            metadata.insert("namespace".into(), json!(namespace));
        }
        if !self.labels.is_empty() {
            metadata.insert("labels".into(), Value::Object(self.labels));
        }
        if !self.annotations.is_empty() {
            metadata.insert("annotations".into(), Value::Object(self.annotations));
        }
        object.as_object_mut().unwrap().insert("metadata".into(), Value::Object(metadata));
        Resource::new(object)
    }
}
