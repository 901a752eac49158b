use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{ResourceStore, StoreError};
use crate::models::Resource;

/// A store holding resources in memory, keyed by [`Resource::key`].
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    resources: DashMap<String, Resource>,
}

impl InMemoryResourceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `resources`.
    pub fn with_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let store = Self::new();
        for resource in resources {
            store.insert(resource);
        }
        store
    }

    /// Inserts or replaces a resource, returning its key.
    pub fn insert(&self, resource: Resource) -> String {
        let key = resource.key();
        self.resources.insert(key.clone(), resource);
        key
    }

    /// Removes a resource.
    pub fn remove(&self, key: &str) -> Option<Resource> {
        self.resources.remove(key).map(|(_, resource)| resource)
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the store holds no resource.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn get(&self, key: &str) -> Result<Option<Resource>, StoreError> {
        Ok(self.resources.get(key).map(|entry| entry.value().clone()))
    }

    async fn get_fresh(&self, key: &str) -> Result<Option<Resource>, StoreError> {
        self.get(key).await
    }

    async fn patch(&self, key: &str, patch: &Value) -> Result<Resource, StoreError> {
        let mut entry =
            self.resources.get_mut(key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        entry.apply_merge_patch(patch);
        Ok(entry.value().clone())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.resources.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn resource(namespace: &str, name: &str) -> Resource {
        Resource::new(json!({ "metadata": { "name": name, "namespace": namespace } }))
    }

    #[tokio::test]
    async fn test_get_and_list() {
        let store = InMemoryResourceStore::with_resources([
            resource("default", "b"),
            resource("argocd", "a"),
        ]);

        assert_eq!(store.list_keys().await.unwrap(), vec!["argocd/a", "default/b"]);
        assert_eq!(store.get("argocd/a").await.unwrap().unwrap().name(), "a");
        assert!(store.get("argocd/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_patch_updates_resource() {
        let store = InMemoryResourceStore::with_resources([resource("argocd", "app")]);
        let patched = store
            .patch("argocd/app", &json!({ "metadata": { "annotations": { "a": "1" } } }))
            .await
            .unwrap();

        assert_eq!(patched.annotation("a"), Some("1"));
        assert_eq!(store.get("argocd/app").await.unwrap().unwrap().annotation("a"), Some("1"));
    }

    #[tokio::test]
    async fn test_patch_missing_resource() {
        let store = InMemoryResourceStore::new();
        let err = store.patch("argocd/app", &json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(key) if key == "argocd/app"));
    }
}
