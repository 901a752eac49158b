use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::fs;

use super::{ResourceStore, StoreError};
use crate::models::Resource;

#[derive(Debug, Clone)]
struct Entry {
    path: PathBuf,
    resource: Resource,
}

/// A store backed by a directory of JSON documents, one resource per
/// `*.json` file.
///
/// Reads are served from a cache refreshed by [`list_keys`]; patches are
/// written back to the resource's file.
///
/// [`list_keys`]: ResourceStore::list_keys
#[derive(Debug)]
pub struct FileResourceStore {
    dir: PathBuf,
    cache: DashMap<String, Entry>,
}

impl FileResourceStore {
    /// Creates a store over `dir`. Nothing is read until the first
    /// [`ResourceStore::list_keys`].
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), cache: DashMap::new() }
    }

    /// The directory holding the resources.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_resource(path: &Path) -> Result<Resource, StoreError> {
        let content = fs::read_to_string(path).await?;
        let resource = Resource::new(serde_json::from_str(&content)?);
        if resource.name().is_empty() {
            return Err(StoreError::InvalidResource(format!(
                "{} has no metadata.name",
                path.display()
            )));
        }
        Ok(resource)
    }

    async fn write_resource(path: &Path, resource: &Resource) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(resource)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<(String, Entry)>, StoreError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(dir_entry) = dir.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read_resource(&path).await {
                Ok(resource) => entries.push((resource.key(), Entry { path, resource })),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable resource file")
                }
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl ResourceStore for FileResourceStore {
    async fn get(&self, key: &str) -> Result<Option<Resource>, StoreError> {
        Ok(self.cache.get(key).map(|entry| entry.resource.clone()))
    }

    async fn get_fresh(&self, key: &str) -> Result<Option<Resource>, StoreError> {
        let Some(path) = self.cache.get(key).map(|entry| entry.path.clone()) else {
            return Ok(None);
        };
        match Self::read_resource(&path).await {
            Ok(resource) => {
                self.cache.insert(key.to_string(), Entry { path, resource: resource.clone() });
                Ok(Some(resource))
            }
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                self.cache.remove(key);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn patch(&self, key: &str, patch: &Value) -> Result<Resource, StoreError> {
        let path = self
            .cache
            .get(key)
            .map(|entry| entry.path.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let mut resource = Self::read_resource(&path).await?;
        resource.apply_merge_patch(patch);
        Self::write_resource(&path, &resource).await?;
        tracing::debug!(resource = %key, path = %path.display(), "Patched resource file");

        self.cache.insert(key.to_string(), Entry { path, resource: resource.clone() });
        Ok(resource)
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = self.scan().await?;
        let mut keys: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();
        keys.sort();
        keys.dedup();

        self.cache.retain(|key, _| keys.binary_search(key).is_ok());
        for (key, entry) in entries {
            self.cache.insert(key, entry);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn write(dir: &TempDir, file: &str, value: Value) -> PathBuf {
        let path = dir.path().join(file);
        std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();
        path
    }

    fn app(name: &str) -> Value {
        json!({ "metadata": { "name": name, "namespace": "argocd" }, "status": { "phase": "Failed" } })
    }

    #[tokio::test]
    async fn test_list_keys_reads_directory() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.json", app("b"));
        write(&dir, "a.json", app("a"));
        write(&dir, "notes.txt", json!("ignored"));
        write(&dir, "broken.json", json!({ "metadata": {} }));

        let store = FileResourceStore::new(dir.path());
        assert!(store.get("argocd/a").await.unwrap().is_none());

        assert_eq!(store.list_keys().await.unwrap(), vec!["argocd/a", "argocd/b"]);
        assert_eq!(store.get("argocd/a").await.unwrap().unwrap().name(), "a");
    }

    #[tokio::test]
    async fn test_list_keys_drops_removed_files() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.json", app("a"));
        let store = FileResourceStore::new(dir.path());
        store.list_keys().await.unwrap();

        std::fs::remove_file(path).unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
        assert!(store.get("argocd/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_patch_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.json", app("a"));
        let store = FileResourceStore::new(dir.path());
        store.list_keys().await.unwrap();

        store
            .patch("argocd/a", &json!({ "metadata": { "annotations": { "notified": "{}" } } }))
            .await
            .unwrap();

        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(on_disk["metadata"]["annotations"]["notified"], "{}");
        assert_eq!(on_disk["status"]["phase"], "Failed");
        let cached = store.get("argocd/a").await.unwrap().unwrap();
        assert_eq!(cached.annotation("notified"), Some("{}"));
    }

    #[tokio::test]
    async fn test_get_fresh_sees_external_edits() {
        let dir = TempDir::new().unwrap();
        let store = FileResourceStore::new(dir.path());
        write(&dir, "a.json", app("a"));
        store.list_keys().await.unwrap();

        let mut edited = app("a");
        edited["metadata"]["annotations"] = json!({ "owner": "team-a" });
        write(&dir, "a.json", edited);

        assert_eq!(store.get("argocd/a").await.unwrap().unwrap().annotation("owner"), None);
        let fresh = store.get_fresh("argocd/a").await.unwrap().unwrap();
        assert_eq!(fresh.annotation("owner"), Some("team-a"));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = FileResourceStore::new(dir.path().join("missing"));
        assert!(matches!(store.list_keys().await, Err(StoreError::Io(_))));
    }
}
