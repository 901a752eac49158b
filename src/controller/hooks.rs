//! Extension points of the reconcile pass.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::{Destinations, Resource},
    settings::EngineConfig,
    store::ResourceStore,
    subscriptions::SubscriptionAnnotations,
};

/// Decides whether a resource is left alone for this pass. Returns the reason
/// when it is.
pub type SkipProcessing = Arc<dyn Fn(&Resource) -> Option<String> + Send + Sync>;

/// Alters the destinations of a resource before its triggers are evaluated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DestinationsHook: Send + Sync {
    /// Returns the destinations to use for `resource`.
    async fn alter(
        &self,
        resource: &Resource,
        destinations: Destinations,
        config: &EngineConfig,
    ) -> Destinations;
}

const COMPLETED_PHASES: [&str; 3] = ["Succeeded", "Failed", "Error"];

fn timestamp(resource: &Resource, path: &[&str]) -> Option<DateTime<Utc>> {
    let raw = resource.field(path)?.as_str()?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(time) => Some(time.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!(resource = %resource.key(), field = %path.join("."), error = %e, "Ignoring unreadable timestamp");
            None
        }
    }
}

/// Skips resources whose operation completed after the status was last
/// refreshed, so conditions never see a finished operation next to a stale
/// sync status.
///
/// Only applies while `status.operationState.phase` is a completed phase. A
/// missing or unreadable `finishedAt` skips the resource. An unreadable
/// `reconciledAt` or `observedAt` counts as never refreshed, and the other
/// one still decides.
pub fn operation_finished_after_refresh(resource: &Resource) -> Option<String> {
    let phase = resource.field(&["status", "operationState", "phase"])?.as_str()?;
    if !COMPLETED_PHASES.contains(&phase) {
        return None;
    }

    let Some(finished_at) = timestamp(resource, &["status", "operationState", "finishedAt"]) else {
        return Some("operation has no valid finishedAt".to_string());
    };
    let refreshed_after =
        |path: &[&str]| timestamp(resource, path).is_some_and(|at| at >= finished_at);
    if refreshed_after(&["status", "reconciledAt"]) || refreshed_after(&["status", "observedAt"]) {
        return None;
    }
    Some("sync status out of date".to_string())
}

/// Adds the annotation subscriptions of a parent resource, e.g. the project an
/// application belongs to.
///
/// The parent's name is read from `name_path` on the resource; the parent
/// lives in `namespace` when set, otherwise in the resource's namespace.
pub struct ParentSubscriptionsHook {
    store: Arc<dyn ResourceStore>,
    name_path: Vec<String>,
    namespace: Option<String>,
}

impl ParentSubscriptionsHook {
    /// Creates a hook resolving parents through `store`.
    pub fn new(store: Arc<dyn ResourceStore>, name_path: &[&str], namespace: Option<&str>) -> Self {
        Self {
            store,
            name_path: name_path.iter().map(|s| s.to_string()).collect(),
            namespace: namespace.map(str::to_string),
        }
    }

    fn parent_key(&self, resource: &Resource) -> Option<String> {
        let path: Vec<&str> = self.name_path.iter().map(String::as_str).collect();
        let name = resource.field(&path)?.as_str().filter(|name| !name.is_empty())?;
        match self.namespace.as_deref().or(resource.namespace()) {
            Some(namespace) => Some(format!("{namespace}/{name}")),
            None => Some(name.to_string()),
        }
    }
}

#[async_trait]
impl DestinationsHook for ParentSubscriptionsHook {
    async fn alter(
        &self,
        resource: &Resource,
        mut destinations: Destinations,
        config: &EngineConfig,
    ) -> Destinations {
        let Some(key) = self.parent_key(resource) else {
            return destinations;
        };
        let parent = match self.store.get(&key).await {
            Ok(Some(parent)) => parent,
            Ok(None) => {
                tracing::debug!(resource = %resource.key(), parent = %key, "Parent resource not found");
                return destinations;
            }
            Err(e) => {
                tracing::warn!(resource = %resource.key(), parent = %key, error = %e, "Failed to read parent resource");
                return destinations;
            }
        };

        let annotations = SubscriptionAnnotations::new(&config.annotation_prefix, parent.annotations());
        destinations.merge(
            annotations.destinations(&config.default_triggers, &config.service_default_triggers),
        );
        destinations.dedup();
        destinations
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        models::{Destination, NotificationsSettings},
        store::InMemoryResourceStore,
    };

    fn app(status: serde_json::Value) -> Resource {
        Resource::new(json!({
            "metadata": { "name": "guestbook", "namespace": "argocd" },
            "spec": { "project": "payments" },
            "status": status
        }))
    }

    #[test]
    fn test_running_operation_is_not_skipped() {
        let resource = app(json!({ "operationState": { "phase": "Running" } }));
        assert_eq!(operation_finished_after_refresh(&resource), None);
        assert_eq!(operation_finished_after_refresh(&app(json!({}))), None);
    }

    #[test]
    fn test_finished_operation_with_stale_status_is_skipped() {
        let resource = app(json!({
            "operationState": { "phase": "Succeeded", "finishedAt": "2024-05-01T10:00:10Z" },
            "reconciledAt": "2024-05-01T10:00:00Z",
            "observedAt": "2024-05-01T09:59:00Z"
        }));
        assert!(operation_finished_after_refresh(&resource).is_some());
    }

    #[test]
    fn test_finished_operation_with_refreshed_status_is_processed() {
        let resource = app(json!({
            "operationState": { "phase": "Failed", "finishedAt": "2024-05-01T10:00:00Z" },
            "reconciledAt": "2024-05-01T10:00:05Z"
        }));
        assert_eq!(operation_finished_after_refresh(&resource), None);

        let observed = app(json!({
            "operationState": { "phase": "Error", "finishedAt": "2024-05-01T10:00:00Z" },
            "observedAt": "2024-05-01T10:00:00Z"
        }));
        assert_eq!(operation_finished_after_refresh(&observed), None);
    }

    #[test]
    fn test_invalid_finished_at_is_skipped() {
        let resource = app(json!({
            "operationState": { "phase": "Succeeded", "finishedAt": "yesterday" },
            "reconciledAt": "2024-05-01T10:00:05Z"
        }));
        assert!(operation_finished_after_refresh(&resource).is_some());
    }

    #[test]
    fn test_unreadable_refresh_timestamp_falls_back_to_the_other() {
        let resource = app(json!({
            "operationState": { "phase": "Succeeded", "finishedAt": "2024-05-01T10:00:00Z" },
            "reconciledAt": "not-a-time",
            "observedAt": "2024-05-01T10:00:05Z"
        }));
        assert_eq!(operation_finished_after_refresh(&resource), None);

        let stale = app(json!({
            "operationState": { "phase": "Succeeded", "finishedAt": "2024-05-01T10:00:00Z" },
            "reconciledAt": "not-a-time",
            "observedAt": "2024-05-01T09:00:00Z"
        }));
        assert!(operation_finished_after_refresh(&stale).is_some());
    }

    #[tokio::test]
    async fn test_parent_subscriptions_are_merged() {
        let project = Resource::new(json!({
            "metadata": {
                "name": "payments",
                "namespace": "argocd",
                "annotations": {
                    "notifications.herald.io/subscribe.on-sync-failed.slack": "payments-team"
                }
            }
        }));
        let store = Arc::new(InMemoryResourceStore::with_resources([project]));
        let hook = ParentSubscriptionsHook::new(store, &["spec", "project"], None);
        let config = EngineConfig::builder().build(&NotificationsSettings::default()).unwrap();

        let mut destinations = Destinations::new();
        destinations.add("on-sync-failed", Destination::new("slack", "payments-team"));
        destinations.add("on-sync-failed", Destination::new("slack", "ops"));

        let altered = hook.alter(&app(json!({})), destinations, &config).await;
        assert_eq!(
            altered.get("on-sync-failed"),
            &[Destination::new("slack", "payments-team"), Destination::new("slack", "ops")]
        );
    }

    #[tokio::test]
    async fn test_missing_parent_keeps_destinations() {
        let store = Arc::new(InMemoryResourceStore::new());
        let hook = ParentSubscriptionsHook::new(store, &["spec", "project"], Some("argocd"));
        let config = EngineConfig::builder().build(&NotificationsSettings::default()).unwrap();

        let mut destinations = Destinations::new();
        destinations.add("on-deployed", Destination::new("slack", "ops"));
        let altered = hook.alter(&app(json!({})), destinations.clone(), &config).await;
        assert_eq!(altered, destinations);
    }
}
