//! This module provides the `ControllerBuilder` for constructing a `NotificationController`.

use std::sync::Arc;

use super::{DestinationsHook, NotificationController, SkipProcessing};
use crate::{
    metrics::{MetricsSink, RecorderMetrics},
    settings::ConfigProvider,
    store::ResourceStore,
};

const DEFAULT_RESOURCE_VARIABLE: &str = "app";
const DEFAULT_MAX_STATE_SIZE: usize = 100;

/// Errors raised when a required collaborator was not provided.
#[derive(Debug, thiserror::Error)]
pub enum ControllerBuildError {
    /// No resource store was provided.
    #[error("Missing resource store for NotificationController")]
    MissingStore,

    /// No configuration provider was provided.
    #[error("Missing config provider for NotificationController")]
    MissingConfigProvider,
}

/// A builder for creating a `NotificationController` instance.
pub struct ControllerBuilder {
    store: Option<Arc<dyn ResourceStore>>,
    config_provider: Option<Arc<dyn ConfigProvider>>,
    metrics: Arc<dyn MetricsSink>,
    resource_variable: String,
    max_state_size: usize,
    skip_processing: Option<SkipProcessing>,
    destinations_hook: Option<Arc<dyn DestinationsHook>>,
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self {
            store: None,
            config_provider: None,
            metrics: Arc::new(RecorderMetrics),
            resource_variable: DEFAULT_RESOURCE_VARIABLE.to_string(),
            max_state_size: DEFAULT_MAX_STATE_SIZE,
            skip_processing: None,
            destinations_hook: None,
        }
    }
}

impl ControllerBuilder {
    /// Creates a new, empty `ControllerBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource store.
    pub fn store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the configuration provider.
    pub fn config_provider(mut self, config_provider: Arc<dyn ConfigProvider>) -> Self {
        self.config_provider = Some(config_provider);
        self
    }

    /// Sets the metrics sink. Defaults to the global `metrics` recorder.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the name the resource is bound to in conditions and templates.
    pub fn resource_variable(mut self, name: &str) -> Self {
        self.resource_variable = name.to_string();
        self
    }

    /// Sets the maximum number of notification records kept per resource.
    pub fn max_state_size(mut self, max_state_size: usize) -> Self {
        self.max_state_size = max_state_size;
        self
    }

    /// Sets the skip predicate.
    pub fn skip_processing(mut self, skip: SkipProcessing) -> Self {
        self.skip_processing = Some(skip);
        self
    }

    /// Sets the destinations hook.
    pub fn destinations_hook(mut self, hook: Arc<dyn DestinationsHook>) -> Self {
        self.destinations_hook = Some(hook);
        self
    }

    /// Builds the controller.
    pub fn build(self) -> Result<NotificationController, ControllerBuildError> {
        Ok(NotificationController {
            store: self.store.ok_or(ControllerBuildError::MissingStore)?,
            config_provider: self.config_provider.ok_or(ControllerBuildError::MissingConfigProvider)?,
            metrics: self.metrics,
            resource_variable: self.resource_variable,
            max_state_size: self.max_state_size,
            skip_processing: self.skip_processing,
            destinations_hook: self.destinations_hook,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{settings::MockConfigProvider, store::InMemoryResourceStore};

    #[test]
    fn build_fails_if_store_is_missing() {
        let result = ControllerBuilder::new().config_provider(Arc::new(MockConfigProvider::new())).build();
        assert!(matches!(result, Err(ControllerBuildError::MissingStore)));
    }

    #[test]
    fn build_fails_if_config_provider_is_missing() {
        let result = ControllerBuilder::new().store(Arc::new(InMemoryResourceStore::new())).build();
        assert!(matches!(result, Err(ControllerBuildError::MissingConfigProvider)));
    }

    #[test]
    fn build_with_defaults() {
        let controller = ControllerBuilder::new()
            .store(Arc::new(InMemoryResourceStore::new()))
            .config_provider(Arc::new(MockConfigProvider::new()))
            .build()
            .unwrap();
        assert_eq!(controller.resource_variable, "app");
        assert_eq!(controller.max_state_size, 100);
    }
}
